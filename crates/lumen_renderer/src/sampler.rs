//! Direction and point samplers.
//!
//! All samplers draw from a caller-owned RNG so each worker keeps its own
//! stream. Hemisphere samples are in the local shading frame (+Z up).

use std::f64::consts::{FRAC_1_PI, TAU};

use lumen_math::{Vec2, Vec3};
use rand::{Rng, RngCore};

/// Uniform random number in `[0, 1)`.
#[inline]
pub fn random_f64(rng: &mut dyn RngCore) -> f64 {
    rng.gen::<f64>()
}

/// True with probability `p`.
#[inline]
pub fn coin_flip(rng: &mut dyn RngCore, p: f64) -> bool {
    random_f64(rng) < p
}

/// Uniform point on the unit square.
pub fn uniform_grid(rng: &mut dyn RngCore) -> Vec2 {
    Vec2::new(random_f64(rng), random_f64(rng))
}

/// Uniform direction on the +Z hemisphere; pdf is `1 / 2pi`.
pub fn uniform_hemisphere(rng: &mut dyn RngCore) -> Vec3 {
    let cos_theta = random_f64(rng);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TAU * random_f64(rng);
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Cosine-weighted direction on the +Z hemisphere and its pdf `cos / pi`.
pub fn cosine_hemisphere(rng: &mut dyn RngCore) -> (Vec3, f64) {
    let xi1 = random_f64(rng);
    let xi2 = random_f64(rng);

    let r = xi1.sqrt();
    let theta = TAU * xi2;
    let z = (1.0 - xi1).sqrt();
    (Vec3::new(r * theta.cos(), r * theta.sin(), z), z * FRAC_1_PI)
}

/// Deterministic per-pixel seed so results do not depend on scheduling.
pub fn pixel_seed(seed: u64, x: u32, y: u32) -> u64 {
    // SplitMix64 finalizer over the packed coordinates.
    let mut z = seed ^ ((u64::from(y) << 32) | u64::from(x));
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_hemisphere_samples_are_unit_and_upward() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let w = uniform_hemisphere(&mut rng);
            assert!((w.length() - 1.0).abs() < 1e-12);
            assert!(w.z >= 0.0);

            let (w, pdf) = cosine_hemisphere(&mut rng);
            assert!((w.length() - 1.0).abs() < 1e-12);
            assert!(w.z >= 0.0);
            assert!((pdf - w.z / std::f64::consts::PI).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uniform_hemisphere_mean_cosine() {
        // E[cos] over the uniform hemisphere is 1/2.
        let mut rng = StdRng::seed_from_u64(2);
        let n = 100_000;
        let mean: f64 = (0..n).map(|_| uniform_hemisphere(&mut rng).z).sum::<f64>() / n as f64;
        assert!((mean - 0.5).abs() < 0.01, "mean cosine {mean}");
    }

    #[test]
    fn test_coin_flip_extremes() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!((0..100).all(|_| coin_flip(&mut rng, 1.0)));
        assert!((0..100).all(|_| !coin_flip(&mut rng, 0.0)));
    }

    #[test]
    fn test_pixel_seed_is_stable_and_distinct() {
        assert_eq!(pixel_seed(7, 10, 20), pixel_seed(7, 10, 20));
        assert_ne!(pixel_seed(7, 10, 20), pixel_seed(7, 20, 10));
        assert_ne!(pixel_seed(7, 10, 20), pixel_seed(8, 10, 20));
    }
}
