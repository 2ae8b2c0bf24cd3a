//! Lumen math types.
//!
//! Host-side geometry runs in double precision: `Vec3`, `Vec2` and `Mat3`
//! are aliases over glam's `f64` types. The device records in `lumen_kernel`
//! narrow to `f32` explicitly at the packing boundary.

mod bbox;
mod frame;
mod interval;
mod ray;

pub use bbox::BBox;
pub use frame::{reflect, refract, Frame};
pub use interval::Interval;
pub use ray::Ray;

// Re-export glam for convenience
pub use glam;

pub type Vec3 = glam::DVec3;
pub type Vec2 = glam::DVec2;
pub type Mat3 = glam::DMat3;

/// RGB radiometric quantity (radiance, reflectance, irradiance).
pub type Spectrum = glam::DVec3;

/// Offset used to keep secondary rays from re-hitting their origin surface.
pub const EPS_D: f64 = 1e-4;

/// Photometric luminance of an RGB spectrum (Rec. 709 weights).
#[inline]
pub fn illum(s: Spectrum) -> f64 {
    0.2126 * s.x + 0.7152 * s.y + 0.0722 * s.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
    }

    #[test]
    fn test_illum_of_white_is_one() {
        assert!((illum(Spectrum::ONE) - 1.0).abs() < 1e-12);
        assert_eq!(illum(Spectrum::ZERO), 0.0);
    }
}
