//! BSDF, light and environment evaluation on decoded kernel records.
//!
//! Shading happens in a local frame with the normal on +Z, as on the host.
//! Every routine draws its random numbers from the worker's [`Lcg`] in the
//! same order the host draws from its generator.

use std::f32::consts::{FRAC_1_PI, PI, TAU};

use glam::{Mat3, Vec3};

use crate::records::{KernelEmitter, KernelGlobals, KernelMaterial, ENV_NONE, ENV_SKY, ENV_UNIFORM};
use crate::rng::Lcg;

/// Local-to-world basis with `n` as the Z column.
pub fn coord_frame(n: Vec3) -> Mat3 {
    let z = n.normalize();
    let mut h = n;
    let a = n.abs();
    if a.x <= a.y && a.x <= a.z {
        h.x = 1.0;
    } else if a.y <= a.x && a.y <= a.z {
        h.y = 1.0;
    } else {
        h.z = 1.0;
    }
    let y = h.cross(z).normalize();
    let x = z.cross(y).normalize();
    Mat3::from_cols(x, y, z)
}

pub fn uniform_hemisphere(rng: &mut Lcg) -> Vec3 {
    let cos_theta = rng.next_f32();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TAU * rng.next_f32();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn cosine_hemisphere(rng: &mut Lcg) -> (Vec3, f32) {
    let xi1 = rng.next_f32();
    let xi2 = rng.next_f32();
    let r = xi1.sqrt();
    let theta = TAU * xi2;
    let z = (1.0 - xi1).sqrt();
    (Vec3::new(r * theta.cos(), r * theta.sin(), z), z * FRAC_1_PI)
}

#[inline]
fn reflect(wo: Vec3) -> Vec3 {
    Vec3::new(-wo.x, -wo.y, wo.z)
}

fn refract(wo: Vec3, ior: f32) -> Option<Vec3> {
    let (z_mult, eta) = if wo.z < 0.0 { (1.0, ior) } else { (-1.0, 1.0 / ior) };
    let z_sq = 1.0 - eta * eta * (1.0 - wo.z * wo.z);
    if z_sq < 0.0 {
        return None;
    }
    Some(Vec3::new(-eta * wo.x, -eta * wo.y, z_mult * z_sq.sqrt()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelBsdfSample {
    pub wi: Vec3,
    pub pdf: f32,
    pub value: Vec3,
}

impl KernelBsdfSample {
    fn none(wi: Vec3) -> Self {
        Self {
            wi,
            pdf: 0.0,
            value: Vec3::ZERO,
        }
    }

    fn specular(wi: Vec3, pdf: f32, scale: Vec3) -> Self {
        let cos = wi.z.abs();
        if cos == 0.0 || pdf <= 0.0 {
            return Self::none(wi);
        }
        Self {
            wi,
            pdf,
            value: scale / cos,
        }
    }
}

fn schlick(cos_theta: f32, ior: f32) -> f32 {
    let r0 = ((1.0 - ior) / (1.0 + ior)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos_theta.abs()).powi(5)
}

fn tan2_theta(w: Vec3) -> f32 {
    (w.x * w.x + w.y * w.y) / (w.z * w.z)
}

fn beckmann_d(h: Vec3, alpha: f32) -> f32 {
    let cos2 = h.z * h.z;
    let a2 = alpha * alpha;
    (-tan2_theta(h) / a2).exp() / (PI * a2 * cos2 * cos2)
}

fn beckmann_lambda(w: Vec3, alpha: f32) -> f32 {
    let tan_theta = tan2_theta(w).sqrt();
    if !tan_theta.is_finite() {
        return 0.0;
    }
    let a = 1.0 / (alpha * tan_theta);
    if a >= 1.6 {
        return 0.0;
    }
    (1.0 - 1.259 * a + 0.396 * a * a) / (3.535 * a + 2.181 * a * a)
}

fn fresnel_conductor(cos_theta: f32, eta: Vec3, k: Vec3) -> Vec3 {
    let cos = cos_theta.abs();
    let cos2 = cos * cos;
    let n2k2 = eta * eta + k * k;
    let two_n_cos = eta * (2.0 * cos);
    let rs = (n2k2 - two_n_cos + cos2) / (n2k2 + two_n_cos + cos2);
    let rp = (n2k2 * cos2 - two_n_cos + 1.0) / (n2k2 * cos2 + two_n_cos + 1.0);
    (rs + rp) * 0.5
}

fn microfacet_f(eta: Vec3, k: Vec3, alpha: f32, wo: Vec3, wi: Vec3) -> Vec3 {
    if wo.z <= 0.0 || wi.z <= 0.0 {
        return Vec3::ZERO;
    }
    let h = (wo + wi).normalize();
    let g = 1.0 / (1.0 + beckmann_lambda(wi, alpha) + beckmann_lambda(wo, alpha));
    fresnel_conductor(wi.z, eta, k) * (g * beckmann_d(h, alpha)) / (4.0 * wo.z * wi.z)
}

impl KernelMaterial {
    pub fn is_delta(&self) -> bool {
        matches!(self, KernelMaterial::Mirror { .. } | KernelMaterial::Glass { .. })
    }

    pub fn emitted(&self) -> Vec3 {
        match self {
            KernelMaterial::Emission { radiance } => *radiance,
            _ => Vec3::ZERO,
        }
    }

    pub fn f(&self, wo: Vec3, wi: Vec3) -> Vec3 {
        match self {
            KernelMaterial::Diffuse { reflectance } => *reflectance * FRAC_1_PI,
            KernelMaterial::Microfacet { eta, k, alpha } => microfacet_f(*eta, *k, *alpha, wo, wi),
            KernelMaterial::Mirror { .. } | KernelMaterial::Glass { .. } | KernelMaterial::Emission { .. } => {
                Vec3::ZERO
            }
        }
    }

    pub fn sample_f(&self, wo: Vec3, rng: &mut Lcg) -> KernelBsdfSample {
        match self {
            KernelMaterial::Diffuse { reflectance } => {
                let (wi, pdf) = cosine_hemisphere(rng);
                KernelBsdfSample {
                    wi,
                    pdf,
                    value: *reflectance * FRAC_1_PI,
                }
            }
            KernelMaterial::Mirror { reflectance } => KernelBsdfSample::specular(reflect(wo), 1.0, *reflectance),
            KernelMaterial::Microfacet { eta, k, alpha } => sample_microfacet(*eta, *k, *alpha, wo, rng),
            KernelMaterial::Glass {
                ior,
                reflectance,
                transmittance,
            } => {
                let Some(refracted) = refract(wo, *ior) else {
                    return KernelBsdfSample::specular(reflect(wo), 1.0, *reflectance);
                };
                let r = schlick(wo.z, *ior);
                if rng.coin_flip(r) {
                    KernelBsdfSample::specular(reflect(wo), 1.0, *reflectance * r)
                } else {
                    let eta = if wo.z < 0.0 { *ior } else { 1.0 / *ior };
                    KernelBsdfSample::specular(refracted, 1.0 - r, *transmittance * ((1.0 - r) / (eta * eta)))
                }
            }
            KernelMaterial::Emission { .. } => {
                let (wi, pdf) = cosine_hemisphere(rng);
                KernelBsdfSample {
                    wi,
                    pdf,
                    value: Vec3::ZERO,
                }
            }
        }
    }
}

fn sample_microfacet(eta: Vec3, k: Vec3, alpha: f32, wo: Vec3, rng: &mut Lcg) -> KernelBsdfSample {
    let xi1 = rng.next_f32();
    let xi2 = rng.next_f32();

    let a2 = alpha * alpha;
    let theta = (-a2 * (1.0 - xi1).ln()).sqrt().atan();
    let phi = TAU * xi2;
    let (sin_t, cos_t) = theta.sin_cos();
    let h = Vec3::new(sin_t * phi.cos(), sin_t * phi.sin(), cos_t);

    let wi = -wo + h * (2.0 * wo.dot(h));
    let wi_dot_h = wi.dot(h);
    if wi.z <= 0.0 || wi_dot_h <= 0.0 {
        return KernelBsdfSample::none(wi);
    }

    let tan2 = (sin_t / cos_t).powi(2);
    let pdf_h = (-tan2 / a2).exp() / (PI * a2 * cos_t.powi(3));
    KernelBsdfSample {
        wi,
        pdf: pdf_h / (4.0 * wi_dot_h),
        value: microfacet_f(eta, k, alpha, wo, wi),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelLightSample {
    pub radiance: Vec3,
    /// World-space direction toward the light.
    pub wi: Vec3,
    pub dist: f32,
    pub pdf: f32,
}

impl KernelEmitter {
    pub fn is_delta(&self) -> bool {
        matches!(self, KernelEmitter::Directional { .. } | KernelEmitter::Point { .. })
    }

    pub fn sample_l(&self, p: Vec3, rng: &mut Lcg) -> KernelLightSample {
        match self {
            KernelEmitter::Directional {
                radiance,
                dir_to_light,
            } => KernelLightSample {
                radiance: *radiance,
                wi: *dir_to_light,
                dist: f32::INFINITY,
                pdf: 1.0,
            },
            KernelEmitter::Hemisphere { radiance } => {
                // Local +Z maps to world +Y.
                let w = uniform_hemisphere(rng);
                KernelLightSample {
                    radiance: *radiance,
                    wi: Vec3::new(w.x, w.z, -w.y),
                    dist: f32::INFINITY,
                    pdf: 1.0 / TAU,
                }
            }
            KernelEmitter::Point { radiance, position } => {
                let d = *position - p;
                let dist = d.length();
                if dist <= 0.0 {
                    return KernelLightSample {
                        radiance: Vec3::ZERO,
                        wi: Vec3::ZERO,
                        dist: 0.0,
                        pdf: 0.0,
                    };
                }
                KernelLightSample {
                    radiance: *radiance,
                    wi: d / dist,
                    dist,
                    pdf: 1.0,
                }
            }
            KernelEmitter::Area {
                radiance,
                position,
                direction,
                dim_x,
                dim_y,
            } => {
                let sx = rng.next_f32() - 0.5;
                let sy = rng.next_f32() - 0.5;
                let d = *position + *dim_x * sx + *dim_y * sy - p;
                let dist2 = d.length_squared();
                let dist = dist2.sqrt();
                let wi = d / dist;
                let cos = wi.dot(*direction);
                let area = dim_x.length() * dim_y.length();
                KernelLightSample {
                    radiance: if cos < 0.0 { *radiance } else { Vec3::ZERO },
                    wi,
                    dist,
                    pdf: dist2 / (area * cos.abs()),
                }
            }
        }
    }
}

/// Radiance for a ray leaving the scene in `direction`.
pub fn environment_radiance(globals: &KernelGlobals, direction: Vec3) -> Vec3 {
    let radiance = Vec3::from_array(globals.env_radiance);
    match globals.env_kind {
        ENV_NONE => Vec3::ZERO,
        ENV_UNIFORM => radiance,
        ENV_SKY if direction.y >= 0.0 => radiance,
        ENV_SKY => Vec3::ZERO,
        kind => panic!("corrupt globals record: unknown environment kind {kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[test]
    fn test_coord_frame_is_orthonormal() {
        for n in [Vec3::X, -Vec3::Y, Vec3::new(0.3, -0.5, 0.8).normalize()] {
            let m = coord_frame(n);
            assert!((m.z_axis - n).length() < 1e-6);
            assert!(m.x_axis.dot(m.y_axis).abs() < 1e-6);
            assert!(m.x_axis.dot(m.z_axis).abs() < 1e-6);
            assert!((m.x_axis.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_diffuse_energy_matches_reflectance() {
        let albedo = Vec3::new(0.8, 0.5, 0.2);
        let bsdf = KernelMaterial::Diffuse { reflectance: albedo };
        let wo = Vec3::new(0.3, 0.1, 0.9).normalize();
        let mut rng = Lcg::new(17);

        let n = 20_000;
        let mut sum = Vec3::ZERO;
        for _ in 0..n {
            let s = bsdf.sample_f(wo, &mut rng);
            if s.pdf > 0.0 {
                sum += s.value * s.wi.z / s.pdf;
            }
        }
        let estimate = sum / n as f32;
        assert!((estimate - albedo).abs().max_element() < 1e-3, "estimate {estimate:?}");
    }

    #[test]
    fn test_glass_reflect_fraction_at_normal_incidence() {
        let ior = 1.5;
        let bsdf = KernelMaterial::Glass {
            ior,
            reflectance: Vec3::ONE,
            transmittance: Vec3::ONE,
        };
        let mut rng = Lcg::new(23);
        let n = 100_000;
        let reflected = (0..n).filter(|_| bsdf.sample_f(Vec3::Z, &mut rng).wi.z > 0.0).count();
        let fraction = reflected as f32 / n as f32;
        assert!((fraction - 0.04).abs() < 0.005, "fraction {fraction}");
    }

    #[test]
    fn test_microfacet_sample_value_matches_f() {
        let bsdf = KernelMaterial::Microfacet {
            eta: Vec3::new(0.2, 0.9, 1.1),
            k: Vec3::new(3.9, 2.4, 1.6),
            alpha: 0.3,
        };
        let wo = Vec3::new(0.2, -0.3, 0.9).normalize();
        let mut rng = Lcg::new(5);
        for _ in 0..200 {
            let s = bsdf.sample_f(wo, &mut rng);
            if s.pdf > 0.0 {
                assert!((s.value - bsdf.f(wo, s.wi)).abs().max_element() < 1e-5);
                assert!(s.wi.z > 0.0);
            }
        }
    }

    #[test]
    fn test_hemisphere_light_points_up() {
        let light = KernelEmitter::Hemisphere { radiance: Vec3::ONE };
        let mut rng = Lcg::new(9);
        for _ in 0..500 {
            let s = light.sample_l(Vec3::ZERO, &mut rng);
            assert!(s.wi.y >= 0.0);
            assert!((s.wi.length() - 1.0).abs() < 1e-5);
            assert_eq!(s.pdf, 1.0 / TAU);
        }
    }

    #[test]
    fn test_point_light_at_shading_point_has_zero_pdf() {
        let position = Vec3::new(0.0, 1.0, 0.0);
        let light = KernelEmitter::Point {
            radiance: Vec3::splat(3.0),
            position,
        };
        let s = light.sample_l(position, &mut Lcg::new(1));
        assert_eq!(s.pdf, 0.0);
        assert_eq!(s.radiance, Vec3::ZERO);
        assert!(s.wi.is_finite());
    }

    #[test]
    fn test_area_light_back_side_is_dark() {
        let light = KernelEmitter::Area {
            radiance: Vec3::splat(3.0),
            position: Vec3::new(0.0, 2.0, 0.0),
            direction: -Vec3::Y,
            dim_x: Vec3::X,
            dim_y: Vec3::Z,
        };
        let mut rng = Lcg::new(3);
        let below = light.sample_l(Vec3::ZERO, &mut rng);
        assert_eq!(below.radiance, Vec3::splat(3.0));
        assert!(below.pdf > 0.0);
        let above = light.sample_l(Vec3::new(0.0, 4.0, 0.0), &mut rng);
        assert_eq!(above.radiance, Vec3::ZERO);
    }

    #[test]
    fn test_environment_kinds() {
        let mut globals = KernelGlobals::zeroed();
        globals.env_radiance = [0.5; 3];
        assert_eq!(environment_radiance(&globals, Vec3::Y), Vec3::ZERO);

        globals.env_kind = ENV_UNIFORM;
        assert_eq!(environment_radiance(&globals, -Vec3::Y), Vec3::splat(0.5));

        globals.env_kind = ENV_SKY;
        assert_eq!(environment_radiance(&globals, Vec3::Y), Vec3::splat(0.5));
        assert_eq!(environment_radiance(&globals, -Vec3::Y), Vec3::ZERO);
    }
}
