//! Reflectance models.
//!
//! Every BSDF works in the local shading frame where the normal is +Z, so
//! `w.z` is `cos(theta)` of a direction. `wo` points away from the surface
//! toward the viewer; `wi` toward the light.

use std::f64::consts::{FRAC_1_PI, PI, TAU};

use lumen_math::{reflect, refract, Spectrum, Vec3};
use rand::RngCore;

use crate::sampler::{coin_flip, cosine_hemisphere, random_f64};

/// Index of a BSDF in the scene's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BsdfId(pub usize);

/// Result of importance sampling a BSDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsdfSample {
    /// Sampled incoming direction (local frame).
    pub wi: Vec3,
    /// Density of `wi`; zero means the sample carries no energy.
    pub pdf: f64,
    /// BSDF value for the sampled pair.
    pub value: Spectrum,
}

impl BsdfSample {
    fn none(wi: Vec3) -> Self {
        Self {
            wi,
            pdf: 0.0,
            value: Spectrum::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bsdf {
    /// Lambertian reflector.
    Diffuse { reflectance: Spectrum },
    /// Perfect specular reflector.
    Mirror { reflectance: Spectrum },
    /// Beckmann microfacet conductor with complex index `eta + i k`.
    Microfacet {
        eta: Spectrum,
        k: Spectrum,
        alpha: f64,
    },
    /// Smooth dielectric, reflecting or refracting by Schlick's Fresnel.
    Glass {
        ior: f64,
        reflectance: Spectrum,
        transmittance: Spectrum,
    },
    /// Black emitter.
    Emission { radiance: Spectrum },
}

impl Bsdf {
    pub fn diffuse(reflectance: Spectrum) -> Self {
        Bsdf::Diffuse { reflectance }
    }

    pub fn mirror(reflectance: Spectrum) -> Self {
        Bsdf::Mirror { reflectance }
    }

    pub fn microfacet(eta: Spectrum, k: Spectrum, alpha: f64) -> Self {
        Bsdf::Microfacet { eta, k, alpha }
    }

    pub fn glass(ior: f64, reflectance: Spectrum, transmittance: Spectrum) -> Self {
        Bsdf::Glass {
            ior,
            reflectance,
            transmittance,
        }
    }

    pub fn emission(radiance: Spectrum) -> Self {
        Bsdf::Emission { radiance }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Bsdf::Diffuse { .. } => "diffuse",
            Bsdf::Mirror { .. } => "mirror",
            Bsdf::Microfacet { .. } => "microfacet",
            Bsdf::Glass { .. } => "glass",
            Bsdf::Emission { .. } => "emission",
        }
    }

    /// Delta BSDFs cannot be hit by light sampling; only `sample_f` reaches them.
    pub fn is_delta(&self) -> bool {
        matches!(self, Bsdf::Mirror { .. } | Bsdf::Glass { .. })
    }

    /// Emitted radiance (zero for everything but `Emission`).
    pub fn emitted(&self) -> Spectrum {
        match self {
            Bsdf::Emission { radiance } => *radiance,
            _ => Spectrum::ZERO,
        }
    }

    /// Evaluate the BSDF for a direction pair. Delta lobes evaluate to zero.
    pub fn f(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        match self {
            Bsdf::Diffuse { reflectance } => *reflectance * FRAC_1_PI,
            Bsdf::Microfacet { eta, k, alpha } => microfacet_f(*eta, *k, *alpha, wo, wi),
            Bsdf::Mirror { .. } | Bsdf::Glass { .. } | Bsdf::Emission { .. } => Spectrum::ZERO,
        }
    }

    /// Importance sample an incoming direction for `wo`.
    pub fn sample_f(&self, wo: Vec3, rng: &mut dyn RngCore) -> BsdfSample {
        match self {
            Bsdf::Diffuse { reflectance } => {
                let (wi, pdf) = cosine_hemisphere(rng);
                BsdfSample {
                    wi,
                    pdf,
                    value: *reflectance * FRAC_1_PI,
                }
            }
            Bsdf::Mirror { reflectance } => specular(reflect(wo), 1.0, *reflectance),
            Bsdf::Microfacet { eta, k, alpha } => sample_microfacet(*eta, *k, *alpha, wo, rng),
            Bsdf::Glass {
                ior,
                reflectance,
                transmittance,
            } => sample_glass(*ior, *reflectance, *transmittance, wo, rng),
            Bsdf::Emission { .. } => {
                let (wi, pdf) = cosine_hemisphere(rng);
                BsdfSample {
                    wi,
                    pdf,
                    value: Spectrum::ZERO,
                }
            }
        }
    }
}

/// Specular lobe value `scale / |cos(theta_i)|`; grazing directions carry nothing.
fn specular(wi: Vec3, pdf: f64, scale: Spectrum) -> BsdfSample {
    let cos = wi.z.abs();
    if cos == 0.0 || pdf <= 0.0 {
        return BsdfSample::none(wi);
    }
    BsdfSample {
        wi,
        pdf,
        value: scale / cos,
    }
}

fn sample_glass(
    ior: f64,
    reflectance: Spectrum,
    transmittance: Spectrum,
    wo: Vec3,
    rng: &mut dyn RngCore,
) -> BsdfSample {
    let Some(refracted) = refract(wo, ior) else {
        // Total internal reflection.
        return specular(reflect(wo), 1.0, reflectance);
    };

    let r = schlick(wo.z, ior);
    if coin_flip(rng, r) {
        specular(reflect(wo), 1.0, reflectance * r)
    } else {
        let eta = if wo.z < 0.0 { ior } else { 1.0 / ior };
        specular(refracted, 1.0 - r, transmittance * ((1.0 - r) / (eta * eta)))
    }
}

/// Schlick's approximation of dielectric reflectance.
pub fn schlick(cos_theta: f64, ior: f64) -> f64 {
    let r0 = ((1.0 - ior) / (1.0 + ior)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos_theta.abs()).powi(5)
}

fn tan2_theta(w: Vec3) -> f64 {
    (w.x * w.x + w.y * w.y) / (w.z * w.z)
}

/// Beckmann normal distribution.
fn beckmann_d(h: Vec3, alpha: f64) -> f64 {
    let cos2 = h.z * h.z;
    let a2 = alpha * alpha;
    (-tan2_theta(h) / a2).exp() / (PI * a2 * cos2 * cos2)
}

/// Beckmann masking term, using the rational fit to its erf form.
fn beckmann_lambda(w: Vec3, alpha: f64) -> f64 {
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

fn smith_g(wo: Vec3, wi: Vec3, alpha: f64) -> f64 {
    1.0 / (1.0 + beckmann_lambda(wi, alpha) + beckmann_lambda(wo, alpha))
}

/// Average of s- and p-polarized reflectance of a conductor, per channel.
pub fn fresnel_conductor(cos_theta: f64, eta: Spectrum, k: Spectrum) -> Spectrum {
    let cos = cos_theta.abs();
    let cos2 = cos * cos;
    let n2k2 = eta * eta + k * k;
    let two_n_cos = eta * (2.0 * cos);

    let rs = (n2k2 - two_n_cos + cos2) / (n2k2 + two_n_cos + cos2);
    let rp = (n2k2 * cos2 - two_n_cos + 1.0) / (n2k2 * cos2 + two_n_cos + 1.0);
    (rs + rp) * 0.5
}

fn microfacet_f(eta: Spectrum, k: Spectrum, alpha: f64, wo: Vec3, wi: Vec3) -> Spectrum {
    if wo.z <= 0.0 || wi.z <= 0.0 {
        return Spectrum::ZERO;
    }
    let h = (wo + wi).normalize();
    fresnel_conductor(wi.z, eta, k) * (smith_g(wo, wi, alpha) * beckmann_d(h, alpha))
        / (4.0 * wo.z * wi.z)
}

fn sample_microfacet(
    eta: Spectrum,
    k: Spectrum,
    alpha: f64,
    wo: Vec3,
    rng: &mut dyn RngCore,
) -> BsdfSample {
    let xi1 = random_f64(rng);
    let xi2 = random_f64(rng);

    let a2 = alpha * alpha;
    let theta = (-a2 * (1.0 - xi1).ln()).sqrt().atan();
    let phi = TAU * xi2;
    let (sin_t, cos_t) = theta.sin_cos();
    let h = Vec3::new(sin_t * phi.cos(), sin_t * phi.sin(), cos_t);

    let wi = -wo + h * (2.0 * wo.dot(h));
    let wi_dot_h = wi.dot(h);
    if wi.z <= 0.0 || wi_dot_h <= 0.0 {
        return BsdfSample::none(wi);
    }

    let tan2 = (sin_t / cos_t).powi(2);
    let pdf_h = (-tan2 / a2).exp() / (PI * a2 * cos_t.powi(3));
    BsdfSample {
        wi,
        pdf: pdf_h / (4.0 * wi_dot_h),
        value: microfacet_f(eta, k, alpha, wo, wi),
    }
}
