//! Light sources and the environment light.

use std::f64::consts::TAU;

use lumen_math::{Mat3, Ray, Spectrum, Vec3};
use rand::RngCore;

use crate::sampler::{uniform_grid, uniform_hemisphere};

/// An incident-light sample toward a shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub radiance: Spectrum,
    /// Unit direction from the shading point toward the light (world space).
    pub wi: Vec3,
    /// Distance to the sampled point; infinite for distant lights.
    pub dist: f64,
    /// Solid-angle density of `wi`; 1 for delta lights.
    pub pdf: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    /// Distant light arriving from a single direction.
    Directional {
        radiance: Spectrum,
        dir_to_light: Vec3,
    },
    Point {
        radiance: Spectrum,
        position: Vec3,
    },
    /// Uniform sky over the world +Y hemisphere.
    InfiniteHemisphere {
        radiance: Spectrum,
        sample_to_world: Mat3,
    },
    /// One-sided parallelogram emitter facing away from `direction`.
    Area {
        radiance: Spectrum,
        position: Vec3,
        direction: Vec3,
        dim_x: Vec3,
        dim_y: Vec3,
        area: f64,
    },
}

impl Light {
    /// `travel_direction` is the direction light travels, not the direction to it.
    pub fn directional(radiance: Spectrum, travel_direction: Vec3) -> Self {
        Light::Directional {
            radiance,
            dir_to_light: -travel_direction.normalize(),
        }
    }

    pub fn point(radiance: Spectrum, position: Vec3) -> Self {
        Light::Point { radiance, position }
    }

    pub fn infinite_hemisphere(radiance: Spectrum) -> Self {
        Light::InfiniteHemisphere {
            radiance,
            // Local +Z maps to world +Y.
            sample_to_world: Mat3::from_cols(
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, -1.0),
                Vec3::new(0.0, 1.0, 0.0),
            ),
        }
    }

    /// `direction` is the emitter's facing; it radiates toward points where
    /// `wi . direction < 0`.
    pub fn area(radiance: Spectrum, position: Vec3, direction: Vec3, dim_x: Vec3, dim_y: Vec3) -> Self {
        let area = dim_x.length() * dim_y.length();
        if area == 0.0 {
            log::warn!("Area light at {position:?} has zero area and will emit nothing");
        }
        Light::Area {
            radiance,
            position,
            direction: direction.normalize(),
            dim_x,
            dim_y,
            area,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Light::Directional { .. } | Light::Point { .. })
    }

    /// Sample incident light at world point `p`.
    pub fn sample_l(&self, p: Vec3, rng: &mut dyn RngCore) -> LightSample {
        match self {
            Light::Directional {
                radiance,
                dir_to_light,
            } => LightSample {
                radiance: *radiance,
                wi: *dir_to_light,
                dist: f64::INFINITY,
                pdf: 1.0,
            },
            Light::Point { radiance, position } => {
                let d = *position - p;
                let dist = d.length();
                if dist <= 0.0 {
                    // Shading point sits on the light; no defined direction.
                    return LightSample {
                        radiance: Spectrum::ZERO,
                        wi: Vec3::ZERO,
                        dist: 0.0,
                        pdf: 0.0,
                    };
                }
                LightSample {
                    radiance: *radiance,
                    wi: d / dist,
                    dist,
                    pdf: 1.0,
                }
            }
            Light::InfiniteHemisphere {
                radiance,
                sample_to_world,
            } => LightSample {
                radiance: *radiance,
                wi: *sample_to_world * uniform_hemisphere(rng),
                dist: f64::INFINITY,
                pdf: 1.0 / TAU,
            },
            Light::Area {
                radiance,
                position,
                direction,
                dim_x,
                dim_y,
                area,
            } => {
                let s = uniform_grid(rng) - 0.5;
                let d = *position + *dim_x * s.x + *dim_y * s.y - p;
                let dist2 = d.length_squared();
                let dist = dist2.sqrt();
                let wi = d / dist;
                let cos = wi.dot(*direction);
                LightSample {
                    radiance: if cos < 0.0 { *radiance } else { Spectrum::ZERO },
                    wi,
                    dist,
                    pdf: dist2 / (area * cos.abs()),
                }
            }
        }
    }

    /// Solid-angle density `sample_l` assigns to direction `wi` from `p`.
    /// Zero for delta lights and for directions the light cannot produce.
    pub fn pdf(&self, p: Vec3, wi: Vec3) -> f64 {
        match self {
            Light::Directional { .. } | Light::Point { .. } => 0.0,
            Light::InfiniteHemisphere { .. } => {
                if wi.y >= 0.0 {
                    1.0 / TAU
                } else {
                    0.0
                }
            }
            Light::Area {
                position,
                direction,
                dim_x,
                dim_y,
                area,
                ..
            } => {
                let denom = wi.dot(*direction);
                if denom == 0.0 {
                    return 0.0;
                }
                let t = (*position - p).dot(*direction) / denom;
                if t <= 0.0 {
                    return 0.0;
                }
                let local = p + wi * t - *position;
                let sx = local.dot(*dim_x) / dim_x.length_squared();
                let sy = local.dot(*dim_y) / dim_y.length_squared();
                if sx.abs() > 0.5 || sy.abs() > 0.5 {
                    return 0.0;
                }
                t * t / (area * denom.abs())
            }
        }
    }
}

/// Radiance seen by rays that escape the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvironmentLight {
    /// Same radiance in every direction.
    Uniform(Spectrum),
    /// Radiance over the world +Y hemisphere, black below the horizon.
    Sky(Spectrum),
}

impl EnvironmentLight {
    pub fn radiance(&self, ray: &Ray) -> Spectrum {
        match self {
            EnvironmentLight::Uniform(radiance) => *radiance,
            EnvironmentLight::Sky(radiance) => {
                if ray.direction.y >= 0.0 {
                    *radiance
                } else {
                    Spectrum::ZERO
                }
            }
        }
    }
}
