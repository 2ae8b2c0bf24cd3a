//! Monte Carlo path tracing integrator.
//!
//! Radiance at a hit is split into emission (`zero_bounce_radiance`), direct
//! lighting (`one_bounce_radiance`) and the recursive indirect term
//! (`at_least_one_bounce_radiance`), which terminates by Russian roulette and
//! the ray's remaining depth.
//!
//! Per-pixel sampling can stop early: luminance samples are accumulated and
//! every `samples_per_batch` samples the 95% confidence half-width
//! `1.96 * sqrt(var / n)` is compared against `max_tolerance * mean`. The
//! test assumes roughly normal luminance and is only a heuristic for
//! heavy-tailed pixels (caustics, small bright lights).

use std::f64::consts::TAU;

use lumen_math::{illum, Frame, Ray, Spectrum, Vec2, EPS_D};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera::Camera;
use crate::config::{DirectLighting, PathTracerConfig};
use crate::primitive::Intersection;
use crate::sampler::{coin_flip, pixel_seed, uniform_grid, uniform_hemisphere};
use crate::scene::Scene;
use crate::stats::TraversalStats;

/// Russian roulette survival probability after the first bounce.
pub const CONTINUATION_PROBABILITY: f64 = 0.7;

/// State private to one render worker.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub rng: StdRng,
    pub stats: TraversalStats,
}

impl WorkerState {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            stats: TraversalStats::default(),
        }
    }

    /// Restart the RNG stream for pixel (x, y), keeping the counters.
    pub fn reseed(&mut self, seed: u64, x: u32, y: u32) {
        self.rng = StdRng::seed_from_u64(pixel_seed(seed, x, y));
    }
}

/// Radiance estimate for one pixel and the number of samples it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelEstimate {
    pub radiance: Spectrum,
    pub samples: u32,
}

pub struct PathTracer<'a> {
    scene: &'a Scene,
    camera: &'a Camera,
    config: PathTracerConfig,
}

impl<'a> PathTracer<'a> {
    pub fn new(scene: &'a Scene, camera: &'a Camera, config: PathTracerConfig) -> Self {
        Self {
            scene,
            camera,
            config,
        }
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    pub fn camera(&self) -> &'a Camera {
        self.camera
    }

    pub fn config(&self) -> &PathTracerConfig {
        &self.config
    }

    /// Light emitted by the surface itself.
    pub fn zero_bounce_radiance(&self, isect: &Intersection) -> Spectrum {
        self.scene.bsdf(isect.bsdf).emitted()
    }

    /// Direct lighting at a hit, using the configured estimator.
    pub fn one_bounce_radiance(&self, ray: &Ray, isect: &Intersection, ws: &mut WorkerState) -> Spectrum {
        match self.config.direct_lighting {
            DirectLighting::Hemisphere => self.estimate_direct_lighting_hemisphere(ray, isect, ws),
            DirectLighting::Importance => self.estimate_direct_lighting_importance(ray, isect, ws),
        }
    }

    /// Direct lighting from uniform hemisphere directions that happen to hit
    /// emissive surfaces.
    pub fn estimate_direct_lighting_hemisphere(
        &self,
        ray: &Ray,
        isect: &Intersection,
        ws: &mut WorkerState,
    ) -> Spectrum {
        let frame = Frame::from_normal(isect.n);
        let hit_p = ray.at(isect.t);
        let wo = frame.to_local(-ray.direction);
        let bsdf = self.scene.bsdf(isect.bsdf);

        let num_samples = self.scene.lights().len().max(1) * self.config.ns_area_light.max(1) as usize;
        let mut l_out = Spectrum::ZERO;
        for _ in 0..num_samples {
            let wi = uniform_hemisphere(&mut ws.rng);
            let mut light_ray = Ray::spawn(hit_p, frame.to_world(wi), EPS_D, 0);
            if let Some(hit) = self.scene.intersect(&mut light_ray, &mut ws.stats) {
                l_out += bsdf.f(wo, wi) * self.scene.bsdf(hit.bsdf).emitted() * wi.z;
            }
        }
        l_out * (TAU / num_samples as f64)
    }

    /// Direct lighting by sampling every light; delta lights take one sample,
    /// the rest `ns_area_light`.
    pub fn estimate_direct_lighting_importance(
        &self,
        ray: &Ray,
        isect: &Intersection,
        ws: &mut WorkerState,
    ) -> Spectrum {
        let frame = Frame::from_normal(isect.n);
        let hit_p = ray.at(isect.t);
        let wo = frame.to_local(-ray.direction);
        let bsdf = self.scene.bsdf(isect.bsdf);

        let mut l_out = Spectrum::ZERO;
        for light in self.scene.lights() {
            let light_samples = if light.is_delta() {
                1
            } else {
                self.config.ns_area_light.max(1)
            };

            let mut irradiance = Spectrum::ZERO;
            for _ in 0..light_samples {
                let sample = light.sample_l(hit_p, &mut ws.rng);
                let wi = frame.to_local(sample.wi);
                if wi.z < 0.0 || sample.pdf.is_nan() || sample.pdf <= 0.0 {
                    continue;
                }

                let shadow = Ray::spawn(hit_p, sample.wi, EPS_D, 0)
                    .with_range(EPS_D, sample.dist - EPS_D);
                if self.scene.occluded(&shadow, &mut ws.stats) {
                    continue;
                }

                irradiance += bsdf.f(wo, wi) * sample.radiance * wi.z.abs() / sample.pdf;
            }
            l_out += irradiance / f64::from(light_samples);
        }
        l_out
    }

    /// Direct plus indirect light leaving the hit toward `-ray.direction`.
    pub fn at_least_one_bounce_radiance(
        &self,
        ray: &Ray,
        isect: &Intersection,
        ws: &mut WorkerState,
    ) -> Spectrum {
        let frame = Frame::from_normal(isect.n);
        let hit_p = ray.at(isect.t);
        let wo = frame.to_local(-ray.direction);
        let bsdf = self.scene.bsdf(isect.bsdf);

        let mut l_out = if bsdf.is_delta() {
            Spectrum::ZERO
        } else {
            self.one_bounce_radiance(ray, isect, ws)
        };

        let sample = bsdf.sample_f(wo, &mut ws.rng);
        let max_depth = self.config.max_ray_depth;
        let continuation = if max_depth > 1 && ray.depth == max_depth {
            1.0
        } else {
            CONTINUATION_PROBABILITY
        };

        if ray.depth > 1 && coin_flip(&mut ws.rng, continuation) && sample.pdf > 0.0 {
            let mut next = Ray::spawn(hit_p, frame.to_world(sample.wi), EPS_D, ray.depth - 1);
            let weight = sample.value * (sample.wi.z.abs() / sample.pdf / continuation);

            match self.scene.intersect(&mut next, &mut ws.stats) {
                Some(next_isect) => {
                    let mut incoming = self.at_least_one_bounce_radiance(&next, &next_isect, ws);
                    // Light sampling cannot see through a delta lobe, so the
                    // emitter it reaches is counted here instead.
                    if bsdf.is_delta() {
                        incoming += self.zero_bounce_radiance(&next_isect);
                    }
                    l_out += incoming * weight;
                }
                None => {
                    if let Some(env) = self.scene.environment() {
                        l_out += env.radiance(&next) * weight;
                    }
                }
            }
        }

        l_out
    }

    /// Radiance arriving along a camera ray.
    pub fn est_radiance_global_illumination(&self, mut ray: Ray, ws: &mut WorkerState) -> Spectrum {
        let Some(isect) = self.scene.intersect(&mut ray, &mut ws.stats) else {
            return self
                .scene
                .environment()
                .map_or(Spectrum::ZERO, |env| env.radiance(&ray));
        };

        let mut l_out = self.zero_bounce_radiance(&isect);
        if self.config.max_ray_depth > 0 {
            l_out += self.at_least_one_bounce_radiance(&ray, &isect, ws);
        }
        l_out
    }

    /// Estimate pixel (x, y), counted from the bottom-left of the image.
    pub fn raytrace_pixel(&self, x: u32, y: u32, ws: &mut WorkerState) -> PixelEstimate {
        if self.config.adaptive {
            self.raytrace_pixel_adaptive(x, y, ws)
        } else {
            self.raytrace_pixel_fixed(x, y, ws)
        }
    }

    fn subpixel(&self, x: u32, y: u32, offset: Vec2) -> Vec2 {
        Vec2::new(
            (f64::from(x) + offset.x) / f64::from(self.camera.image_width),
            (f64::from(y) + offset.y) / f64::from(self.camera.image_height),
        )
    }

    fn raytrace_pixel_adaptive(&self, x: u32, y: u32, ws: &mut WorkerState) -> PixelEstimate {
        let max_samples = self.config.ns_aa.max(1);
        let batch = self.config.samples_per_batch.max(1);

        let mut total = Spectrum::ZERO;
        let (mut s1, mut s2) = (0.0, 0.0);
        let mut num_samples = 0u32;

        while num_samples < max_samples {
            num_samples += 1;

            let offset = if max_samples == 1 {
                Vec2::splat(0.5)
            } else {
                uniform_grid(&mut ws.rng)
            };
            let lens = uniform_grid(&mut ws.rng);
            let uv = self.subpixel(x, y, offset);
            let ray = self
                .camera
                .generate_ray_for_thin_lens(uv.x, uv.y, lens.x, lens.y * TAU)
                .with_depth(self.config.max_ray_depth);

            let sample = self.est_radiance_global_illumination(ray, ws);
            total += sample;
            let luminance = illum(sample);
            s1 += luminance;
            s2 += luminance * luminance;

            if num_samples % batch == 0 && num_samples > 1 {
                let n = f64::from(num_samples);
                let mean = s1 / n;
                // Clamp round-off; a constant pixel must read as zero variance.
                let var = ((s2 - s1 * s1 / n) / (n - 1.0)).max(0.0);
                if 1.96 * (var / n).sqrt() <= self.config.max_tolerance * mean {
                    break;
                }
            }
        }

        PixelEstimate {
            radiance: total / f64::from(num_samples),
            samples: num_samples,
        }
    }

    fn raytrace_pixel_fixed(&self, x: u32, y: u32, ws: &mut WorkerState) -> PixelEstimate {
        let num_samples = self.config.ns_aa.max(1);

        let mut total = Spectrum::ZERO;
        for _ in 0..num_samples {
            let offset = if num_samples == 1 {
                Vec2::splat(0.5)
            } else {
                uniform_grid(&mut ws.rng)
            };
            let uv = self.subpixel(x, y, offset);
            let ray = self
                .camera
                .generate_ray(uv.x, uv.y)
                .with_depth(self.config.max_ray_depth);
            total += self.est_radiance_global_illumination(ray, ws);
        }

        PixelEstimate {
            radiance: total / f64::from(num_samples),
            samples: num_samples,
        }
    }
}
