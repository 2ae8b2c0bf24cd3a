//! Kernel path tracer and its parallel dispatch.
//!
//! Each pixel is one kernel invocation: it reads the shared [`SceneView`],
//! owns its ray, RNG and counters, and writes exactly one output slot. The
//! indirect term is unrolled into a throughput loop so no invocation
//! recurses.

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use glam::Vec3;
use lumen_renderer::TraversalStats;
use rayon::prelude::*;

use crate::pack::{PackedScene, SceneView};
use crate::records::{KernelGlobals, KernelMaterial, DIRECT_HEMISPHERE};
use crate::rng::Lcg;
use crate::shading::{coord_frame, environment_radiance, uniform_hemisphere};
use crate::traverse::{intersect, occluded, KernelHit, KernelRay, EPS_F};

/// Russian roulette survival probability after the first bounce.
pub const CONTINUATION_PROBABILITY: f32 = 0.7;

/// State private to one kernel invocation.
#[derive(Debug, Clone)]
pub struct KernelWorker {
    pub rng: Lcg,
    pub stats: TraversalStats,
}

impl KernelWorker {
    pub fn new(rng: Lcg) -> Self {
        Self {
            rng,
            stats: TraversalStats::default(),
        }
    }
}

#[inline]
fn luminance(s: Vec3) -> f32 {
    0.2126 * s.x + 0.7152 * s.y + 0.0722 * s.z
}

/// Camera ray through normalized image coordinates, optionally through the
/// thin lens.
pub fn generate_ray(view: &SceneView<'_>, x: f32, y: f32, lens: Option<(f32, f32)>) -> KernelRay {
    let cam = view.camera;
    let c2w = glam::Mat3::from_cols_array_2d(&cam.c2w);
    let half_w = (cam.h_fov.to_radians() * 0.5).tan();
    let half_h = (cam.v_fov.to_radians() * 0.5).tan();
    let sensor = Vec3::new((2.0 * x - 1.0) * half_w, (2.0 * y - 1.0) * half_h, -1.0);
    let pos = Vec3::from_array(cam.pos);

    let ray = match lens {
        None => KernelRay::new(pos, (c2w * sensor).normalize()),
        Some((lens_r, lens_theta)) => {
            let r = cam.lens_radius * lens_r.sqrt();
            let p_lens = Vec3::new(r * lens_theta.cos(), r * lens_theta.sin(), 0.0);
            let p_focus = sensor * cam.focal_distance;
            KernelRay::new(pos + c2w * p_lens, (c2w * (p_focus - p_lens)).normalize())
        }
    };
    ray.with_range(cam.n_clip, cam.f_clip)
}

fn direct_hemisphere(
    view: &SceneView<'_>,
    material: &KernelMaterial,
    frame: glam::Mat3,
    hit_p: Vec3,
    wo: Vec3,
    worker: &mut KernelWorker,
) -> Vec3 {
    let g = view.globals;
    let num_samples = view.lights.len().max(1) * g.ns_area_light.max(1) as usize;
    let mut l_out = Vec3::ZERO;
    for _ in 0..num_samples {
        let wi = uniform_hemisphere(&mut worker.rng);
        let mut light_ray = KernelRay::spawn(hit_p, frame * wi, 0);
        if let Some(hit) = intersect(view, &mut light_ray, &mut worker.stats) {
            let emitted = view.bsdfs[hit.bsdf as usize].decode().emitted();
            l_out += material.f(wo, wi) * emitted * wi.z;
        }
    }
    l_out * (TAU / num_samples as f32)
}

fn direct_importance(
    view: &SceneView<'_>,
    material: &KernelMaterial,
    frame: glam::Mat3,
    hit_p: Vec3,
    wo: Vec3,
    worker: &mut KernelWorker,
) -> Vec3 {
    let to_local = frame.transpose();
    let mut l_out = Vec3::ZERO;
    for light in view.lights {
        let emitter = light.decode();
        let light_samples = if emitter.is_delta() {
            1
        } else {
            view.globals.ns_area_light.max(1)
        };

        let mut irradiance = Vec3::ZERO;
        for _ in 0..light_samples {
            let sample = emitter.sample_l(hit_p, &mut worker.rng);
            let wi = to_local * sample.wi;
            if wi.z < 0.0 || sample.pdf.is_nan() || sample.pdf <= 0.0 {
                continue;
            }
            let shadow = KernelRay::spawn(hit_p, sample.wi, 0).with_range(EPS_F, sample.dist - EPS_F);
            if occluded(view, &shadow, &mut worker.stats) {
                continue;
            }
            irradiance += material.f(wo, wi) * sample.radiance * wi.z.abs() / sample.pdf;
        }
        l_out += irradiance / light_samples as f32;
    }
    l_out
}

/// Radiance arriving along a camera ray whose `depth` holds the bounce budget.
pub fn trace_path(view: &SceneView<'_>, mut ray: KernelRay, worker: &mut KernelWorker) -> Vec3 {
    let g = view.globals;
    let Some(mut hit) = intersect(view, &mut ray, &mut worker.stats) else {
        return environment_radiance(g, ray.direction);
    };

    let mut l_out = view.bsdfs[hit.bsdf as usize].decode().emitted();
    if g.max_ray_depth == 0 {
        return l_out;
    }

    let mut throughput = Vec3::ONE;
    loop {
        let material = view.bsdfs[hit.bsdf as usize].decode();
        let frame = coord_frame(hit.n);
        let hit_p = ray.at(hit.t);
        let wo = frame.transpose() * -ray.direction;

        if !material.is_delta() {
            let direct = if g.direct_lighting == DIRECT_HEMISPHERE {
                direct_hemisphere(view, &material, frame, hit_p, wo, worker)
            } else {
                direct_importance(view, &material, frame, hit_p, wo, worker)
            };
            l_out += throughput * direct;
        }

        let sample = material.sample_f(wo, &mut worker.rng);
        let continuation = if g.max_ray_depth > 1 && ray.depth == g.max_ray_depth {
            1.0
        } else {
            CONTINUATION_PROBABILITY
        };
        if !(ray.depth > 1 && worker.rng.coin_flip(continuation) && sample.pdf > 0.0) {
            return l_out;
        }

        let mut next = KernelRay::spawn(hit_p, frame * sample.wi, ray.depth - 1);
        let weight = sample.value * (sample.wi.z.abs() / sample.pdf / continuation);
        let Some(next_hit) = intersect(view, &mut next, &mut worker.stats) else {
            return l_out + throughput * weight * environment_radiance(g, next.direction);
        };

        throughput *= weight;
        if material.is_delta() {
            l_out += throughput * view.bsdfs[next_hit.bsdf as usize].decode().emitted();
        }
        ray = next;
        hit = next_hit;
    }
}

/// Radiance estimate for one pixel and the number of samples it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelPixel {
    pub radiance: Vec3,
    pub samples: u32,
}

fn subpixel(g: &KernelGlobals, x: u32, y: u32, dx: f32, dy: f32) -> (f32, f32) {
    (
        (x as f32 + dx) / g.image_width as f32,
        (y as f32 + dy) / g.image_height as f32,
    )
}

/// Estimate pixel (x, y), counted from the bottom-left of the image.
pub fn trace_pixel(view: &SceneView<'_>, x: u32, y: u32, worker: &mut KernelWorker) -> KernelPixel {
    let g = view.globals;
    let max_samples = g.ns_aa.max(1);
    let batch = g.samples_per_batch.max(1);
    let adaptive = g.adaptive != 0;

    let mut total = Vec3::ZERO;
    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    let mut num_samples = 0u32;

    while num_samples < max_samples {
        num_samples += 1;

        let (dx, dy) = if max_samples == 1 {
            (0.5, 0.5)
        } else {
            (worker.rng.next_f32(), worker.rng.next_f32())
        };
        let (u, v) = subpixel(g, x, y, dx, dy);
        let lens = if adaptive {
            let r = worker.rng.next_f32();
            Some((r, worker.rng.next_f32() * TAU))
        } else {
            None
        };
        let ray = generate_ray(view, u, v, lens).with_depth(g.max_ray_depth);

        let sample = trace_path(view, ray, worker);
        total += sample;

        if adaptive {
            let l = luminance(sample);
            s1 += l;
            s2 += l * l;
            if num_samples % batch == 0 && num_samples > 1 {
                let n = num_samples as f32;
                let mean = s1 / n;
                let var = ((s2 - s1 * s1 / n) / (n - 1.0)).max(0.0);
                if 1.96 * (var / n).sqrt() <= g.max_tolerance * mean {
                    break;
                }
            }
        }
    }

    KernelPixel {
        radiance: total / num_samples as f32,
        samples: num_samples,
    }
}

/// Output of a kernel dispatch, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec3>,
    pub sample_counts: Vec<u32>,
    pub stats: TraversalStats,
}

impl KernelImage {
    pub fn get(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Widen to a host framebuffer for image output.
    pub fn to_framebuffer(&self) -> lumen_renderer::Framebuffer {
        let mut fb = lumen_renderer::Framebuffer::new(self.width, self.height);
        for (i, (p, &n)) in self.pixels.iter().zip(&self.sample_counts).enumerate() {
            let i = i as u32;
            fb.set(i % self.width, i / self.width, p.as_dvec3(), n);
        }
        fb
    }
}

/// Run one kernel invocation per pixel on the rayon pool.
pub fn dispatch(scene: &PackedScene) -> (KernelImage, Duration) {
    let view = scene.view();
    let g = view.globals;
    let (width, height) = (g.image_width, g.image_height);

    log::info!(
        "Dispatching {}x{} kernel invocations ({} samples max, depth {})",
        width,
        height,
        g.ns_aa,
        g.max_ray_depth
    );

    let start = Instant::now();
    let results: Vec<(KernelPixel, TraversalStats)> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % width, i / width);
            let mut worker = KernelWorker::new(Lcg::for_pixel(g.seed, x, y));
            let pixel = trace_pixel(&view, x, y, &mut worker);
            (pixel, worker.stats)
        })
        .collect();
    let elapsed = start.elapsed();

    let stats: TraversalStats = results.iter().map(|(_, s)| *s).sum();
    let image = KernelImage {
        width,
        height,
        pixels: results.iter().map(|(p, _)| p.radiance).collect(),
        sample_counts: results.iter().map(|(p, _)| p.samples).collect(),
        stats,
    };

    log::info!(
        "Kernel dispatch finished in {:.2?}: {} box tests, {} primitive tests",
        elapsed,
        stats.box_tests,
        stats.primitive_tests
    );
    (image, elapsed)
}

/// Primitive index a camera ray hits first, for picking and debugging.
pub fn pick(view: &SceneView<'_>, x: f32, y: f32) -> Option<KernelHit> {
    let mut ray = generate_ray(view, x, y, None);
    intersect(view, &mut ray, &mut TraversalStats::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_renderer::{
        Bsdf, Camera, EnvironmentLight, Light, PathTracer, PathTracerConfig, SceneBuilder, Spectrum,
        WorkerState,
    };
    use std::f32::consts::FRAC_1_PI;

    type HostVec3 = lumen_math::Vec3;

    fn lit_sphere_packed(config: PathTracerConfig) -> (lumen_renderer::Scene, Camera, PackedScene) {
        let mut builder = SceneBuilder::new();
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.5)));
        builder.add_sphere(HostVec3::ZERO, 1.0, id);
        builder.add_light(Light::point(Spectrum::splat(1.0), HostVec3::new(0.0, 0.0, 10.0)));
        let scene = builder.build().unwrap();
        let camera = Camera::new()
            .with_resolution(1, 1)
            .with_position(HostVec3::new(0.0, 0.0, 5.0), HostVec3::ZERO, HostVec3::Y);
        let packed = PackedScene::from_scene(&scene, &camera, &config).unwrap();
        (scene, camera, packed)
    }

    #[test]
    fn test_center_pixel_matches_host() {
        let config = PathTracerConfig::default()
            .with_samples(1, 1)
            .with_max_ray_depth(1)
            .without_adaptive();
        let (scene, camera, packed) = lit_sphere_packed(config.clone());
        let view = packed.view();

        let mut worker = KernelWorker::new(Lcg::new(1));
        let kernel = trace_pixel(&view, 0, 0, &mut worker);
        assert_eq!(kernel.samples, 1);
        assert!((kernel.radiance.x - 0.5 * FRAC_1_PI).abs() < 1e-5, "L = {:?}", kernel.radiance);

        let tracer = PathTracer::new(&scene, &camera, config);
        let host = tracer.raytrace_pixel(0, 0, &mut WorkerState::new(1));
        assert!((f64::from(kernel.radiance.x) - host.radiance.x).abs() < 1e-5);
    }

    #[test]
    fn test_camera_rays_match_host() {
        let camera = Camera::new()
            .with_resolution(64, 48)
            .with_position(HostVec3::new(1.0, 2.0, 6.0), HostVec3::new(0.0, 0.5, 0.0), HostVec3::Y)
            .with_fov(35.0)
            .with_lens(0.2, 5.0);
        let scene = SceneBuilder::new().build().unwrap();
        let packed = PackedScene::from_scene(&scene, &camera, &PathTracerConfig::default()).unwrap();
        let view = packed.view();

        for (x, y) in [(0.1, 0.9), (0.5, 0.5), (0.8, 0.3)] {
            let host = camera.generate_ray(x, y);
            let kernel = generate_ray(&view, x as f32, y as f32, None);
            assert!((kernel.direction.as_dvec3() - host.direction).length() < 1e-5);

            let host = camera.generate_ray_for_thin_lens(x, y, 0.7, 2.5);
            let kernel = generate_ray(&view, x as f32, y as f32, Some((0.7, 2.5)));
            assert!((kernel.origin.as_dvec3() - host.origin).length() < 1e-5);
            assert!((kernel.direction.as_dvec3() - host.direction).length() < 1e-5);
        }
    }

    #[test]
    fn test_miss_returns_environment() {
        let scene = SceneBuilder::new()
            .with_environment(EnvironmentLight::Uniform(Spectrum::splat(0.25)))
            .build()
            .unwrap();
        let camera = Camera::new().with_resolution(4, 4);
        let packed = PackedScene::from_scene(&scene, &camera, &PathTracerConfig::default()).unwrap();
        let mut worker = KernelWorker::new(Lcg::new(3));
        let l = trace_path(&packed.view(), KernelRay::new(Vec3::ZERO, Vec3::X), &mut worker);
        assert_eq!(l, Vec3::splat(0.25));
    }

    #[test]
    fn test_mirror_sees_emitter_through_delta_bounce() {
        let mut builder = SceneBuilder::new();
        let mirror = builder.add_bsdf(Bsdf::mirror(Spectrum::ONE));
        let light = builder.add_bsdf(Bsdf::emission(Spectrum::splat(4.0)));
        builder.add_sphere(HostVec3::new(0.0, 0.0, -1000.0), 999.0, mirror);
        builder.add_sphere(HostVec3::new(0.0, 0.0, 1000.0), 990.0, light);
        let scene = builder.build().unwrap();
        let config = PathTracerConfig::default().with_max_ray_depth(2);
        let packed = PackedScene::from_scene(&scene, &Camera::new(), &config).unwrap();

        let mut worker = KernelWorker::new(Lcg::new(9));
        let ray = KernelRay::new(Vec3::ZERO, -Vec3::Z).with_depth(2);
        let l = trace_path(&packed.view(), ray, &mut worker);
        assert!((l - Vec3::splat(4.0)).abs().max_element() < 1e-3, "L = {l:?}");
    }

    #[test]
    fn test_adaptive_sampling_stops_on_constant_pixel() {
        let scene = SceneBuilder::new()
            .with_environment(EnvironmentLight::Uniform(Spectrum::splat(0.5)))
            .build()
            .unwrap();
        let camera = Camera::new().with_resolution(8, 8);
        let config = PathTracerConfig::default()
            .with_samples(128, 1)
            .with_adaptive(8, 0.05);
        let packed = PackedScene::from_scene(&scene, &camera, &config).unwrap();

        let mut worker = KernelWorker::new(Lcg::new(6));
        let pixel = trace_pixel(&packed.view(), 2, 5, &mut worker);
        assert_eq!(pixel.samples, 8);
        assert!((pixel.radiance - Vec3::splat(0.5)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_dispatch_is_deterministic_and_lit() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut builder = SceneBuilder::new();
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.6)));
        builder.add_sphere(HostVec3::new(0.0, 0.0, -3.0), 1.0, id);
        builder.add_light(Light::area(
            Spectrum::splat(5.0),
            HostVec3::new(0.0, 3.0, -3.0),
            -HostVec3::Y,
            HostVec3::X,
            HostVec3::Z,
        ));
        let scene = builder.build().unwrap();
        let camera = Camera::new().with_resolution(12, 8);
        let config = PathTracerConfig::default().with_samples(8, 2).with_seed(11);
        let packed = PackedScene::from_scene(&scene, &camera, &config).unwrap();

        let (a, _) = dispatch(&packed);
        let (b, _) = dispatch(&packed);
        assert_eq!(a, b);
        assert_eq!(a.pixels.len(), 96);
        assert!(a.sample_counts.iter().all(|&n| (1..=8).contains(&n)));
        assert!(a.stats.box_tests > 0);

        // The sphere sits in the middle of the frame, lit from above.
        assert!(a.pixels.iter().any(|p| p.y > 0.0));
        assert_eq!(a.get(0, 0), Vec3::ZERO);
        assert!(pick(&packed.view(), 0.5, 0.5).is_some());
        assert!(pick(&packed.view(), 0.02, 0.02).is_none());

        let fb = a.to_framebuffer();
        assert_eq!(fb.total_samples(), a.sample_counts.iter().map(|&n| u64::from(n)).sum::<u64>());
    }

    #[test]
    fn test_kernel_and_host_agree_on_average() {
        // Sphere under a uniform sky: host and kernel estimates of the whole
        // image should agree once the noise is averaged out.
        let mut builder = SceneBuilder::new()
            .with_environment(EnvironmentLight::Uniform(Spectrum::splat(1.0)));
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.5)));
        builder.add_sphere(HostVec3::new(0.0, 0.0, -3.0), 1.0, id);
        let scene = builder.build().unwrap();
        let camera = Camera::new().with_resolution(16, 16).with_fov(50.0);
        let config = PathTracerConfig::default()
            .with_samples(64, 1)
            .with_max_ray_depth(3)
            .without_adaptive();
        let packed = PackedScene::from_scene(&scene, &camera, &config).unwrap();

        let (kernel, _) = dispatch(&packed);
        let host = lumen_renderer::render(&PathTracer::new(&scene, &camera, config));

        let kernel_mean: f64 = kernel.pixels.iter().map(|p| f64::from(p.x)).sum::<f64>() / 256.0;
        let host_mean: f64 = host.framebuffer.pixels.iter().map(|p| p.x).sum::<f64>() / 256.0;
        assert!(
            (kernel_mean - host_mean).abs() < 0.03 * host_mean,
            "kernel {kernel_mean} vs host {host_mean}"
        );
    }
}
