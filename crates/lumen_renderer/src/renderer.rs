//! Parallel image rendering and the framebuffer it writes.
//!
//! Pixels are stored with row 0 at the bottom of the image, matching the
//! camera's normalized coordinates; conversion to 8-bit output flips rows.

use std::path::Path;
use std::time::{Duration, Instant};

use lumen_math::Spectrum;
use rayon::prelude::*;
use thiserror::Error;

use crate::bucket::{generate_buckets, render_bucket, BucketResult};
use crate::integrator::PathTracer;
use crate::stats::TraversalStats;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f64) -> f64 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear radiance value to 8-bit RGBA.
pub fn spectrum_to_rgba(s: Spectrum) -> [u8; 4] {
    let to_byte = |c: f64| (255.0 * linear_to_gamma(c).clamp(0.0, 1.0)) as u8;
    [to_byte(s.x), to_byte(s.y), to_byte(s.z), 255]
}

/// Radiance and per-pixel sample counts for a rendered image.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Spectrum>,
    pub sample_counts: Vec<u32>,
}

impl Framebuffer {
    /// Create a new framebuffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            pixels: vec![Spectrum::ZERO; len],
            sample_counts: vec![0; len],
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Spectrum {
        self.pixels[self.offset(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, radiance: Spectrum, samples: u32) {
        let i = self.offset(x, y);
        self.pixels[i] = radiance;
        self.sample_counts[i] = samples;
    }

    pub fn samples(&self, x: u32, y: u32) -> u32 {
        self.sample_counts[self.offset(x, y)]
    }

    /// Total samples taken over the image.
    pub fn total_samples(&self) -> u64 {
        self.sample_counts.iter().map(|&s| u64::from(s)).sum()
    }

    /// RGBA bytes, top row first.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.rows_top_down(|x, y| spectrum_to_rgba(self.get(x, y)))
    }

    /// Sample-count heat map: blue for few samples, red for the most.
    pub fn sample_rate_image(&self) -> Vec<u8> {
        let max = self.sample_counts.iter().copied().max().unwrap_or(0).max(1);
        self.rows_top_down(|x, y| {
            let ratio = f64::from(self.samples(x, y)) / f64::from(max);
            [(255.0 * ratio) as u8, 0, (255.0 * (1.0 - ratio)) as u8, 255]
        })
    }

    fn rows_top_down(&self, mut pixel: impl FnMut(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.width * self.height * 4) as usize);
        for row in 0..self.height {
            let y = self.height - 1 - row;
            for x in 0..self.width {
                bytes.extend_from_slice(&pixel(x, y));
            }
        }
        bytes
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        image::save_buffer(
            path,
            &self.to_rgba8(),
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )?;
        Ok(())
    }

    pub fn save_sample_rate_png(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        image::save_buffer(
            path,
            &self.sample_rate_image(),
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )?;
        Ok(())
    }

    fn write_bucket(&mut self, result: &BucketResult) {
        let b = &result.bucket;
        for (i, estimate) in result.pixels.iter().enumerate() {
            let i = i as u32;
            self.set(b.x + i % b.width, b.y + i / b.width, estimate.radiance, estimate.samples);
        }
    }
}

/// Everything a finished render produces.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub framebuffer: Framebuffer,
    pub stats: TraversalStats,
    pub elapsed: Duration,
}

/// Render the full image on the rayon pool.
pub fn render(tracer: &PathTracer<'_>) -> RenderOutput {
    let camera = tracer.camera();
    let (width, height) = (camera.image_width, camera.image_height);
    let buckets = generate_buckets(width, height, tracer.config().bucket_size);

    log::info!(
        "Rendering {}x{} in {} buckets ({} samples max, depth {})",
        width,
        height,
        buckets.len(),
        tracer.config().ns_aa,
        tracer.config().max_ray_depth
    );

    let start = Instant::now();
    let results: Vec<BucketResult> = buckets
        .par_iter()
        .map(|bucket| render_bucket(bucket, tracer))
        .collect();
    let elapsed = start.elapsed();

    let mut framebuffer = Framebuffer::new(width, height);
    for result in &results {
        framebuffer.write_bucket(result);
    }
    let stats: TraversalStats = results.iter().map(|r| r.stats).sum();

    let samples = framebuffer.total_samples();
    let pixels = u64::from(width) * u64::from(height);
    log::info!(
        "Render finished in {:.2?}: {:.1} samples/pixel, {:.0} camera rays/s, {:.1} tests/ray",
        elapsed,
        samples as f64 / pixels.max(1) as f64,
        samples as f64 / elapsed.as_secs_f64().max(1e-9),
        stats.total() as f64 / samples.max(1) as f64
    );

    RenderOutput {
        framebuffer,
        stats,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdf::Bsdf;
    use crate::camera::Camera;
    use crate::config::PathTracerConfig;
    use crate::light::{EnvironmentLight, Light};
    use crate::scene::SceneBuilder;
    use lumen_math::Vec3;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(-1.0), 0.0);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_spectrum_to_rgba_clamps() {
        assert_eq!(spectrum_to_rgba(Spectrum::new(4.0, 0.0, 0.25)), [255, 0, 127, 255]);
    }

    #[test]
    fn test_rgba_rows_are_flipped() {
        let mut fb = Framebuffer::new(2, 2);
        fb.set(0, 0, Spectrum::ONE, 1);
        let bytes = fb.to_rgba8();
        // Bottom-left pixel lands in the last row of the output.
        assert_eq!(&bytes[8..12], &[255, 255, 255, 255]);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_sample_rate_image_extremes() {
        let mut fb = Framebuffer::new(2, 1);
        fb.set(0, 0, Spectrum::ZERO, 4);
        fb.set(1, 0, Spectrum::ZERO, 16);
        let bytes = fb.sample_rate_image();
        assert_eq!(&bytes[4..8], &[255, 0, 0, 255]);
        assert_eq!(bytes[0], 63);
    }

    #[test]
    fn test_render_sky_fills_every_pixel() {
        let _ = env_logger::builder().is_test(true).try_init();

        let scene = SceneBuilder::new()
            .with_environment(EnvironmentLight::Uniform(Spectrum::splat(0.3)))
            .build()
            .unwrap();
        let camera = Camera::new().with_resolution(20, 12);
        let config = PathTracerConfig::default()
            .with_samples(4, 1)
            .with_bucket_size(8);
        let tracer = PathTracer::new(&scene, &camera, config);

        let output = render(&tracer);
        let fb = &output.framebuffer;
        assert_eq!(fb.pixels.len(), 240);
        assert!(fb.pixels.iter().all(|&p| (p - Spectrum::splat(0.3)).abs().max_element() < 1e-12));
        assert!(fb.sample_counts.iter().all(|&s| s == 4));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut builder = SceneBuilder::new();
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.6)));
        builder.add_sphere(Vec3::new(0.0, 0.0, -3.0), 1.0, id);
        builder.add_light(Light::area(
            Spectrum::splat(5.0),
            Vec3::new(0.0, 3.0, -3.0),
            -Vec3::Y,
            Vec3::X,
            Vec3::Z,
        ));
        let scene = builder.build().unwrap();
        let camera = Camera::new().with_resolution(12, 8);
        let config = PathTracerConfig::default()
            .with_samples(8, 2)
            .with_bucket_size(4)
            .with_seed(11);
        let tracer = PathTracer::new(&scene, &camera, config);

        let a = render(&tracer);
        let b = render(&tracer);
        assert_eq!(a.framebuffer, b.framebuffer);
        assert_eq!(a.stats, b.stats);
        assert!(a.stats.box_tests > 0);
        assert!(a.framebuffer.pixels.iter().any(|p| p.x > 0.0));
    }
}
