//! Bucket-based tile rendering.
//!
//! The image is cut into square tiles rendered independently on the rayon
//! pool, nearest-to-center first.

use crate::integrator::{PathTracer, PixelEstimate, WorkerState};
use crate::stats::TraversalStats;

/// Default bucket size in pixels.
pub const DEFAULT_BUCKET_SIZE: u32 = 64;

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Pixel column of the bucket's first pixel
    pub x: u32,
    /// Pixel row of the bucket's first pixel (rows count up from the bottom)
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Position of this bucket in the render order
    pub index: usize,
}

impl Bucket {
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Squared distance from the bucket center to `(cx, cy)`.
    fn distance2_to(&self, cx: f64, cy: f64) -> f64 {
        let bx = f64::from(self.x) + f64::from(self.width) * 0.5;
        let by = f64::from(self.y) + f64::from(self.height) * 0.5;
        (bx - cx).powi(2) + (by - cy).powi(2)
    }
}

/// Tile the image into buckets, sorted in spiral order from the center.
pub fn generate_buckets(width: u32, height: u32, bucket_size: u32) -> Vec<Bucket> {
    let size = bucket_size.max(1);
    let mut buckets: Vec<Bucket> = (0..height)
        .step_by(size as usize)
        .flat_map(|y| {
            (0..width).step_by(size as usize).map(move |x| Bucket {
                x,
                y,
                width: size.min(width - x),
                height: size.min(height - y),
                index: 0,
            })
        })
        .collect();

    let (cx, cy) = (f64::from(width) * 0.5, f64::from(height) * 0.5);
    buckets.sort_by(|a, b| a.distance2_to(cx, cy).total_cmp(&b.distance2_to(cx, cy)));
    for (i, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = i;
    }
    buckets
}

/// Result of rendering a bucket.
#[derive(Debug, Clone)]
pub struct BucketResult {
    pub bucket: Bucket,
    /// Pixel estimates in row-major order within the bucket
    pub pixels: Vec<PixelEstimate>,
    pub stats: TraversalStats,
}

/// Render every pixel of `bucket`. Each pixel restarts its RNG from the
/// configured seed and its coordinates, so output does not depend on which
/// thread renders which bucket.
pub fn render_bucket(bucket: &Bucket, tracer: &PathTracer<'_>) -> BucketResult {
    let seed = tracer.config().seed;
    let mut ws = WorkerState::new(seed);
    let mut pixels = Vec::with_capacity(bucket.pixel_count() as usize);

    for local_y in 0..bucket.height {
        for local_x in 0..bucket.width {
            let (x, y) = (bucket.x + local_x, bucket.y + local_y);
            ws.reseed(seed, x, y);
            pixels.push(tracer.raytrace_pixel(x, y, &mut ws));
        }
    }

    log::debug!(
        "Bucket {} at ({}, {}) done: {} box tests, {} primitive tests",
        bucket.index,
        bucket.x,
        bucket.y,
        ws.stats.box_tests,
        ws.stats.primitive_tests
    );

    BucketResult {
        bucket: *bucket,
        pixels,
        stats: ws.stats,
    }
}
