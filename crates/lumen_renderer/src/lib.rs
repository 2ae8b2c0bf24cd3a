//! Lumen renderer - CPU path tracing
//!
//! A Monte Carlo path tracer for physically-based rendering: SAH BVH over
//! spheres and mesh triangles, a closed set of BSDFs and lights, and an
//! adaptive per-pixel sampler rendered bucket by bucket on rayon.

pub mod bsdf;
pub mod bucket;
pub mod bvh;
pub mod camera;
pub mod config;
pub mod integrator;
pub mod light;
pub mod mesh;
pub mod primitive;
pub mod renderer;
pub mod sampler;
pub mod scene;
pub mod sphere;
pub mod stats;
pub mod triangle;

pub use bsdf::{Bsdf, BsdfId, BsdfSample};
pub use bucket::{generate_buckets, render_bucket, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
pub use bvh::{Bvh, BvhNode, FlatBvh, FlatNode, NodeKind, DEFAULT_MAX_LEAF_SIZE};
pub use camera::Camera;
pub use config::{ConfigError, ConfigResult, DirectLighting, PathTracerConfig};
pub use integrator::{PathTracer, PixelEstimate, WorkerState, CONTINUATION_PROBABILITY};
pub use light::{EnvironmentLight, Light, LightSample};
pub use mesh::Mesh;
pub use primitive::{Intersection, Primitive};
pub use renderer::{render, Framebuffer, RenderError, RenderOutput, RenderResult};
pub use scene::{Scene, SceneBuilder, SceneError, SceneResult};
pub use sphere::Sphere;
pub use stats::TraversalStats;
pub use triangle::Triangle;

/// Re-export the math types used throughout the public API
pub use lumen_math::{BBox, Frame, Interval, Ray, Spectrum, Vec2, Vec3};
