//! Lumen kernel - data-parallel path tracing over flat records
//!
//! A host [`lumen_renderer::Scene`] is packed into `Pod` tables of
//! single-precision records ([`records`]) that can be handed to a device as
//! raw bytes. The kernel side traverses the flattened BVH without a stack
//! and runs one path-tracing invocation per pixel, dispatched here on rayon.

pub mod pack;
pub mod pathtrace;
pub mod records;
pub mod rng;
pub mod shading;
pub mod traverse;

pub use pack::{to_kernel_vec, PackError, PackResult, PackedScene, SceneBuffers, SceneView};
pub use pathtrace::{
    dispatch, generate_ray, pick, trace_path, trace_pixel, KernelImage, KernelPixel, KernelWorker,
};
pub use records::{
    KernelBsdf, KernelBvhNode, KernelCamera, KernelEmitter, KernelGlobals, KernelLight,
    KernelMaterial, KernelPrimitive, KernelShape,
};
pub use rng::Lcg;
pub use traverse::{intersect, occluded, KernelHit, KernelRay, EPS_F};
