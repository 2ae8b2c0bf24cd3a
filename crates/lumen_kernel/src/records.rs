//! Device-side scene records.
//!
//! Every record is `#[repr(C)]`, `Pod` and built only from 4-byte fields, so
//! a packed scene can be viewed as raw bytes and reloaded without
//! translation. Tagged records carry a `kind` discriminant followed by a
//! fixed-size parameter block; the layouts of the parameter blocks are given
//! on each `kind` constant group below.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

// Primitive kinds. Sphere payload: center[3], radius. Triangle payload:
// p0[3], p1[3], p2[3], n0[3], n1[3], n2[3].
pub const PRIM_SPHERE: u32 = 0;
pub const PRIM_TRIANGLE: u32 = 1;

// BSDF kinds. Diffuse, mirror and emission: color[3]. Microfacet: eta[3],
// k[3], alpha. Glass: ior, reflectance[3], transmittance[3].
pub const BSDF_DIFFUSE: u32 = 0;
pub const BSDF_MIRROR: u32 = 1;
pub const BSDF_MICROFACET: u32 = 2;
pub const BSDF_GLASS: u32 = 3;
pub const BSDF_EMISSION: u32 = 4;

// Light kinds. Every light starts with radiance[3]. Directional adds
// dir_to_light[3], point adds position[3], area adds position[3],
// direction[3], dim_x[3], dim_y[3].
pub const LIGHT_DIRECTIONAL: u32 = 0;
pub const LIGHT_HEMISPHERE: u32 = 1;
pub const LIGHT_POINT: u32 = 2;
pub const LIGHT_AREA: u32 = 3;

// Environment kinds stored in `KernelGlobals::env_kind`.
pub const ENV_NONE: u32 = 0;
pub const ENV_UNIFORM: u32 = 1;
pub const ENV_SKY: u32 = 2;

// `KernelGlobals::direct_lighting`.
pub const DIRECT_HEMISPHERE: u32 = 0;
pub const DIRECT_IMPORTANCE: u32 = 1;

/// Flattened BVH node. `entry_index` is taken when the box test passes,
/// `exit_index` when it fails; index 0 terminates traversal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelBvhNode {
    /// Min and max corners.
    pub bounds: [[f32; 3]; 2],
    pub prim_index: u32,
    /// Zero for interior nodes.
    pub prim_count: u32,
    pub entry_index: u32,
    pub exit_index: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelPrimitive {
    pub kind: u32,
    pub bsdf_index: u32,
    pub payload: [f32; 18],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelBsdf {
    pub kind: u32,
    pub params: [f32; 7],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelLight {
    pub kind: u32,
    pub params: [f32; 15],
}

/// Camera state. Angles are in degrees, `c2w` holds the camera-to-world
/// basis as three columns.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelCamera {
    pub h_fov: f32,
    pub v_fov: f32,
    pub n_clip: f32,
    pub f_clip: f32,
    pub lens_radius: f32,
    pub focal_distance: f32,
    pub pos: [f32; 3],
    pub c2w: [[f32; 3]; 3],
}

/// Render-wide settings and table sizes shared by every kernel invocation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelGlobals {
    pub image_width: u32,
    pub image_height: u32,
    pub max_ray_depth: u32,
    pub ns_aa: u32,
    pub ns_area_light: u32,
    pub samples_per_batch: u32,
    pub max_tolerance: f32,
    pub direct_lighting: u32,
    /// Nonzero enables adaptive sampling.
    pub adaptive: u32,
    pub seed: u32,
    pub node_count: u32,
    pub primitive_count: u32,
    pub bsdf_count: u32,
    pub light_count: u32,
    pub env_kind: u32,
    pub env_radiance: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<KernelBvhNode>() == 40);
const _: () = assert!(std::mem::size_of::<KernelPrimitive>() == 80);
const _: () = assert!(std::mem::size_of::<KernelBsdf>() == 32);
const _: () = assert!(std::mem::size_of::<KernelLight>() == 64);
const _: () = assert!(std::mem::size_of::<KernelCamera>() == 72);
const _: () = assert!(std::mem::size_of::<KernelGlobals>() == 72);

#[cold]
fn corrupt(record: &str, kind: u32) -> ! {
    panic!("corrupt {record} record: unknown kind {kind}")
}

#[inline]
fn read3(params: &[f32], at: usize) -> Vec3 {
    Vec3::new(params[at], params[at + 1], params[at + 2])
}

#[inline]
fn write3(params: &mut [f32], at: usize, v: Vec3) {
    params[at..at + 3].copy_from_slice(&v.to_array());
}

/// Decoded primitive geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelShape {
    Sphere { center: Vec3, radius: f32 },
    Triangle { p: [Vec3; 3], n: [Vec3; 3] },
}

impl KernelPrimitive {
    pub fn encode(shape: &KernelShape, bsdf_index: u32) -> Self {
        let mut payload = [0.0; 18];
        let kind = match shape {
            KernelShape::Sphere { center, radius } => {
                write3(&mut payload, 0, *center);
                payload[3] = *radius;
                PRIM_SPHERE
            }
            KernelShape::Triangle { p, n } => {
                for (i, v) in p.iter().chain(n.iter()).enumerate() {
                    write3(&mut payload, 3 * i, *v);
                }
                PRIM_TRIANGLE
            }
        };
        Self {
            kind,
            bsdf_index,
            payload,
        }
    }

    /// Panics on an unknown kind.
    pub fn decode(&self) -> KernelShape {
        let p = &self.payload;
        match self.kind {
            PRIM_SPHERE => KernelShape::Sphere {
                center: read3(p, 0),
                radius: p[3],
            },
            PRIM_TRIANGLE => KernelShape::Triangle {
                p: [read3(p, 0), read3(p, 3), read3(p, 6)],
                n: [read3(p, 9), read3(p, 12), read3(p, 15)],
            },
            kind => corrupt("primitive", kind),
        }
    }
}

/// Decoded BSDF parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelMaterial {
    Diffuse { reflectance: Vec3 },
    Mirror { reflectance: Vec3 },
    Microfacet { eta: Vec3, k: Vec3, alpha: f32 },
    Glass { ior: f32, reflectance: Vec3, transmittance: Vec3 },
    Emission { radiance: Vec3 },
}

impl KernelBsdf {
    pub fn encode(material: &KernelMaterial) -> Self {
        let mut params = [0.0; 7];
        let kind = match material {
            KernelMaterial::Diffuse { reflectance } => {
                write3(&mut params, 0, *reflectance);
                BSDF_DIFFUSE
            }
            KernelMaterial::Mirror { reflectance } => {
                write3(&mut params, 0, *reflectance);
                BSDF_MIRROR
            }
            KernelMaterial::Microfacet { eta, k, alpha } => {
                write3(&mut params, 0, *eta);
                write3(&mut params, 3, *k);
                params[6] = *alpha;
                BSDF_MICROFACET
            }
            KernelMaterial::Glass {
                ior,
                reflectance,
                transmittance,
            } => {
                params[0] = *ior;
                write3(&mut params, 1, *reflectance);
                write3(&mut params, 4, *transmittance);
                BSDF_GLASS
            }
            KernelMaterial::Emission { radiance } => {
                write3(&mut params, 0, *radiance);
                BSDF_EMISSION
            }
        };
        Self { kind, params }
    }

    /// Panics on an unknown kind.
    pub fn decode(&self) -> KernelMaterial {
        let p = &self.params;
        match self.kind {
            BSDF_DIFFUSE => KernelMaterial::Diffuse {
                reflectance: read3(p, 0),
            },
            BSDF_MIRROR => KernelMaterial::Mirror {
                reflectance: read3(p, 0),
            },
            BSDF_MICROFACET => KernelMaterial::Microfacet {
                eta: read3(p, 0),
                k: read3(p, 3),
                alpha: p[6],
            },
            BSDF_GLASS => KernelMaterial::Glass {
                ior: p[0],
                reflectance: read3(p, 1),
                transmittance: read3(p, 4),
            },
            BSDF_EMISSION => KernelMaterial::Emission {
                radiance: read3(p, 0),
            },
            kind => corrupt("BSDF", kind),
        }
    }
}

/// Decoded light parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelEmitter {
    Directional {
        radiance: Vec3,
        dir_to_light: Vec3,
    },
    Hemisphere {
        radiance: Vec3,
    },
    Point {
        radiance: Vec3,
        position: Vec3,
    },
    Area {
        radiance: Vec3,
        position: Vec3,
        direction: Vec3,
        dim_x: Vec3,
        dim_y: Vec3,
    },
}

impl KernelLight {
    pub fn encode(emitter: &KernelEmitter) -> Self {
        let mut params = [0.0; 15];
        let kind = match emitter {
            KernelEmitter::Directional {
                radiance,
                dir_to_light,
            } => {
                write3(&mut params, 0, *radiance);
                write3(&mut params, 3, *dir_to_light);
                LIGHT_DIRECTIONAL
            }
            KernelEmitter::Hemisphere { radiance } => {
                write3(&mut params, 0, *radiance);
                LIGHT_HEMISPHERE
            }
            KernelEmitter::Point { radiance, position } => {
                write3(&mut params, 0, *radiance);
                write3(&mut params, 3, *position);
                LIGHT_POINT
            }
            KernelEmitter::Area {
                radiance,
                position,
                direction,
                dim_x,
                dim_y,
            } => {
                for (i, v) in [radiance, position, direction, dim_x, dim_y].into_iter().enumerate() {
                    write3(&mut params, 3 * i, *v);
                }
                LIGHT_AREA
            }
        };
        Self { kind, params }
    }

    /// Panics on an unknown kind.
    pub fn decode(&self) -> KernelEmitter {
        let p = &self.params;
        match self.kind {
            LIGHT_DIRECTIONAL => KernelEmitter::Directional {
                radiance: read3(p, 0),
                dir_to_light: read3(p, 3),
            },
            LIGHT_HEMISPHERE => KernelEmitter::Hemisphere {
                radiance: read3(p, 0),
            },
            LIGHT_POINT => KernelEmitter::Point {
                radiance: read3(p, 0),
                position: read3(p, 3),
            },
            LIGHT_AREA => KernelEmitter::Area {
                radiance: read3(p, 0),
                position: read3(p, 3),
                direction: read3(p, 6),
                dim_x: read3(p, 9),
                dim_y: read3(p, 12),
            },
            kind => corrupt("light", kind),
        }
    }
}
