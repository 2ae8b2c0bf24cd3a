//! Packing a host scene into flat kernel records.
//!
//! The BVH is flattened into entry/exit form and primitives are emitted in
//! the BVH's leaf order, so leaf ranges index the primitive table directly.
//! All f64 values are narrowed to f32 here and nowhere else.

use bytemuck::{Pod, PodCastError};
use glam::Vec3;
use lumen_renderer::{
    Bsdf, Camera, DirectLighting, EnvironmentLight, Light, PathTracerConfig, Primitive, Scene,
};
use thiserror::Error;

use crate::records::{
    KernelBsdf, KernelBvhNode, KernelCamera, KernelEmitter, KernelGlobals, KernelLight,
    KernelMaterial, KernelPrimitive, KernelShape, BSDF_EMISSION, DIRECT_HEMISPHERE,
    DIRECT_IMPORTANCE, ENV_NONE, ENV_SKY, ENV_UNIFORM, LIGHT_AREA, PRIM_SPHERE, PRIM_TRIANGLE,
};

#[derive(Error, Debug)]
pub enum PackError {
    #[error("primitive {primitive} references BSDF {bsdf}, but the table has {table_len} entries")]
    UnknownBsdf {
        primitive: usize,
        bsdf: usize,
        table_len: usize,
    },
    #[error("{what} index {index} does not fit in 32 bits")]
    IndexOverflow { what: &'static str, index: usize },
    #[error("byte buffer does not hold whole records: {0:?}")]
    BadLayout(PodCastError),
    #[error("invalid packed scene: {0}")]
    Validation(String),
}

pub type PackResult<T> = Result<T, PackError>;

/// Narrow a host vector to kernel precision.
#[inline]
pub fn to_kernel_vec(v: lumen_math::Vec3) -> Vec3 {
    v.as_vec3()
}

/// Closest f32 at or below `x`.
fn round_down(x: f64) -> f32 {
    let f = x as f32;
    if f64::from(f) <= x {
        f
    } else if f == 0.0 {
        -f32::from_bits(1)
    } else if f > 0.0 {
        f32::from_bits(f.to_bits() - 1)
    } else {
        f32::from_bits(f.to_bits() + 1)
    }
}

/// Closest f32 at or above `x`.
fn round_up(x: f64) -> f32 {
    -round_down(-x)
}

fn index_u32(what: &'static str, index: usize) -> PackResult<u32> {
    u32::try_from(index).map_err(|_| PackError::IndexOverflow { what, index })
}

/// Byte views of every table in a packed scene, as handed to a device.
#[derive(Debug, Clone, Copy)]
pub struct SceneBuffers<'a> {
    pub globals: &'a [u8],
    pub camera: &'a [u8],
    pub nodes: &'a [u8],
    pub primitives: &'a [u8],
    pub bsdfs: &'a [u8],
    pub lights: &'a [u8],
}

/// Read-only borrow of the packed tables shared by all kernel workers.
#[derive(Debug, Clone, Copy)]
pub struct SceneView<'a> {
    pub globals: &'a KernelGlobals,
    pub camera: &'a KernelCamera,
    pub nodes: &'a [KernelBvhNode],
    pub primitives: &'a [KernelPrimitive],
    pub bsdfs: &'a [KernelBsdf],
    pub lights: &'a [KernelLight],
}

/// Complete scene state for the kernel path tracer.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedScene {
    pub globals: KernelGlobals,
    pub camera: KernelCamera,
    pub nodes: Vec<KernelBvhNode>,
    /// Primitives in BVH leaf order.
    pub primitives: Vec<KernelPrimitive>,
    pub bsdfs: Vec<KernelBsdf>,
    pub lights: Vec<KernelLight>,
}

impl PackedScene {
    pub fn from_scene(scene: &Scene, camera: &Camera, config: &PathTracerConfig) -> PackResult<Self> {
        let flat = scene.bvh().flatten();

        let nodes = flat
            .nodes()
            .iter()
            .map(|node| {
                Ok(KernelBvhNode {
                    bounds: [
                        [
                            round_down(node.bbox.min.x),
                            round_down(node.bbox.min.y),
                            round_down(node.bbox.min.z),
                        ],
                        [
                            round_up(node.bbox.max.x),
                            round_up(node.bbox.max.y),
                            round_up(node.bbox.max.z),
                        ],
                    ],
                    prim_index: index_u32("primitive", node.prim_start)?,
                    prim_count: index_u32("primitive", node.prim_count)?,
                    entry_index: index_u32("node", node.entry)?,
                    exit_index: index_u32("node", node.exit)?,
                })
            })
            .collect::<PackResult<Vec<_>>>()?;

        let table_len = scene.bsdfs().len();
        let primitives = flat
            .primitives()
            .iter()
            .enumerate()
            .map(|(i, prim)| {
                let bsdf = prim.bsdf().0;
                if bsdf >= table_len {
                    return Err(PackError::UnknownBsdf {
                        primitive: i,
                        bsdf,
                        table_len,
                    });
                }
                Ok(KernelPrimitive::encode(&pack_shape(prim), index_u32("BSDF", bsdf)?))
            })
            .collect::<PackResult<Vec<_>>>()?;

        let bsdfs: Vec<KernelBsdf> = scene.bsdfs().iter().map(pack_bsdf).collect();
        let lights: Vec<KernelLight> = scene.lights().iter().map(pack_light).collect();

        let (env_kind, env_radiance) = match scene.environment() {
            None => (ENV_NONE, Vec3::ZERO),
            Some(EnvironmentLight::Uniform(l)) => (ENV_UNIFORM, to_kernel_vec(*l)),
            Some(EnvironmentLight::Sky(l)) => (ENV_SKY, to_kernel_vec(*l)),
        };

        let globals = KernelGlobals {
            image_width: camera.image_width,
            image_height: camera.image_height,
            max_ray_depth: config.max_ray_depth,
            ns_aa: config.ns_aa,
            ns_area_light: config.ns_area_light,
            samples_per_batch: config.samples_per_batch,
            max_tolerance: config.max_tolerance as f32,
            direct_lighting: match config.direct_lighting {
                DirectLighting::Hemisphere => DIRECT_HEMISPHERE,
                DirectLighting::Importance => DIRECT_IMPORTANCE,
            },
            adaptive: u32::from(config.adaptive),
            seed: (config.seed ^ (config.seed >> 32)) as u32,
            node_count: index_u32("node", nodes.len())?,
            primitive_count: index_u32("primitive", primitives.len())?,
            bsdf_count: index_u32("BSDF", bsdfs.len())?,
            light_count: index_u32("light", lights.len())?,
            env_kind,
            env_radiance: env_radiance.to_array(),
        };

        let packed = Self {
            globals,
            camera: pack_camera(camera),
            nodes,
            primitives,
            bsdfs,
            lights,
        };
        packed.validate()?;

        log::info!(
            "Packed scene: {} nodes, {} primitives, {} BSDFs, {} lights ({} bytes)",
            packed.nodes.len(),
            packed.primitives.len(),
            packed.bsdfs.len(),
            packed.lights.len(),
            packed.byte_len()
        );
        Ok(packed)
    }

    /// Check that every index and discriminant stays inside its table.
    pub fn validate(&self) -> PackResult<()> {
        let g = &self.globals;
        let invalid = |msg: String| Err(PackError::Validation(msg));

        for (what, declared, actual) in [
            ("node", g.node_count, self.nodes.len()),
            ("primitive", g.primitive_count, self.primitives.len()),
            ("BSDF", g.bsdf_count, self.bsdfs.len()),
            ("light", g.light_count, self.lights.len()),
        ] {
            if declared as usize != actual {
                return invalid(format!("{what} count is {declared} but {actual} records are present"));
            }
        }

        if g.ns_aa == 0 || g.samples_per_batch == 0 {
            return invalid("sample counts must be at least 1".to_string());
        }
        if g.direct_lighting > DIRECT_IMPORTANCE {
            return invalid(format!("unknown direct lighting mode {}", g.direct_lighting));
        }
        if g.env_kind > ENV_SKY {
            return invalid(format!("unknown environment kind {}", g.env_kind));
        }

        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.entry_index as usize >= n || node.exit_index as usize >= n {
                return invalid(format!("node {i} jumps outside the node table"));
            }
            let [min, max] = node.bounds;
            if (0..3).any(|a| min[a].is_nan() || max[a].is_nan() || min[a] > max[a]) {
                return invalid(format!("node {i} has inverted or NaN bounds"));
            }
            if node.prim_count > 0 {
                let end = u64::from(node.prim_index) + u64::from(node.prim_count);
                if end > self.primitives.len() as u64 {
                    return invalid(format!("leaf {i} covers primitives past the table end"));
                }
                if node.entry_index != node.exit_index {
                    return invalid(format!("leaf {i} has distinct entry and exit"));
                }
            } else if node.entry_index as usize != i + 1 {
                return invalid(format!("interior node {i} does not enter its left child"));
            }
        }

        for (i, prim) in self.primitives.iter().enumerate() {
            if prim.kind != PRIM_SPHERE && prim.kind != PRIM_TRIANGLE {
                return invalid(format!("primitive {i} has unknown kind {}", prim.kind));
            }
            if prim.bsdf_index as usize >= self.bsdfs.len() {
                return Err(PackError::UnknownBsdf {
                    primitive: i,
                    bsdf: prim.bsdf_index as usize,
                    table_len: self.bsdfs.len(),
                });
            }
        }
        if let Some(i) = self.bsdfs.iter().position(|b| b.kind > BSDF_EMISSION) {
            return invalid(format!("BSDF {i} has unknown kind {}", self.bsdfs[i].kind));
        }
        if let Some(i) = self.lights.iter().position(|l| l.kind > LIGHT_AREA) {
            return invalid(format!("light {i} has unknown kind {}", self.lights[i].kind));
        }
        Ok(())
    }

    pub fn view(&self) -> SceneView<'_> {
        SceneView {
            globals: &self.globals,
            camera: &self.camera,
            nodes: &self.nodes,
            primitives: &self.primitives,
            bsdfs: &self.bsdfs,
            lights: &self.lights,
        }
    }

    pub fn buffers(&self) -> SceneBuffers<'_> {
        SceneBuffers {
            globals: bytemuck::bytes_of(&self.globals),
            camera: bytemuck::bytes_of(&self.camera),
            nodes: bytemuck::cast_slice(&self.nodes),
            primitives: bytemuck::cast_slice(&self.primitives),
            bsdfs: bytemuck::cast_slice(&self.bsdfs),
            lights: bytemuck::cast_slice(&self.lights),
        }
    }

    /// Total size of all tables in bytes.
    pub fn byte_len(&self) -> usize {
        let b = self.buffers();
        b.globals.len() + b.camera.len() + b.nodes.len() + b.primitives.len() + b.bsdfs.len() + b.lights.len()
    }

    /// Rebuild from byte buffers and re-run `validate`. Buffers need no
    /// particular alignment.
    pub fn from_buffers(buffers: &SceneBuffers<'_>) -> PackResult<Self> {
        let packed = Self {
            globals: read_record(buffers.globals)?,
            camera: read_record(buffers.camera)?,
            nodes: read_records(buffers.nodes)?,
            primitives: read_records(buffers.primitives)?,
            bsdfs: read_records(buffers.bsdfs)?,
            lights: read_records(buffers.lights)?,
        };
        packed.validate()?;
        Ok(packed)
    }
}

fn read_record<T: Pod>(bytes: &[u8]) -> PackResult<T> {
    bytemuck::try_pod_read_unaligned(bytes).map_err(PackError::BadLayout)
}

fn read_records<T: Pod>(bytes: &[u8]) -> PackResult<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(PackError::BadLayout(PodCastError::OutputSliceWouldHaveSlop));
    }
    bytes.chunks_exact(size).map(read_record).collect()
}

fn pack_shape(prim: &Primitive) -> KernelShape {
    match prim {
        Primitive::Sphere(s) => KernelShape::Sphere {
            center: to_kernel_vec(s.center()),
            radius: s.radius() as f32,
        },
        Primitive::Triangle(t) => KernelShape::Triangle {
            p: t.positions().map(to_kernel_vec),
            n: t.normals().map(to_kernel_vec),
        },
    }
}

fn pack_bsdf(bsdf: &Bsdf) -> KernelBsdf {
    let material = match bsdf {
        Bsdf::Diffuse { reflectance } => KernelMaterial::Diffuse {
            reflectance: to_kernel_vec(*reflectance),
        },
        Bsdf::Mirror { reflectance } => KernelMaterial::Mirror {
            reflectance: to_kernel_vec(*reflectance),
        },
        Bsdf::Microfacet { eta, k, alpha } => KernelMaterial::Microfacet {
            eta: to_kernel_vec(*eta),
            k: to_kernel_vec(*k),
            alpha: *alpha as f32,
        },
        Bsdf::Glass {
            ior,
            reflectance,
            transmittance,
        } => KernelMaterial::Glass {
            ior: *ior as f32,
            reflectance: to_kernel_vec(*reflectance),
            transmittance: to_kernel_vec(*transmittance),
        },
        Bsdf::Emission { radiance } => KernelMaterial::Emission {
            radiance: to_kernel_vec(*radiance),
        },
    };
    KernelBsdf::encode(&material)
}

fn pack_light(light: &Light) -> KernelLight {
    let emitter = match light {
        Light::Directional {
            radiance,
            dir_to_light,
        } => KernelEmitter::Directional {
            radiance: to_kernel_vec(*radiance),
            dir_to_light: to_kernel_vec(*dir_to_light),
        },
        // The hemisphere orientation is fixed; only the radiance travels.
        Light::InfiniteHemisphere { radiance, .. } => KernelEmitter::Hemisphere {
            radiance: to_kernel_vec(*radiance),
        },
        Light::Point { radiance, position } => KernelEmitter::Point {
            radiance: to_kernel_vec(*radiance),
            position: to_kernel_vec(*position),
        },
        Light::Area {
            radiance,
            position,
            direction,
            dim_x,
            dim_y,
            ..
        } => KernelEmitter::Area {
            radiance: to_kernel_vec(*radiance),
            position: to_kernel_vec(*position),
            direction: to_kernel_vec(*direction),
            dim_x: to_kernel_vec(*dim_x),
            dim_y: to_kernel_vec(*dim_y),
        },
    };
    KernelLight::encode(&emitter)
}

fn pack_camera(camera: &Camera) -> KernelCamera {
    let c2w = camera.c2w();
    let (n_clip, f_clip) = camera.clip();
    KernelCamera {
        h_fov: camera.hfov() as f32,
        v_fov: camera.vfov() as f32,
        n_clip: n_clip as f32,
        f_clip: f_clip as f32,
        lens_radius: camera.lens_radius() as f32,
        focal_distance: camera.focal_distance() as f32,
        pos: to_kernel_vec(camera.position()).to_array(),
        c2w: [
            to_kernel_vec(c2w.x_axis).to_array(),
            to_kernel_vec(c2w.y_axis).to_array(),
            to_kernel_vec(c2w.z_axis).to_array(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BSDF_DIFFUSE, BSDF_GLASS, LIGHT_HEMISPHERE, LIGHT_POINT};
    use lumen_renderer::{Mesh, SceneBuilder, Spectrum};
    use std::sync::Arc;

    type HostVec3 = lumen_math::Vec3;

    fn test_scene() -> Scene {
        let mut builder = SceneBuilder::new()
            .with_max_leaf_size(1)
            .with_environment(EnvironmentLight::Sky(Spectrum::splat(0.2)));
        let white = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.7)));
        let glass = builder.add_bsdf(Bsdf::glass(1.5, Spectrum::ONE, Spectrum::ONE));
        builder.add_sphere(HostVec3::new(-2.0, 0.0, -4.0), 1.0, glass);
        builder.add_sphere(HostVec3::new(2.0, 0.0, -4.0), 1.0, white);
        let floor = Mesh::new(
            vec![
                HostVec3::new(-5.0, -1.0, 0.0),
                HostVec3::new(5.0, -1.0, 0.0),
                HostVec3::new(5.0, -1.0, -10.0),
                HostVec3::new(-5.0, -1.0, -10.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
            None,
        )
        .unwrap();
        builder.add_mesh(Arc::new(floor), white);
        builder.add_light(Light::point(Spectrum::splat(4.0), HostVec3::new(0.0, 5.0, 0.0)));
        builder.add_light(Light::infinite_hemisphere(Spectrum::splat(0.5)));
        builder.build().unwrap()
    }

    fn packed() -> PackedScene {
        let scene = test_scene();
        let camera = Camera::new().with_resolution(32, 24);
        PackedScene::from_scene(&scene, &camera, &PathTracerConfig::default()).unwrap()
    }

    #[test]
    fn test_pack_counts_and_kinds() {
        let _ = env_logger::builder().is_test(true).try_init();

        let scene = test_scene();
        let p = packed();
        assert_eq!(p.globals.node_count as usize, scene.bvh().nodes().len());
        assert_eq!(p.primitives.len(), 4);
        assert_eq!(p.globals.primitive_count, 4);
        assert_eq!(p.bsdfs[0].kind, BSDF_DIFFUSE);
        assert_eq!(p.bsdfs[1].kind, BSDF_GLASS);
        assert_eq!(p.lights[0].kind, LIGHT_POINT);
        assert_eq!(p.lights[1].kind, LIGHT_HEMISPHERE);
        assert_eq!(p.globals.env_kind, ENV_SKY);
        assert_eq!(p.globals.image_width, 32);
        assert_eq!(p.globals.direct_lighting, DIRECT_IMPORTANCE);
    }

    #[test]
    fn test_primitives_follow_leaf_order() {
        let scene = test_scene();
        let p = packed();
        for (host, kernel) in scene.bvh().primitives().iter().zip(&p.primitives) {
            assert_eq!(host.bsdf().0 as u32, kernel.bsdf_index);
            let kind = match host {
                Primitive::Sphere(_) => PRIM_SPHERE,
                Primitive::Triangle(_) => PRIM_TRIANGLE,
            };
            assert_eq!(kind, kernel.kind);
        }
    }

    #[test]
    fn test_node_bounds_contain_host_bounds() {
        let scene = test_scene();
        let p = packed();
        for (host, kernel) in scene.bvh().nodes().iter().zip(&p.nodes) {
            for a in 0..3 {
                assert!(f64::from(kernel.bounds[0][a]) <= host.bbox.min[a]);
                assert!(f64::from(kernel.bounds[1][a]) >= host.bbox.max[a]);
            }
        }
    }

    #[test]
    fn test_outward_rounding() {
        let x = 0.1f64;
        assert!(f64::from(round_down(x)) <= x);
        assert!(f64::from(round_up(x)) >= x);
        assert!(f64::from(round_down(-x)) <= -x);
        assert!(f64::from(round_down(1e-50)) <= 1e-50);
        assert!(f64::from(round_up(-1e-50)) >= -1e-50);
        assert_eq!(round_down(2.0), 2.0);
        assert_eq!(round_up(-2.0), -2.0);
    }

    #[test]
    fn test_kernel_vec_precision() {
        let v = HostVec3::new(1.0 / 3.0, -12345.678, 1e-3);
        let k = to_kernel_vec(v);
        for a in 0..3 {
            let rel = (f64::from(k[a]) - v[a]).abs() / v[a].abs();
            assert!(rel <= f64::from(f32::EPSILON), "axis {a}: relative error {rel}");
        }
    }

    #[test]
    fn test_byte_reload_round_trips() {
        let p = packed();
        let buffers = p.buffers();
        assert_eq!(buffers.nodes.len(), p.nodes.len() * 40);

        // Copy into unaligned storage to mimic a device readback.
        let mut storage = vec![0u8; buffers.primitives.len() + 1];
        storage[1..].copy_from_slice(buffers.primitives);
        let reloaded = PackedScene::from_buffers(&SceneBuffers {
            primitives: &storage[1..],
            ..buffers
        })
        .unwrap();
        assert_eq!(reloaded, p);
    }

    #[test]
    fn test_truncated_buffer_is_bad_layout() {
        let p = packed();
        let buffers = p.buffers();
        let short = &buffers.nodes[..buffers.nodes.len() - 3];
        let err = PackedScene::from_buffers(&SceneBuffers {
            nodes: short,
            ..buffers
        })
        .unwrap_err();
        assert!(matches!(err, PackError::BadLayout(_)));

        let err = PackedScene::from_buffers(&SceneBuffers {
            globals: &buffers.globals[..8],
            ..buffers
        })
        .unwrap_err();
        assert!(matches!(err, PackError::BadLayout(_)));
    }

    #[test]
    fn test_validate_catches_corruption() {
        let mut p = packed();
        p.primitives[0].bsdf_index = 7;
        assert!(matches!(
            p.validate(),
            Err(PackError::UnknownBsdf { bsdf: 7, table_len: 2, .. })
        ));

        let mut p = packed();
        p.nodes[0].exit_index = 1000;
        assert!(matches!(p.validate(), Err(PackError::Validation(_))));

        let mut p = packed();
        p.globals.light_count = 9;
        assert!(matches!(p.validate(), Err(PackError::Validation(_))));

        let mut p = packed();
        p.bsdfs[1].kind = 77;
        assert!(matches!(p.validate(), Err(PackError::Validation(_))));

        let mut p = packed();
        let leaf = p.nodes.iter().position(|n| n.prim_count > 0).unwrap();
        p.nodes[leaf].prim_index = 3;
        p.nodes[leaf].prim_count = 2;
        assert!(matches!(p.validate(), Err(PackError::Validation(_))));
    }

    #[test]
    fn test_index_overflow() {
        assert_eq!(index_u32("node", 12).unwrap(), 12);
        if usize::BITS > 32 {
            let err = index_u32("node", u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, PackError::IndexOverflow { what: "node", .. }));
        }
    }

    #[test]
    fn test_empty_scene_packs() {
        let scene = SceneBuilder::new().build().unwrap();
        let p = PackedScene::from_scene(&scene, &Camera::new(), &PathTracerConfig::default()).unwrap();
        assert!(p.nodes.is_empty());
        assert!(p.primitives.is_empty());
        assert_eq!(p.globals.env_kind, ENV_NONE);
    }
}
