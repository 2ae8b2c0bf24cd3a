//! Scene container: BVH, BSDF table, lights and environment.

use std::sync::Arc;

use lumen_math::{BBox, Ray, Vec3};
use thiserror::Error;

use crate::bsdf::{Bsdf, BsdfId};
use crate::bvh::{Bvh, DEFAULT_MAX_LEAF_SIZE};
use crate::light::{EnvironmentLight, Light};
use crate::mesh::Mesh;
use crate::primitive::{Intersection, Primitive};
use crate::sphere::Sphere;
use crate::stats::TraversalStats;

/// Errors raised while assembling a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("primitive {primitive} references BSDF {bsdf}, but the table has {table_len} entries")]
    UnknownBsdf {
        primitive: usize,
        bsdf: usize,
        table_len: usize,
    },

    #[error("mesh index {index} out of range for {len} vertices")]
    MeshIndexOutOfRange { index: usize, len: usize },

    #[error("mesh index count {len} is not a multiple of 3")]
    IncompleteTriangle { len: usize },

    #[error("mesh has {normals} normals for {positions} vertices")]
    NormalCountMismatch { normals: usize, positions: usize },
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Immutable, validated scene shared read-only by all render workers.
#[derive(Debug, Clone)]
pub struct Scene {
    bvh: Bvh,
    bsdfs: Vec<Bsdf>,
    lights: Vec<Light>,
    environment: Option<EnvironmentLight>,
}

impl Scene {
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn bsdfs(&self) -> &[Bsdf] {
        &self.bsdfs
    }

    /// BSDF for an id handed out by this scene's builder.
    pub fn bsdf(&self, id: BsdfId) -> &Bsdf {
        &self.bsdfs[id.0]
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn environment(&self) -> Option<&EnvironmentLight> {
        self.environment.as_ref()
    }

    pub fn bbox(&self) -> BBox {
        self.bvh.bbox()
    }

    /// Closest hit along `ray`, narrowing its `max_t`.
    pub fn intersect(&self, ray: &mut Ray, stats: &mut TraversalStats) -> Option<Intersection> {
        let mut isect = Intersection::default();
        self.bvh.intersect(ray, &mut isect, stats).then_some(isect)
    }

    /// Whether anything blocks `ray` within its range.
    pub fn occluded(&self, ray: &Ray, stats: &mut TraversalStats) -> bool {
        self.bvh.has_intersection(ray, stats)
    }
}

/// Collects primitives, BSDFs and lights, then validates and builds the BVH.
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    primitives: Vec<Primitive>,
    bsdfs: Vec<Bsdf>,
    lights: Vec<Light>,
    environment: Option<EnvironmentLight>,
    max_leaf_size: usize,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self {
            primitives: Vec::new(),
            bsdfs: Vec::new(),
            lights: Vec::new(),
            environment: None,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
        }
    }

    pub fn with_max_leaf_size(mut self, max_leaf_size: usize) -> Self {
        self.max_leaf_size = max_leaf_size;
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentLight) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn add_bsdf(&mut self, bsdf: Bsdf) -> BsdfId {
        self.bsdfs.push(bsdf);
        BsdfId(self.bsdfs.len() - 1)
    }

    pub fn add_light(&mut self, light: Light) -> &mut Self {
        self.lights.push(light);
        self
    }

    pub fn add_primitive(&mut self, primitive: impl Into<Primitive>) -> &mut Self {
        self.primitives.push(primitive.into());
        self
    }

    pub fn add_sphere(&mut self, center: Vec3, radius: f64, bsdf: BsdfId) -> &mut Self {
        self.add_primitive(Sphere::new(center, radius, bsdf))
    }

    /// Add every triangle of `mesh`, all bound to `bsdf`.
    pub fn add_mesh(&mut self, mesh: Arc<Mesh>, bsdf: BsdfId) -> &mut Self {
        self.primitives.extend(Mesh::triangles(&mesh, bsdf));
        self
    }

    /// Validate BSDF references and build the acceleration structure.
    pub fn build(self) -> SceneResult<Scene> {
        for (primitive, p) in self.primitives.iter().enumerate() {
            let bsdf = p.bsdf().0;
            if bsdf >= self.bsdfs.len() {
                return Err(SceneError::UnknownBsdf {
                    primitive,
                    bsdf,
                    table_len: self.bsdfs.len(),
                });
            }
        }

        if self.primitives.is_empty() {
            log::warn!("Scene has no geometry; every ray will miss");
        }
        if self.lights.is_empty() && self.environment.is_none() {
            let emissive = self
                .bsdfs
                .iter()
                .any(|b| b.emitted() != lumen_math::Spectrum::ZERO);
            if !emissive {
                log::warn!("Scene has no lights, environment or emissive BSDFs; it will render black");
            }
        }

        let bvh = Bvh::new(self.primitives, self.max_leaf_size);
        log::info!(
            "Scene ready: {} primitives, {} BSDFs, {} lights",
            bvh.primitives().len(),
            self.bsdfs.len(),
            self.lights.len()
        );

        Ok(Scene {
            bvh,
            bsdfs: self.bsdfs,
            lights: self.lights,
            environment: self.environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::Spectrum;

    #[test]
    fn test_unknown_bsdf_is_rejected() {
        let mut builder = SceneBuilder::new();
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::ONE));
        builder.add_sphere(Vec3::ZERO, 1.0, id);
        builder.add_sphere(Vec3::X, 1.0, BsdfId(5));

        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnknownBsdf {
                primitive: 1,
                bsdf: 5,
                table_len: 1
            }
        ));
        assert!(err.to_string().contains("BSDF 5"));
    }

    #[test]
    fn test_triangle_scene_hit() {
        let mut builder = SceneBuilder::new();
        let id = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.5)));
        let mesh = Mesh::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2],
            None,
        )
        .unwrap();
        builder.add_mesh(Arc::new(mesh), id);
        let scene = builder.build().unwrap();

        let mut ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let mut stats = TraversalStats::default();
        let isect = scene.intersect(&mut ray, &mut stats).expect("must hit");
        assert!((isect.t - 5.0).abs() < 1e-12);
        assert!((isect.n - Vec3::Z).length() < 1e-12);
        assert_eq!(isect.bsdf, id);
        assert!(stats.primitive_tests >= 1);
    }

    #[test]
    fn test_scene_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Scene>();
    }

    #[test]
    fn test_empty_scene_builds() {
        let scene = SceneBuilder::new().build().unwrap();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::X);
        let mut stats = TraversalStats::default();
        assert!(scene.intersect(&mut ray, &mut stats).is_none());
        assert!(!scene.occluded(&ray, &mut stats));
    }
}
