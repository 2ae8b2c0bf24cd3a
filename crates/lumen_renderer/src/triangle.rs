//! Triangle primitive for ray tracing.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection and
//! interpolates the mesh's vertex normals for shading.

use std::sync::Arc;

use lumen_math::{BBox, Ray, Vec3};

use crate::bsdf::BsdfId;
use crate::mesh::Mesh;
use crate::primitive::Intersection;

/// Determinants below this are treated as a ray parallel to the triangle.
const PARALLEL_EPSILON: f64 = 1e-12;

/// A triangle referencing three vertices of a shared mesh.
#[derive(Clone, Debug)]
pub struct Triangle {
    mesh: Arc<Mesh>,
    v: [usize; 3],
    bsdf: BsdfId,
}

impl Triangle {
    pub fn new(mesh: Arc<Mesh>, v: [usize; 3], bsdf: BsdfId) -> Self {
        Self { mesh, v, bsdf }
    }

    pub fn bsdf(&self) -> BsdfId {
        self.bsdf
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn vertex_indices(&self) -> [usize; 3] {
        self.v
    }

    pub fn positions(&self) -> [Vec3; 3] {
        self.v.map(|i| self.mesh.positions[i])
    }

    pub fn normals(&self) -> [Vec3; 3] {
        self.v.map(|i| self.mesh.normals[i])
    }

    pub fn bbox(&self) -> BBox {
        let [p0, p1, p2] = self.positions();
        let mut bbox = BBox::from_points(p0, p1);
        bbox.expand_point(p2);
        bbox
    }

    /// Möller-Trumbore; returns `(t, b1, b2)` for hits inside the ray range.
    fn hit_params(&self, ray: &Ray) -> Option<(f64, f64, f64)> {
        let [p0, p1, p2] = self.positions();
        let e1 = p1 - p0;
        let e2 = p2 - p0;

        let s1 = ray.direction.cross(e2);
        let det = s1.dot(e1);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = ray.origin - p0;
        let b1 = s.dot(s1) * inv_det;
        if !(0.0..=1.0).contains(&b1) {
            return None;
        }

        let s2 = s.cross(e1);
        let b2 = ray.direction.dot(s2) * inv_det;
        if b2 < 0.0 || b1 + b2 > 1.0 {
            return None;
        }

        let t = e2.dot(s2) * inv_det;
        ray.interval().contains(t).then_some((t, b1, b2))
    }

    /// Occlusion test; leaves the ray untouched.
    pub fn has_intersection(&self, ray: &Ray) -> bool {
        self.hit_params(ray).is_some()
    }

    /// On a hit, narrows `ray.max_t` and records the interpolated normal.
    pub fn intersect(&self, ray: &mut Ray, isect: &mut Intersection) -> bool {
        let Some((t, b1, b2)) = self.hit_params(ray) else {
            return false;
        };

        let [n0, n1, n2] = self.normals();
        ray.max_t = t;
        isect.t = t;
        isect.n = (n0 * (1.0 - b1 - b2) + n1 * b1 + n2 * b2).normalize();
        isect.bsdf = self.bsdf;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_triangle() -> Triangle {
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
        Triangle::new(Arc::new(mesh), [0, 1, 2], BsdfId(0))
    }

    #[test]
    fn test_triangle_hit() {
        let tri = xy_triangle();
        let mut ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let mut isect = Intersection::default();

        assert!(tri.intersect(&mut ray, &mut isect));
        assert!((isect.t - 5.0).abs() < 1e-12);
        assert!((isect.n - Vec3::Z).length() < 1e-12);
        assert_eq!(ray.max_t, isect.t);
    }

    #[test]
    fn test_triangle_miss_outside_edges() {
        let tri = xy_triangle();
        let ray = Ray::new(Vec3::new(2.0, 2.0, 5.0), -Vec3::Z);
        assert!(!tri.has_intersection(&ray));
    }

    #[test]
    fn test_triangle_parallel_ray() {
        let tri = xy_triangle();
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        assert!(!tri.has_intersection(&ray));
    }

    #[test]
    fn test_triangle_behind_origin() {
        let tri = xy_triangle();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(!tri.has_intersection(&ray));
    }

    #[test]
    fn test_triangle_interpolates_normals() {
        let mesh = Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2],
            Some(vec![Vec3::Z, Vec3::X, Vec3::Z]),
        )
        .unwrap();
        let tri = Triangle::new(Arc::new(mesh), [0, 1, 2], BsdfId(0));

        let mut ray = Ray::new(Vec3::new(0.5, 0.0, 1.0), -Vec3::Z);
        let mut isect = Intersection::default();
        assert!(tri.intersect(&mut ray, &mut isect));
        let expected = (Vec3::Z * 0.5 + Vec3::X * 0.5).normalize();
        assert!((isect.n - expected).length() < 1e-12);
    }
}
