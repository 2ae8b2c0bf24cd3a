//! The closed set of intersectable shapes.

use lumen_math::{BBox, Ray, Vec3};

use crate::bsdf::BsdfId;
use crate::sphere::Sphere;
use crate::triangle::Triangle;

/// Record of the closest accepted hit along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Ray parameter of the hit.
    pub t: f64,
    /// Index into the accelerator's primitive list.
    pub primitive: usize,
    /// Unit shading normal at the hit.
    pub n: Vec3,
    pub bsdf: BsdfId,
}

impl Default for Intersection {
    fn default() -> Self {
        Self {
            t: f64::INFINITY,
            primitive: 0,
            n: Vec3::ZERO,
            bsdf: BsdfId(0),
        }
    }
}

/// A sphere or a mesh triangle.
#[derive(Debug, Clone)]
pub enum Primitive {
    Sphere(Sphere),
    Triangle(Triangle),
}

impl Primitive {
    pub fn bbox(&self) -> BBox {
        match self {
            Primitive::Sphere(s) => s.bbox(),
            Primitive::Triangle(t) => t.bbox(),
        }
    }

    pub fn bsdf(&self) -> BsdfId {
        match self {
            Primitive::Sphere(s) => s.bsdf(),
            Primitive::Triangle(t) => t.bsdf(),
        }
    }

    #[inline]
    pub fn has_intersection(&self, ray: &Ray) -> bool {
        match self {
            Primitive::Sphere(s) => s.has_intersection(ray),
            Primitive::Triangle(t) => t.has_intersection(ray),
        }
    }

    /// Closest-hit test. Callers set `isect.primitive` themselves since only
    /// the accelerator knows the primitive's index.
    #[inline]
    pub fn intersect(&self, ray: &mut Ray, isect: &mut Intersection) -> bool {
        match self {
            Primitive::Sphere(s) => s.intersect(ray, isect),
            Primitive::Triangle(t) => t.intersect(ray, isect),
        }
    }
}

impl From<Sphere> for Primitive {
    fn from(sphere: Sphere) -> Self {
        Primitive::Sphere(sphere)
    }
}

impl From<Triangle> for Primitive {
    fn from(triangle: Triangle) -> Self {
        Primitive::Triangle(triangle)
    }
}
