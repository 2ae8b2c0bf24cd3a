//! Sphere primitive for ray tracing.

use lumen_math::{BBox, Ray, Vec3};

use crate::bsdf::BsdfId;
use crate::primitive::Intersection;

/// An analytic sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    center: Vec3,
    radius: f64,
    bsdf: BsdfId,
}

impl Sphere {
    /// Create a new sphere.
    pub fn new(center: Vec3, radius: f64, bsdf: BsdfId) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
            bsdf,
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn bsdf(&self) -> BsdfId {
        self.bsdf
    }

    pub fn bbox(&self) -> BBox {
        let r = Vec3::splat(self.radius);
        BBox::from_points(self.center - r, self.center + r)
    }

    /// Both roots of the ray/sphere quadratic, smaller first.
    fn roots(&self, ray: &Ray) -> Option<(f64, f64)> {
        let oc = ray.origin - self.center;
        let a = ray.direction.length_squared();
        let b = 2.0 * oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 || a == 0.0 {
            return None;
        }

        let sqrtd = discriminant.sqrt();
        Some(((-b - sqrtd) / (2.0 * a), (-b + sqrtd) / (2.0 * a)))
    }

    /// Nearest root inside the ray's valid range.
    ///
    /// The near root is preferred; when it falls before `min_t` (the origin is
    /// inside the sphere, or sitting on its surface) the far root is tried.
    fn hit_time(&self, ray: &Ray) -> Option<f64> {
        let (t1, t2) = self.roots(ray)?;
        let range = ray.interval();
        if range.contains(t1) {
            Some(t1)
        } else if range.contains(t2) {
            Some(t2)
        } else {
            None
        }
    }

    /// Occlusion test; leaves the ray untouched.
    pub fn has_intersection(&self, ray: &Ray) -> bool {
        self.hit_time(ray).is_some()
    }

    /// On a hit, narrows `ray.max_t` and fills `isect` with the outward normal.
    pub fn intersect(&self, ray: &mut Ray, isect: &mut Intersection) -> bool {
        let Some(t) = self.hit_time(ray) else {
            return false;
        };

        ray.max_t = t;
        isect.t = t;
        isect.n = (ray.at(t) - self.center).normalize();
        isect.bsdf = self.bsdf;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sphere() -> Sphere {
        Sphere::new(Vec3::new(0.0, 0.0, -1.0), 0.5, BsdfId(0))
    }

    #[test]
    fn test_sphere_hit() {
        let sphere = unit_sphere();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let mut isect = Intersection::default();

        assert!(sphere.intersect(&mut ray, &mut isect));
        assert!((isect.t - 0.5).abs() < 1e-12);
        assert_eq!(ray.max_t, isect.t);
        assert!((isect.n - Vec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_sphere_miss() {
        let sphere = unit_sphere();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::Y);
        let mut isect = Intersection::default();

        assert!(!sphere.intersect(&mut ray, &mut isect));
        assert!(!sphere.has_intersection(&ray));
        assert_eq!(ray.max_t, f64::INFINITY);
    }

    #[test]
    fn test_sphere_hit_from_inside_uses_far_root() {
        let sphere = unit_sphere();
        let mut ray = Ray::new(Vec3::new(0.0, 0.0, -1.0), Vec3::X);
        let mut isect = Intersection::default();

        assert!(sphere.intersect(&mut ray, &mut isect));
        assert!((isect.t - 0.5).abs() < 1e-12);
        assert!((isect.n - Vec3::X).length() < 1e-12);
    }

    #[test]
    fn test_sphere_respects_max_t() {
        let sphere = unit_sphere();
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z).with_range(0.0, 0.25);
        assert!(!sphere.has_intersection(&ray));
    }

    #[test]
    fn test_sphere_bbox() {
        let b = unit_sphere().bbox();
        assert_eq!(b.min, Vec3::new(-0.5, -0.5, -1.5));
        assert_eq!(b.max, Vec3::new(0.5, 0.5, -0.5));
    }
}
