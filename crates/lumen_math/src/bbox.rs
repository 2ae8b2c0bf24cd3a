use crate::{Interval, Ray, Vec3};

/// Axis-aligned bounding box stored as min/max corners.
///
/// `BBox::EMPTY` has inverted corners so that expanding it by any point or box
/// yields exactly that point or box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox {
    /// A box containing nothing; identity for `expand` and `union`.
    pub const EMPTY: BBox = BBox {
        min: Vec3::splat(f64::INFINITY),
        max: Vec3::splat(f64::NEG_INFINITY),
    };

    /// Create a box from two corner points (in any order).
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Grow to include a point.
    #[inline]
    pub fn expand_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    #[inline]
    pub fn expand(&mut self, other: &BBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Create a box that surrounds two other boxes.
    pub fn union(a: &BBox, b: &BBox) -> BBox {
        BBox {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// True until a point has been merged in.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Size along each axis (zero for an empty box).
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// Surface area, used as the SAH cost weight.
    pub fn surface_area(&self) -> f64 {
        let e = self.extent();
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Slab test returning the raw entry/exit parameters of the ray.
    ///
    /// The interval is NOT clipped against `ray.min_t`/`ray.max_t`; callers
    /// decide how to prune with it. Axis-parallel rays whose origin lies
    /// exactly on a slab plane produce NaN for that axis, which `f64::max`/
    /// `f64::min` discard.
    pub fn intersect(&self, ray: &Ray) -> Option<Interval> {
        let mut t = Interval::UNIVERSE;
        for axis in 0..3 {
            let inv_d = 1.0 / ray.direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t.min = t.min.max(t0);
            t.max = t.max.min(t1);
            if t.min > t.max {
                return None;
            }
        }
        Some(t)
    }
}

impl Default for BBox {
    fn default() -> Self {
        BBox::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_points() {
        let b = BBox::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_empty_is_merge_identity() {
        let b = BBox::from_points(Vec3::new(-1.0, 2.0, 0.5), Vec3::new(3.0, 4.0, 1.5));
        assert_eq!(BBox::union(&BBox::EMPTY, &b), b);

        let mut grown = BBox::EMPTY;
        assert!(grown.is_empty());
        grown.expand_point(Vec3::new(1.0, 2.0, 3.0));
        assert!(!grown.is_empty());
        assert_eq!(grown.min, grown.max);
    }

    #[test]
    fn test_bbox_measures() {
        let b = BBox::from_points(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.volume(), 6.0);
        assert_eq!(b.surface_area(), 2.0 * (2.0 + 6.0 + 3.0));
        assert_eq!(b.centroid(), Vec3::new(0.5, 1.0, 1.5));
        assert_eq!(BBox::EMPTY.surface_area(), 0.0);
        assert_eq!(BBox::EMPTY.volume(), 0.0);
    }

    #[test]
    fn test_bbox_intersect() {
        let b = BBox::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let t = b.intersect(&ray).expect("ray through the center must hit");
        assert!((t.min - 4.0).abs() < 1e-12);
        assert!((t.max - 6.0).abs() < 1e-12);

        // Pointing away still produces the (negative) slab interval.
        let away = Ray::new(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        let t = b.intersect(&away).expect("line intersects the box");
        assert!(t.max < 0.0);

        let miss = Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Z);
        assert!(b.intersect(&miss).is_none());
    }

    #[test]
    fn test_flat_box_intersect() {
        // Zero-thickness box, as produced by an axis-aligned triangle.
        let b = BBox::from_points(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let t = b.intersect(&ray).expect("flat box must still be hit");
        assert!((t.min - 5.0).abs() < 1e-12);
        assert!((t.max - 5.0).abs() < 1e-12);
    }
}
