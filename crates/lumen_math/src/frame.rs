//! Local shading frames and the specular direction helpers that live in them.
//!
//! BSDFs work in a frame where the surface normal is +Z, so `cos(theta)` of a
//! direction is simply its `z` component.

use crate::{Mat3, Vec3};

/// Orthonormal basis with the shading normal as the Z axis.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// Object-to-world rotation; columns are the local X, Y, Z axes.
    o2w: Mat3,
}

impl Frame {
    /// Build a frame around `n` (need not be normalized).
    ///
    /// The seed vector is `n` with its smallest-magnitude component replaced
    /// by 1, which keeps it well away from parallel to `n` for normals along
    /// any coordinate axis.
    pub fn from_normal(n: Vec3) -> Self {
        let z = n.normalize();
        let mut h = n;
        let a = n.abs();
        if a.x <= a.y && a.x <= a.z {
            h.x = 1.0;
        } else if a.y <= a.x && a.y <= a.z {
            h.y = 1.0;
        } else {
            h.z = 1.0;
        }

        let y = h.cross(z).normalize();
        let x = z.cross(y).normalize();
        Self {
            o2w: Mat3::from_cols(x, y, z),
        }
    }

    /// World-space direction to local shading coordinates.
    #[inline]
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        self.o2w.transpose() * v
    }

    /// Local shading coordinates back to world space.
    #[inline]
    pub fn to_world(&self, v: Vec3) -> Vec3 {
        self.o2w * v
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.o2w.z_axis
    }
}

/// Mirror `wo` about the local +Z axis.
#[inline]
pub fn reflect(wo: Vec3) -> Vec3 {
    Vec3::new(-wo.x, -wo.y, wo.z)
}

/// Refract `wo` through the local XY plane using Snell's law.
///
/// `wo.z >= 0` means the ray arrives from the outside (vacuum side) and is
/// entering a medium of index `ior`. Returns `None` on total internal
/// reflection.
pub fn refract(wo: Vec3, ior: f64) -> Option<Vec3> {
    let (z_mult, eta) = if wo.z < 0.0 { (1.0, ior) } else { (-1.0, 1.0 / ior) };

    let z_sq = 1.0 - eta * eta * (1.0 - wo.z * wo.z);
    if z_sq < 0.0 {
        return None;
    }
    Some(Vec3::new(-eta * wo.x, -eta * wo.y, z_mult * z_sq.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(frame: &Frame) {
        let x = frame.to_world(Vec3::X);
        let y = frame.to_world(Vec3::Y);
        let z = frame.to_world(Vec3::Z);
        for (a, b) in [(x, y), (y, z), (z, x)] {
            assert!(a.dot(b).abs() < 1e-12, "axes not orthogonal: {a:?} {b:?}");
        }
        for v in [x, y, z] {
            assert!((v.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_frame_axis_aligned_normals() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::X, -Vec3::Y, -Vec3::Z] {
            let frame = Frame::from_normal(n);
            assert_orthonormal(&frame);
            assert!((frame.normal() - n).length() < 1e-12);
            assert!((frame.to_local(n) - Vec3::Z).length() < 1e-12);
        }
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = Frame::from_normal(Vec3::new(0.3, -0.8, 0.52));
        assert_orthonormal(&frame);
        let v = Vec3::new(0.2, 0.4, -0.9);
        assert!((frame.to_world(frame.to_local(v)) - v).length() < 1e-12);
    }

    #[test]
    fn test_reflect_is_involution() {
        let wo = Vec3::new(0.3, -0.5, 0.81).normalize();
        assert_eq!(reflect(reflect(wo)), wo);
        assert_eq!(reflect(wo).z, wo.z);
    }

    #[test]
    fn test_refract_unit_ior_does_not_bend() {
        for wo in [
            Vec3::new(0.6, 0.0, 0.8),
            Vec3::new(-0.2, 0.7, -0.684_105_255_059_97),
            Vec3::new(0.99, 0.0, 0.141_067_359_796_659),
        ] {
            let wi = refract(wo, 1.0).expect("ior 1 never reflects totally");
            assert!((wi.x + wo.x).abs() < 1e-12);
            assert!((wi.y + wo.y).abs() < 1e-12);
            assert!((wi.z + wo.z).abs() < 1e-9);
        }
    }

    #[test]
    fn test_refract_total_internal_reflection() {
        // Leaving glass at a grazing angle.
        let wo = Vec3::new(0.9, 0.0, -(1.0f64 - 0.81).sqrt());
        assert!(refract(wo, 1.5).is_none());
        // Straight through never reflects.
        assert!(refract(-Vec3::Z, 1.5).is_some());
    }
}
