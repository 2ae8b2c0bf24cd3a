//! Single-precision ray queries against packed records.
//!
//! Traversal walks the entry/exit links of the flattened BVH with a single
//! cursor, so it needs neither recursion nor a stack. Primitive tests use
//! the same root and barycentric rules as the host.

use glam::Vec3;
use lumen_renderer::TraversalStats;

use crate::pack::SceneView;
use crate::records::{KernelPrimitive, KernelShape};

/// Self-intersection offset for rays leaving a surface.
pub const EPS_F: f32 = 1e-4;

/// Triangles whose determinant falls below this are treated as edge-on.
const PARALLEL_EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
    /// Remaining bounces.
    pub depth: u32,
}

impl KernelRay {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            min_t: 0.0,
            max_t: f32::INFINITY,
            depth: 0,
        }
    }

    /// Ray leaving a surface point, starting `EPS_F` along `direction`.
    pub fn spawn(origin: Vec3, direction: Vec3, depth: u32) -> Self {
        Self {
            min_t: EPS_F,
            depth,
            ..Self::new(origin, direction)
        }
    }

    pub fn with_range(mut self, min_t: f32, max_t: f32) -> Self {
        self.min_t = min_t;
        self.max_t = max_t;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Narrow a host ray to kernel precision.
    pub fn from_host(ray: &lumen_math::Ray) -> Self {
        Self {
            origin: ray.origin.as_vec3(),
            direction: ray.direction.as_vec3(),
            min_t: ray.min_t as f32,
            max_t: ray.max_t as f32,
            depth: ray.depth,
        }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    #[inline]
    fn in_range(&self, t: f32) -> bool {
        self.min_t <= t && t <= self.max_t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelHit {
    pub t: f32,
    /// Index into the packed (leaf-ordered) primitive table.
    pub primitive: u32,
    pub n: Vec3,
    pub bsdf: u32,
}

#[inline]
fn visit(bounds: &[[f32; 3]; 2], ray: &KernelRay, stats: &mut TraversalStats) -> bool {
    stats.box_tests += 1;
    let (mut t_min, mut t_max) = (f32::NEG_INFINITY, f32::INFINITY);
    for axis in 0..3 {
        let inv_d = 1.0 / ray.direction[axis];
        let mut t0 = (bounds[0][axis] - ray.origin[axis]) * inv_d;
        let mut t1 = (bounds[1][axis] - ray.origin[axis]) * inv_d;
        if inv_d < 0.0 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return false;
        }
    }
    !(t_min > ray.max_t || t_max < ray.min_t)
}

fn sphere_time(center: Vec3, radius: f32, ray: &KernelRay) -> Option<f32> {
    let oc = ray.origin - center;
    let a = ray.direction.length_squared();
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 || a == 0.0 {
        return None;
    }
    let sqrtd = discriminant.sqrt();
    let t1 = (-b - sqrtd) / (2.0 * a);
    let t2 = (-b + sqrtd) / (2.0 * a);
    if ray.in_range(t1) {
        Some(t1)
    } else if ray.in_range(t2) {
        Some(t2)
    } else {
        None
    }
}

fn triangle_params(p: &[Vec3; 3], ray: &KernelRay) -> Option<(f32, f32, f32)> {
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let s1 = ray.direction.cross(e2);
    let det = s1.dot(e1);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - p[0];
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
    ray.in_range(t).then_some((t, b1, b2))
}

fn primitive_occludes(prim: &KernelPrimitive, ray: &KernelRay) -> bool {
    match prim.decode() {
        KernelShape::Sphere { center, radius } => sphere_time(center, radius, ray).is_some(),
        KernelShape::Triangle { p, .. } => triangle_params(&p, ray).is_some(),
    }
}

fn primitive_intersect(prim: &KernelPrimitive, ray: &mut KernelRay) -> Option<(f32, Vec3)> {
    let (t, n) = match prim.decode() {
        KernelShape::Sphere { center, radius } => {
            let t = sphere_time(center, radius, ray)?;
            (t, (ray.at(t) - center).normalize())
        }
        KernelShape::Triangle { p, n } => {
            let (t, b1, b2) = triangle_params(&p, ray)?;
            (t, (n[0] * (1.0 - b1 - b2) + n[1] * b1 + n[2] * b2).normalize())
        }
    };
    ray.max_t = t;
    Some((t, n))
}

/// Leaf range of a node; empty for interior nodes.
#[inline]
fn leaf_range(view: &SceneView<'_>, index: usize) -> std::ops::Range<usize> {
    let node = &view.nodes[index];
    let start = node.prim_index as usize;
    start..start + node.prim_count as usize
}

/// Closest hit along `ray`, narrowing `ray.max_t`.
pub fn intersect(view: &SceneView<'_>, ray: &mut KernelRay, stats: &mut TraversalStats) -> Option<KernelHit> {
    if view.nodes.is_empty() {
        return None;
    }

    let mut hit = None;
    let mut index = 0;
    loop {
        let node = &view.nodes[index];
        if visit(&node.bounds, ray, stats) {
            for i in leaf_range(view, index) {
                stats.primitive_tests += 1;
                let prim = &view.primitives[i];
                if let Some((t, n)) = primitive_intersect(prim, ray) {
                    hit = Some(KernelHit {
                        t,
                        primitive: i as u32,
                        n,
                        bsdf: prim.bsdf_index,
                    });
                }
            }
            index = node.entry_index as usize;
        } else {
            index = node.exit_index as usize;
        }
        if index == 0 {
            return hit;
        }
    }
}

/// Whether anything blocks `ray` within its range.
pub fn occluded(view: &SceneView<'_>, ray: &KernelRay, stats: &mut TraversalStats) -> bool {
    if view.nodes.is_empty() {
        return false;
    }

    let mut index = 0;
    loop {
        let node = &view.nodes[index];
        if visit(&node.bounds, ray, stats) {
            for i in leaf_range(view, index) {
                stats.primitive_tests += 1;
                if primitive_occludes(&view.primitives[i], ray) {
                    return true;
                }
            }
            index = node.entry_index as usize;
        } else {
            index = node.exit_index as usize;
        }
        if index == 0 {
            return false;
        }
    }
}
