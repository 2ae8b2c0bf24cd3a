use crate::{Interval, Vec3};

/// A ray with origin, direction, a valid parametric range and a bounce budget.
///
/// `min_t`/`max_t` bound the accepted hit distances. Closest-hit queries
/// narrow `max_t` to each accepted hit so that later box tests prune against
/// it; a `Ray` is therefore per-worker state and is never shared between
/// threads while a query runs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f64,
    pub max_t: f64,
    /// Remaining recursion depth, decremented on each bounce.
    pub depth: u32,
}

impl Ray {
    /// Create a ray over `[0, inf)` with no bounce budget.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            min_t: 0.0,
            max_t: f64::INFINITY,
            depth: 0,
        }
    }

    /// Secondary ray leaving a surface: starts at `eps` to avoid self-hits.
    pub fn spawn(origin: Vec3, direction: Vec3, eps: f64, depth: u32) -> Self {
        Self {
            origin,
            direction,
            min_t: eps,
            max_t: f64::INFINITY,
            depth,
        }
    }

    pub fn with_range(mut self, min_t: f64, max_t: f64) -> Self {
        self.min_t = min_t;
        self.max_t = max_t;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// The currently valid parametric range.
    #[inline]
    pub fn interval(&self) -> Interval {
        Interval::new(self.min_t, self.max_t)
    }

    /// Get the point along the ray at parameter t.
    #[inline]
    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.direction * t
    }
}
