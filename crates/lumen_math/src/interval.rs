/// Closed parametric range `[min, max]` along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    /// Unbounded range, the starting point of a slab test.
    pub const UNIVERSE: Interval = Interval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive at both ends, so hits exactly at `min_t` or `max_t` count.
    pub fn contains(&self, t: f64) -> bool {
        self.min <= t && t <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let range = Interval::new(0.5, 2.0);
        assert!(range.contains(0.5));
        assert!(range.contains(2.0));
        assert!(range.contains(1.0));
        assert!(!range.contains(0.499));
        assert!(!range.contains(f64::INFINITY));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn test_universe_accepts_infinite_hits() {
        assert!(Interval::UNIVERSE.contains(f64::INFINITY));
        assert!(Interval::UNIVERSE.contains(-1e300));
    }
}
