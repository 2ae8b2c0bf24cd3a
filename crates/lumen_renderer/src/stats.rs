use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Intersection test counters for one worker.
///
/// Passed by `&mut` through every traversal call and merged after a parallel
/// batch. Counting never changes a query's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub box_tests: u64,
    pub primitive_tests: u64,
}

impl TraversalStats {
    pub fn total(&self) -> u64 {
        self.box_tests + self.primitive_tests
    }
}

impl AddAssign for TraversalStats {
    fn add_assign(&mut self, rhs: Self) {
        self.box_tests += rhs.box_tests;
        self.primitive_tests += rhs.primitive_tests;
    }
}

impl Add for TraversalStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for TraversalStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
