//! Park-Miller "minimal standard" generator used by kernel workers.

/// Multiplicative LCG with a = 16807, m = 2^31 - 1. The state never leaves
/// `[1, m - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    const A: u64 = 16_807;
    const M: u64 = 2_147_483_647;

    pub fn new(seed: u32) -> Self {
        let state = (u64::from(seed) % Self::M) as u32;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    /// Independent stream for pixel (x, y).
    pub fn for_pixel(seed: u32, x: u32, y: u32) -> Self {
        let mut h = seed ^ x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
        h ^= h >> 16;
        h = h.wrapping_mul(0x7FEB_352D);
        h ^= h >> 15;
        h = h.wrapping_mul(0x846C_A68B);
        h ^= h >> 16;
        let mut rng = Self::new(h);
        // The first output is strongly correlated with small seeds.
        rng.next_u32();
        rng
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = ((u64::from(self.state) * Self::A) % Self::M) as u32;
        self.state
    }

    /// Uniform in `[0, 1)`, from the top 24 bits of the state.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 7) as f32 * (1.0 / (1u32 << 24) as f32)
    }

    #[inline]
    pub fn coin_flip(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }
}
