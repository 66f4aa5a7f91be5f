// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Every random decision made while composing a score (Markov pitch draws,
// Euclidean pulse counts, chord progressions) comes from one `ScoreRng`
// owned by that composition pass. Two passes with the same seed and the same
// settings produce byte-identical scores.
//
// The generator core is integer-only. Floating point appears only when
// converting the raw output into a unit interval for cumulative sampling.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreRng {
    s: [u64; 4],
}

impl ScoreRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `u32` in `[low, high]` (inclusive on both ends).
    ///
    /// Panics if `low > high`.
    pub fn range_u32_inclusive(&mut self, low: u32, high: u32) -> u32 {
        assert!(low <= high, "range_u32_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as u32
    }

    /// Pick an index from a list of non-negative weights by walking the
    /// cumulative boundaries with one uniform draw.
    ///
    /// Returns `None` when the weights sum to zero (or the list is empty),
    /// which callers treat as "no preference". Weights need not be
    /// normalised.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (i, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            cumulative += w;
            last_positive = Some(i);
            if cumulative > target {
                return Some(i);
            }
        }
        // Rounding can leave `target` a hair above the final boundary.
        last_positive
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
