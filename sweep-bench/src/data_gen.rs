//! Seeded host-side input generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sweep_sort::EntropyPreset;

/// Deterministic generator of host inputs for the scan and host-path sort
/// checks.
pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Values in `0..bound`; scan inputs stay small so sums are readable.
    pub fn bounded_u32(&mut self, count: usize, bound: u32) -> Vec<u32> {
        let bound = bound.max(1);
        (0..count).map(|_| self.rng.gen_range(0..bound)).collect()
    }

    /// Keys with each bit set with probability `2^-k`, `k` being the
    /// preset's AND count.
    pub fn entropy_u32(&mut self, count: usize, entropy: EntropyPreset) -> Vec<u32> {
        (0..count)
            .map(|_| (0..entropy.and_count()).fold(u32::MAX, |acc, _| acc & self.rng.gen::<u32>()))
            .collect()
    }

    pub fn i32_keys(&mut self, count: usize) -> Vec<i32> {
        (0..count).map(|_| self.rng.gen()).collect()
    }

    pub fn u64_keys(&mut self, count: usize) -> Vec<u64> {
        (0..count).map(|_| self.rng.gen()).collect()
    }

    pub fn i64_keys(&mut self, count: usize) -> Vec<i64> {
        (0..count).map(|_| self.rng.gen()).collect()
    }

    /// Finite floats of both signs across many magnitudes.
    pub fn f32_keys(&mut self, count: usize) -> Vec<f32> {
        (0..count)
            .map(|_| {
                let mantissa: f32 = self.rng.gen_range(-1.0..1.0);
                let exponent: i32 = self.rng.gen_range(-20..20);
                mantissa * 2f32.powi(exponent)
            })
            .collect()
    }

    /// Like [`f32_keys`](Self::f32_keys) with a wider exponent range.
    pub fn f64_keys(&mut self, count: usize) -> Vec<f64> {
        (0..count)
            .map(|_| {
                let mantissa: f64 = self.rng.gen_range(-1.0..1.0);
                let exponent: i32 = self.rng.gen_range(-200..200);
                mantissa * 2f64.powi(exponent)
            })
            .collect()
    }
}
