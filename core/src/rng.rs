//! Seeded random number generation for the generation lanes.
//!
//! RULE: Record generation never calls the platform RNG directly.
//! Randomness flows through LaneRng instances derived from a single
//! master seed held in the configuration (or drawn once per process).
//!
//! Each lane gets its own stream, seeded from
//! (master_seed XOR slot/generation mix). This means:
//!   - Restarting the producer yields a fresh, reproducible stream.
//!   - The bulk loader and the poller never share a stream.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, seeded RNG owned by a single lane.
pub struct LaneRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl LaneRng {
    pub fn new(seed: u64) -> Self {
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + self.next_f64() * (high - low)
    }

    /// Uniform pick from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        let index = self.next_u64_below(items.len() as u64) as usize;
        &items[index]
    }
}

/// Derives lane streams from one master seed.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Use the configured seed, or draw one from the platform once.
    pub fn from_config(seed: Option<u64>) -> Self {
        Self::new(seed.unwrap_or_else(rand::random))
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Stream for `slot`, distinct per `generation` (e.g. producer restarts).
    pub fn for_lane(&self, slot: LaneSlot, generation: u64) -> LaneRng {
        let mix = (slot as u64)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            .wrapping_add(generation.wrapping_mul(0xbf58_476d_1ce4_e5b9));
        LaneRng::new(self.master_seed ^ mix).with_name(slot.name())
    }
}

/// Stable lane slot assignments.
/// NEVER reorder: reordering changes every lane's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum LaneSlot {
    Bulk = 0,
    Producer = 1,
    OneShot = 2,
}

impl LaneSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Producer => "producer",
            Self::OneShot => "one_shot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RngBank::new(12345).for_lane(LaneSlot::Producer, 0);
        let mut b = RngBank::new(12345).for_lane(LaneSlot::Producer, 0);
        for _ in 0..32 {
            assert_eq!(a.next_u64_below(1_000_000), b.next_u64_below(1_000_000));
        }
    }

    #[test]
    fn generations_diverge() {
        let bank = RngBank::new(7);
        let mut a = bank.for_lane(LaneSlot::Producer, 0);
        let mut b = bank.for_lane(LaneSlot::Producer, 1);
        let xs: Vec<u64> = (0..8).map(|_| a.next_u64_below(u64::MAX)).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64_below(u64::MAX)).collect();
        assert_ne!(xs, ys, "Restarted producer should not replay the old stream");
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = RngBank::new(99).for_lane(LaneSlot::Bulk, 0);
        for _ in 0..1000 {
            let x = rng.uniform(1.0, 5001.0);
            assert!((1.0..5001.0).contains(&x), "out of range: {x}");
        }
    }
}
