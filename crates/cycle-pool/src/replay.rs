//! Randomness consumed by [`crate::ImagePool`] once it is full.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decision source for a full pool.
///
/// Implementations must return `pick_slot(len) < len`.
pub trait ReplaySource {
    /// `true` to swap the incoming sample with a stored one, `false` to
    /// pass the incoming sample through untouched.
    fn should_replay(&mut self) -> bool;

    /// Index of the stored sample to hand back, in `0..len`.
    fn pick_slot(&mut self, len: usize) -> usize;
}

/// Seeded random source: replays with probability `probability` (0.5 by
/// default) and picks slots uniformly.
///
/// # Example
///
/// ```
/// use cycle_pool::{RandomReplay, ReplaySource};
///
/// let mut a = RandomReplay::seeded(7);
/// let mut b = RandomReplay::seeded(7);
/// for _ in 0..20 {
///     assert_eq!(a.should_replay(), b.should_replay());
///     assert_eq!(a.pick_slot(50), b.pick_slot(50));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RandomReplay<R = StdRng> {
    rng: R,
    probability: f64,
}

impl RandomReplay<StdRng> {
    /// Creates a source backed by `StdRng::seed_from_u64(seed)`.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomReplay<R> {
    /// Wraps an existing RNG with the reference replay probability of 0.5.
    pub fn from_rng(rng: R) -> Self {
        Self {
            rng,
            probability: 0.5,
        }
    }

    /// Overrides the replay probability (clamped to `[0, 1]`).
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Current replay probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl<R: Rng> ReplaySource for RandomReplay<R> {
    fn should_replay(&mut self) -> bool {
        self.rng.gen_bool(self.probability)
    }

    fn pick_slot(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Deterministic source that always makes the same decision.
///
/// `FixedReplay::always(slot)` forces the evict branch on `slot` (modulo the
/// pool length); `FixedReplay::never()` forces pass-through.
///
/// # Example
///
/// ```
/// use cycle_pool::{FixedReplay, ReplaySource};
///
/// let mut src = FixedReplay::always(3);
/// assert!(src.should_replay());
/// assert_eq!(src.pick_slot(2), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedReplay {
    replay: bool,
    slot: usize,
}

impl FixedReplay {
    /// Always replays slot `slot % len`.
    pub fn always(slot: usize) -> Self {
        Self { replay: true, slot }
    }

    /// Never replays.
    pub fn never() -> Self {
        Self {
            replay: false,
            slot: 0,
        }
    }
}

impl ReplaySource for FixedReplay {
    fn should_replay(&mut self) -> bool {
        self.replay
    }

    fn pick_slot(&mut self, len: usize) -> usize {
        self.slot % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_replay_is_roughly_fair() {
        let mut src = RandomReplay::seeded(42);
        let hits = (0..10_000).filter(|_| src.should_replay()).count();
        assert!((4_500..5_500).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn random_slots_in_range() {
        let mut src = RandomReplay::seeded(1);
        for len in 1..20 {
            for _ in 0..50 {
                assert!(src.pick_slot(len) < len);
            }
        }
    }

    #[test]
    fn probability_extremes() {
        let mut always = RandomReplay::seeded(3).with_probability(1.0);
        let mut never = RandomReplay::seeded(3).with_probability(-2.0);
        assert_eq!(never.probability(), 0.0);
        for _ in 0..100 {
            assert!(always.should_replay());
            assert!(!never.should_replay());
        }
    }

    #[test]
    fn fixed_never_passes_through() {
        let mut src = FixedReplay::never();
        assert!(!src.should_replay());
    }
}
