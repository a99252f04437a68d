//! Property tests for the history buffer invariants.

use cycle_pool::{FixedReplay, ImagePool, RandomReplay};
use proptest::prelude::*;

proptest! {
    /// The pool never holds more than `capacity` samples.
    #[test]
    fn never_exceeds_capacity(capacity in 1usize..16, inserts in 0usize..200, seed in any::<u64>()) {
        let mut pool = ImagePool::new(capacity, seed).unwrap();
        for i in 0..inserts {
            pool.insert(i);
            prop_assert!(pool.len() <= capacity);
        }
        prop_assert_eq!(pool.len(), inserts.min(capacity));
    }

    /// Starting empty, the first `capacity` insertions return their input
    /// and grow the pool by exactly one.
    #[test]
    fn prefill_identity(capacity in 1usize..32, seed in any::<u64>()) {
        let mut pool = ImagePool::new(capacity, seed).unwrap();
        for i in 0..capacity {
            let before = pool.len();
            prop_assert_eq!(pool.insert(i * 7), i * 7);
            prop_assert_eq!(pool.len(), before + 1);
        }
    }

    /// Once full, every output is either the input or something inserted
    /// earlier. Values are unique so "never inserted" is detectable.
    #[test]
    fn returns_only_inserted_values(capacity in 1usize..8, inserts in 1usize..100, seed in any::<u64>()) {
        let mut pool = ImagePool::new(capacity, seed).unwrap();
        for i in 0..inserts {
            let out = pool.insert(i);
            prop_assert!(out <= i, "returned {} which was never inserted before step {}", out, i);
        }
    }

    /// Every sample is accounted for: stored, or returned exactly once.
    #[test]
    fn samples_are_conserved(capacity in 1usize..8, inserts in 0usize..64, seed in any::<u64>()) {
        let mut pool = ImagePool::with_source(capacity, RandomReplay::seeded(seed)).unwrap();
        let mut returned = Vec::new();
        for i in 0..inserts {
            returned.push(pool.insert(i));
        }
        let mut seen: Vec<usize> = returned
            .iter()
            .copied()
            .chain(pool.iter().copied().filter(|v| !returned.contains(v)))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        prop_assert_eq!(seen, (0..inserts).collect::<Vec<_>>());
    }
}

#[test]
fn forced_evict_cycles_through_slots() {
    let mut pool = ImagePool::with_source(3, FixedReplay::always(2)).unwrap();
    for i in 0..3 {
        pool.insert(i);
    }
    assert_eq!(pool.insert(10), 2);
    assert_eq!(pool.insert(11), 10);
    assert_eq!(pool.iter().copied().collect::<Vec<_>>(), vec![0, 1, 11]);
}
