//! Bounded replay store of generated samples.

use candle_core::Tensor;
use cycle_core::CycleError;
use rand::rngs::StdRng;

use crate::replay::{RandomReplay, ReplaySource};

/// Fixed-capacity history of generated samples for one domain.
///
/// # Insertion Policy
///
/// 1. While fewer than `capacity` samples are stored, the input is stored
///    and returned unchanged.
/// 2. Once full, the [`ReplaySource`] decides:
///    - replay: a stored slot is picked, its sample is returned and the
///      input takes its place;
///    - pass-through: the input is returned and nothing changes.
///
/// # Example
///
/// ```
/// use cycle_pool::{FixedReplay, ImagePool};
///
/// let mut pool = ImagePool::with_source(2, FixedReplay::always(0)).unwrap();
/// assert_eq!(pool.insert('a'), 'a');
/// assert_eq!(pool.insert('b'), 'b');
/// assert!(pool.is_full());
///
/// // Full: slot 0 ('a') is handed back and replaced by 'c'.
/// assert_eq!(pool.insert('c'), 'a');
/// assert_eq!(pool.iter().copied().collect::<Vec<_>>(), vec!['c', 'b']);
/// ```
#[derive(Debug, Clone)]
pub struct ImagePool<T, S = RandomReplay<StdRng>> {
    capacity: usize,
    items: Vec<T>,
    source: S,
}

impl<T: Clone> ImagePool<T> {
    /// Creates an empty pool with a seeded [`RandomReplay`] source.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize, seed: u64) -> Result<Self, CycleError> {
        Self::with_source(capacity, RandomReplay::seeded(seed))
    }
}

impl<T: Clone, S: ReplaySource> ImagePool<T, S> {
    /// Creates an empty pool driven by an explicit replay source.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if `capacity` is zero.
    pub fn with_source(capacity: usize, source: S) -> Result<Self, CycleError> {
        if capacity == 0 {
            return Err(CycleError::InvalidConfig {
                field: "pool_capacity",
                message: "history buffer capacity must be at least 1".to_string(),
            });
        }
        Ok(Self {
            capacity,
            items: Vec::with_capacity(capacity),
            source,
        })
    }

    /// Offers one sample to the pool and returns the sample the
    /// discriminator should see.
    pub fn insert(&mut self, sample: T) -> T {
        if self.items.len() < self.capacity {
            self.items.push(sample.clone());
            return sample;
        }

        if self.source.should_replay() {
            let slot = self.source.pick_slot(self.items.len()) % self.items.len();
            std::mem::replace(&mut self.items[slot], sample)
        } else {
            sample
        }
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of stored samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once `len() == capacity()`.
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Iterates the stored samples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<S: ReplaySource> ImagePool<Tensor, S> {
    /// Applies [`ImagePool::insert`] to every item along dimension 0 of a
    /// `(batch, C, H, W)` tensor and re-stacks the results.
    ///
    /// Items are stored as `(1, C, H, W)` slices.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Tensor`] if slicing fails or a replayed item
    /// has a different image shape than the current batch.
    pub fn insert_batch(&mut self, batch: &Tensor) -> Result<Tensor, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("ImagePool insert_batch: {e}"),
        };

        let n = batch.dim(0).map_err(map_err)?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let item = batch.narrow(0, i, 1).map_err(map_err)?;
            out.push(self.insert(item));
        }
        Tensor::cat(&out, 0).map_err(map_err)
    }
}
