//! Batch sources: one domain's images, delivered an epoch at a time.

use candle_core::Tensor;
use cycle_core::{CycleError, Domain};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::augment::Augmenter;

/// A finite, restartable sequence of image batches for one domain.
///
/// A pass starts with [`BatchSource::rewind`] and is consumed with
/// [`BatchSource::next_batch`]; each batch is built when it is asked for.
/// [`Batches`] wraps both into an iterator.
pub trait BatchSource {
    /// Domain the images belong to.
    fn domain(&self) -> Domain;

    /// Number of batches one pass yields.
    fn num_batches(&self) -> usize;

    /// Starts a fresh pass, reshuffling if the source is shuffled.
    fn rewind(&mut self);

    /// Next `(batch, C, H, W)` tensor of the current pass, `None` once the
    /// pass is exhausted.
    fn next_batch(&mut self) -> Option<Result<Tensor, CycleError>>;
}

/// One lazily produced pass over a [`BatchSource`].
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_core::Domain;
/// use cycle_data::{Batches, InMemorySource, Order};
///
/// let images: Vec<Tensor> = (0..3)
///     .map(|_| Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu).unwrap())
///     .collect();
/// let mut source = InMemorySource::new(Domain::B, images, 1, Order::Stable).unwrap();
/// let first = Batches::new(&mut source).next().unwrap().unwrap();
/// assert_eq!(first.dims(), &[1, 3, 4, 4]);
/// assert_eq!(Batches::new(&mut source).count(), 3);
/// ```
pub struct Batches<'a, S: BatchSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: BatchSource + ?Sized> Batches<'a, S> {
    /// Rewinds `source` and iterates its new pass.
    pub fn new(source: &'a mut S) -> Self {
        source.rewind();
        Self { source }
    }
}

impl<S: BatchSource + ?Sized> Iterator for Batches<'_, S> {
    type Item = Result<Tensor, CycleError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next_batch()
    }
}

/// Iteration order of an [`InMemorySource`].
#[derive(Debug, Clone)]
pub enum Order {
    /// Same order every pass (evaluation).
    Stable,
    /// Reshuffled every pass from a seeded RNG (training).
    Shuffled(StdRng),
}

impl Order {
    /// Seeded shuffling order.
    pub fn shuffled(seed: u64) -> Self {
        Self::Shuffled(StdRng::seed_from_u64(seed))
    }

    /// Returns `true` for [`Order::Stable`].
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Decoded `(C, H, W)` images kept in memory. Batches are stacked and
/// augmented one at a time as the pass advances, so only the batch in
/// flight is copied.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_core::Domain;
/// use cycle_data::{BatchSource, InMemorySource, Order};
///
/// let device = Device::Cpu;
/// let images: Vec<Tensor> = (0..5)
///     .map(|_| Tensor::zeros((3, 8, 8), DType::F32, &device).unwrap())
///     .collect();
/// let mut source = InMemorySource::new(Domain::A, images, 2, Order::Stable).unwrap();
/// assert_eq!(source.num_batches(), 3);
///
/// source.rewind();
/// assert_eq!(source.next_batch().unwrap().unwrap().dims(), &[2, 3, 8, 8]);
/// assert!(source.next_batch().is_some());
/// assert_eq!(source.next_batch().unwrap().unwrap().dims(), &[1, 3, 8, 8]);
/// assert!(source.next_batch().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct InMemorySource {
    domain: Domain,
    images: Vec<Tensor>,
    batch_size: usize,
    order: Order,
    drop_last: bool,
    augmenter: Option<Augmenter>,
    pass: Vec<usize>,
    cursor: usize,
}

impl InMemorySource {
    /// Wraps decoded images.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] for a zero batch size and
    /// [`CycleError::Data`] if an image is not rank 3.
    pub fn new(
        domain: Domain,
        images: Vec<Tensor>,
        batch_size: usize,
        order: Order,
    ) -> Result<Self, CycleError> {
        if batch_size == 0 {
            return Err(CycleError::InvalidConfig {
                field: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(bad) = images.iter().find(|t| t.rank() != 3) {
            return Err(CycleError::Data {
                message: format!(
                    "domain {domain}: expected (C, H, W) images, got {:?}",
                    bad.dims()
                ),
            });
        }
        Ok(Self {
            domain,
            images,
            batch_size,
            order,
            drop_last: false,
            augmenter: None,
            pass: Vec::new(),
            cursor: 0,
        })
    }

    /// Drops a trailing partial batch so every batch has `batch_size` items.
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Augments every emitted batch.
    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Number of images held.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns `true` if no images are held.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn stack(&mut self, chunk: &[usize]) -> Result<Tensor, CycleError> {
        let items: Vec<&Tensor> = chunk.iter().map(|&i| &self.images[i]).collect();
        let batch = Tensor::stack(&items, 0).map_err(|e| CycleError::Data {
            message: format!("domain {}: cannot stack batch: {e}", self.domain),
        })?;
        let batch = match self.augmenter.as_mut() {
            Some(aug) => aug.apply(&batch)?,
            None => batch,
        };
        batch.contiguous().map_err(|e| CycleError::Tensor {
            message: format!("InMemorySource next_batch: {e}"),
        })
    }
}

impl BatchSource for InMemorySource {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn num_batches(&self) -> usize {
        if self.drop_last {
            self.images.len() / self.batch_size
        } else {
            self.images.len().div_ceil(self.batch_size)
        }
    }

    fn rewind(&mut self) {
        self.pass = (0..self.images.len()).collect();
        if let Order::Shuffled(rng) = &mut self.order {
            self.pass.shuffle(rng);
        }
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<Result<Tensor, CycleError>> {
        let end = (self.cursor + self.batch_size).min(self.pass.len());
        let taken = end.saturating_sub(self.cursor);
        if taken == 0 || (self.drop_last && taken < self.batch_size) {
            return None;
        }
        let chunk = self.pass[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.stack(&chunk))
    }
}

/// The A-domain and B-domain sources of one split (train or held-out).
pub struct SourcePair {
    a: Box<dyn BatchSource>,
    b: Box<dyn BatchSource>,
}

impl std::fmt::Debug for SourcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SourcePair(A: {} batches, B: {} batches)",
            self.a.num_batches(),
            self.b.num_batches()
        )
    }
}

impl SourcePair {
    /// Pairs two sources.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Data`] if `a` is not an A-domain source or `b`
    /// is not a B-domain source.
    pub fn new(a: Box<dyn BatchSource>, b: Box<dyn BatchSource>) -> Result<Self, CycleError> {
        for (expected, source) in [(Domain::A, &a), (Domain::B, &b)] {
            if source.domain() != expected {
                return Err(CycleError::Data {
                    message: format!(
                        "expected a domain {expected} source, got domain {}",
                        source.domain()
                    ),
                });
            }
        }
        Ok(Self { a, b })
    }

    /// The A-domain source.
    pub fn a_mut(&mut self) -> &mut dyn BatchSource {
        self.a.as_mut()
    }

    /// The B-domain source.
    pub fn b_mut(&mut self) -> &mut dyn BatchSource {
        self.b.as_mut()
    }

    /// Mutable access to both sources at once.
    pub fn both_mut(&mut self) -> (&mut dyn BatchSource, &mut dyn BatchSource) {
        (self.a.as_mut(), self.b.as_mut())
    }

    /// Batches per domain for one pass, `(A, B)`.
    pub fn num_batches(&self) -> (usize, usize) {
        (self.a.num_batches(), self.b.num_batches())
    }
}
