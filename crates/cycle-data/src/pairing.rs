//! Lockstep pairing of the two domains' batches.

use candle_core::Tensor;
use cycle_core::{CycleError, PairingPolicy};

use crate::source::{BatchSource, SourcePair};

/// Walks one epoch of `sources`, pulling one A-batch and one B-batch at a
/// time and handing each pair to `step`. Returns the number of pairs seen.
///
/// - [`PairingPolicy::Truncate`]: stops at the end of the shorter pass.
/// - [`PairingPolicy::CycleShorter`]: every batch of the longer pass is used
///   once; the shorter source is rewound (a fresh pass) whenever it runs out.
///
/// Either side being empty yields no pairs. An error from a source or from
/// `step` ends the epoch immediately.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_core::{Domain, PairingPolicy};
/// use cycle_data::{for_each_pair, InMemorySource, Order, SourcePair};
///
/// let images = |n: usize| -> Vec<Tensor> {
///     (0..n)
///         .map(|_| Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu).unwrap())
///         .collect()
/// };
/// let a = InMemorySource::new(Domain::A, images(3), 1, Order::Stable).unwrap();
/// let b = InMemorySource::new(Domain::B, images(2), 1, Order::Stable).unwrap();
/// let mut pair = SourcePair::new(Box::new(a), Box::new(b)).unwrap();
///
/// let n = for_each_pair(&mut pair, PairingPolicy::Truncate, |_, _| Ok(())).unwrap();
/// assert_eq!(n, 2);
/// let n = for_each_pair(&mut pair, PairingPolicy::CycleShorter, |_, _| Ok(())).unwrap();
/// assert_eq!(n, 3);
/// ```
pub fn for_each_pair<F>(
    sources: &mut SourcePair,
    policy: PairingPolicy,
    mut step: F,
) -> Result<usize, CycleError>
where
    F: FnMut(Tensor, Tensor) -> Result<(), CycleError>,
{
    let (source_a, source_b) = sources.both_mut();
    let len = policy.epoch_len(source_a.num_batches(), source_b.num_batches());
    source_a.rewind();
    source_b.rewind();

    for seen in 0..len {
        let next_a = next_wrapping(source_a)?;
        let next_b = next_wrapping(source_b)?;
        match (next_a, next_b) {
            (Some(a), Some(b)) => step(a, b)?,
            _ => return Ok(seen),
        }
    }
    Ok(len)
}

fn next_wrapping(source: &mut dyn BatchSource) -> Result<Option<Tensor>, CycleError> {
    if let Some(batch) = source.next_batch() {
        return batch.map(Some);
    }
    source.rewind();
    source.next_batch().transpose()
}
