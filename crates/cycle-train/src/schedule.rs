//! Linear learning-rate decay.
//!
//! Rates stay at `base_lr` for the first `decay_epoch` epochs and then drop
//! by `base_lr / (total_epochs - decay_epoch)` at the start of every later
//! epoch, reaching zero at the final epoch.

use cycle_core::CycleError;

/// Per-optimizer linear decay schedule.
///
/// # Example
///
/// ```
/// use cycle_train::LinearDecay;
///
/// let decay = LinearDecay::new(2e-4, 100, 200).unwrap();
/// assert_eq!(decay.rate_at(100), 2e-4);
/// assert!((decay.rate_at(150) - 1e-4).abs() < 1e-12);
/// assert!(decay.rate_at(200).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecay {
    base_lr: f64,
    decay_epoch: usize,
    total_epochs: usize,
}

impl LinearDecay {
    /// Builds a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if `decay_epoch >= total_epochs`
    /// or `base_lr` is not a positive finite number.
    pub fn new(base_lr: f64, decay_epoch: usize, total_epochs: usize) -> Result<Self, CycleError> {
        if decay_epoch >= total_epochs {
            return Err(CycleError::InvalidConfig {
                field: "decay_epoch",
                message: format!(
                    "must be less than train_epoch ({decay_epoch} >= {total_epochs})"
                ),
            });
        }
        if !(base_lr.is_finite() && base_lr > 0.0) {
            return Err(CycleError::InvalidConfig {
                field: "lr",
                message: format!("must be a positive finite rate, got {base_lr}"),
            });
        }
        Ok(Self {
            base_lr,
            decay_epoch,
            total_epochs,
        })
    }

    /// Starting rate.
    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    /// Amount subtracted at each decaying epoch boundary.
    pub fn step(&self) -> f64 {
        self.base_lr / (self.total_epochs - self.decay_epoch) as f64
    }

    /// Rate in effect during 1-based epoch `epoch`.
    pub fn rate_at(&self, epoch: usize) -> f64 {
        let decayed = epoch.saturating_sub(self.decay_epoch) as f64;
        (self.base_lr - decayed * self.step()).max(0.0)
    }

    /// Rate for 0-based epoch `epoch_index` given the rate `current` in
    /// effect before it.
    pub fn advance(&self, epoch_index: usize, current: f64) -> f64 {
        if epoch_index >= self.decay_epoch {
            (current - self.step()).max(0.0)
        } else {
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_bad_schedules() {
        assert!(LinearDecay::new(2e-4, 200, 200).unwrap_err().is_config());
        assert!(LinearDecay::new(0.0, 1, 2).is_err());
        assert!(LinearDecay::new(f64::NAN, 1, 2).is_err());
    }

    #[test]
    fn reference_example() {
        let decay = LinearDecay::new(2e-4, 100, 200).unwrap();
        assert!((decay.step() - 2e-6).abs() < 1e-15);
        assert!((decay.rate_at(150) - 1e-4).abs() < 1e-12);
        assert_eq!(decay.rate_at(1), 2e-4);
    }

    #[test]
    fn incremental_matches_closed_form() {
        let decay = LinearDecay::new(2e-4, 3, 10).unwrap();
        let mut lr = decay.base_lr();
        for epoch_index in 0..10 {
            lr = decay.advance(epoch_index, lr);
            assert!((lr - decay.rate_at(epoch_index + 1)).abs() < 1e-12);
        }
        assert!(lr.abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn monotone_and_nonnegative(
            base in 1e-6f64..1.0,
            decay_epoch in 0usize..50,
            extra in 1usize..50,
        ) {
            let total = decay_epoch + extra;
            let decay = LinearDecay::new(base, decay_epoch, total).unwrap();
            let mut prev = decay.rate_at(0);
            for e in 1..=total + 5 {
                let r = decay.rate_at(e);
                prop_assert!(r <= prev);
                prop_assert!(r >= 0.0);
                if e <= decay_epoch {
                    prop_assert_eq!(r, base);
                }
                prev = r;
            }
            prop_assert!(decay.rate_at(total) < base * 1e-9);
        }
    }
}
