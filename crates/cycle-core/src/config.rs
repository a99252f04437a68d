//! Run configuration for the cycle-consistent training loop.

use serde::{Deserialize, Serialize};

use crate::error::CycleError;
use crate::{DEFAULT_EVAL_INTERVAL, DEFAULT_POOL_CAPACITY};

/// How batches from two differently sized domain sources are paired
/// within one epoch.
///
/// # Example
///
/// ```
/// use cycle_core::PairingPolicy;
///
/// assert_eq!(PairingPolicy::Truncate.epoch_len(3, 5), 3);
/// assert_eq!(PairingPolicy::CycleShorter.epoch_len(3, 5), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Zip both sources and stop at the shorter one. The remainder of the
    /// longer source is silently dropped for this epoch.
    #[default]
    Truncate,
    /// Walk the longer source completely, wrapping the shorter one around.
    CycleShorter,
}

impl PairingPolicy {
    /// Number of paired iterations for sources of `len_a` and `len_b` batches.
    pub fn epoch_len(&self, len_a: usize, len_b: usize) -> usize {
        match self {
            Self::Truncate => len_a.min(len_b),
            Self::CycleShorter => {
                if len_a == 0 || len_b == 0 {
                    0
                } else {
                    len_a.max(len_b)
                }
            }
        }
    }
}

impl std::str::FromStr for PairingPolicy {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truncate" => Ok(Self::Truncate),
            "cycle" | "cycle_shorter" => Ok(Self::CycleShorter),
            other => Err(CycleError::InvalidConfig {
                field: "pairing",
                message: format!("unknown pairing policy '{other}' (valid: truncate, cycle)"),
            }),
        }
    }
}

/// Hyper-parameters the training loop depends on.
///
/// Defaults reproduce the reference CycleGAN recipe: 200 epochs with linear
/// decay from epoch 100, Adam(0.5, 0.999) at 2e-4, cycle weights of 10 and a
/// 50-sample history buffer per domain.
///
/// # Example
///
/// ```
/// use cycle_core::TrainConfig;
///
/// let config = TrainConfig::default();
/// assert_eq!(config.train_epoch, 200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Total number of epochs (default: 200).
    pub train_epoch: usize,

    /// Number of epochs trained at the base learning rate before linear
    /// decay starts (default: 100).
    pub decay_epoch: usize,

    /// Images per batch (default: 1).
    pub batch_size: usize,

    /// Weight of the A→B→A cycle loss (default: 10).
    pub lambda_a: f64,

    /// Weight of the B→A→B cycle loss (default: 10).
    pub lambda_b: f64,

    /// Base learning rate of the generator-pair optimizer (default: 2e-4).
    pub lr_g: f64,

    /// Base learning rate of each discriminator optimizer (default: 2e-4).
    pub lr_d: f64,

    /// Adam first-moment coefficient (default: 0.5).
    pub beta1: f64,

    /// Adam second-moment coefficient (default: 0.999).
    pub beta2: f64,

    /// Capacity of each domain's history buffer (default: 50).
    pub pool_capacity: usize,

    /// Held-out evaluation runs every `eval_interval` epochs; other epochs
    /// sample from the training sources (default: 10).
    pub eval_interval: usize,

    /// Pairing of unequal domain sources (default: truncate).
    pub pairing: PairingPolicy,

    /// Seed for shuffling, augmentation, weight init and pool replay.
    pub seed: u64,

    /// Persist models and history when the run aborts on divergence or
    /// cancellation (default: true).
    pub save_on_failure: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_epoch: 200,
            decay_epoch: 100,
            batch_size: 1,
            lambda_a: 10.0,
            lambda_b: 10.0,
            lr_g: 2e-4,
            lr_d: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            eval_interval: DEFAULT_EVAL_INTERVAL,
            pairing: PairingPolicy::Truncate,
            seed: 42,
            save_on_failure: true,
        }
    }
}

impl TrainConfig {
    /// Checks every value the training loop relies on.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] naming the first offending field.
    ///
    /// # Example
    ///
    /// ```
    /// use cycle_core::TrainConfig;
    ///
    /// let config = TrainConfig { decay_epoch: 200, ..TrainConfig::default() };
    /// assert!(config.validate().unwrap_err().is_config());
    /// ```
    pub fn validate(&self) -> Result<(), CycleError> {
        let invalid = |field: &'static str, message: String| {
            Err(CycleError::InvalidConfig { field, message })
        };

        if self.train_epoch == 0 {
            return invalid("train_epoch", "must be at least 1".to_string());
        }
        if self.decay_epoch >= self.train_epoch {
            return invalid(
                "decay_epoch",
                format!(
                    "must be less than train_epoch ({} >= {})",
                    self.decay_epoch, self.train_epoch
                ),
            );
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be at least 1".to_string());
        }
        if self.pool_capacity == 0 {
            return invalid("pool_capacity", "must be at least 1".to_string());
        }
        if self.eval_interval == 0 {
            return invalid("eval_interval", "must be at least 1".to_string());
        }
        for (field, value) in [("lr_g", self.lr_g), ("lr_d", self.lr_d)] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(field, format!("must be a positive finite rate, got {value}"));
            }
        }
        for (field, value) in [("lambda_a", self.lambda_a), ("lambda_b", self.lambda_b)] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(field, format!("must be non-negative, got {value}"));
            }
        }
        for (field, value) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&value) {
                return invalid(field, format!("must lie in [0, 1), got {value}"));
            }
        }
        Ok(())
    }

    /// Number of epochs over which the learning rates decay to zero.
    pub fn decay_span(&self) -> usize {
        self.train_epoch.saturating_sub(self.decay_epoch)
    }
}
