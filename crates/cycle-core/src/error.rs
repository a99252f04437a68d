//! Error taxonomy for cyclegan-rs.
//!
//! Nothing in the workspace retries. Every variant is fatal to the run and
//! propagates to the caller with `?`.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Domain;

/// The error type shared by every cyclegan-rs crate.
///
/// # Example
///
/// ```
/// use cycle_core::CycleError;
///
/// let err = CycleError::InvalidConfig {
///     field: "decay_epoch",
///     message: "must be less than train_epoch".to_string(),
/// };
/// assert!(err.to_string().contains("decay_epoch"));
/// assert!(err.is_config());
/// ```
#[derive(Debug, Error)]
pub enum CycleError {
    /// A configuration value was rejected before training started.
    #[error("invalid configuration `{field}`: {message}")]
    InvalidConfig {
        /// Offending field name.
        field: &'static str,
        /// Human-readable reason.
        message: String,
    },

    /// A loss went NaN or infinite.
    #[error("numerical divergence in {loss} at epoch {epoch}, iteration {iteration}: {value}")]
    Divergence {
        /// Loss series name, e.g. `G_A_losses`.
        loss: String,
        /// 1-based epoch number.
        epoch: usize,
        /// 0-based iteration within the epoch.
        iteration: usize,
        /// The offending value.
        value: f32,
    },

    /// Two tensors that must agree in shape did not.
    #[error("shape mismatch in {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Where the comparison happened.
        context: &'static str,
        /// Left-hand dims.
        left: Vec<usize>,
        /// Right-hand dims.
        right: Vec<usize>,
    },

    /// A training source produced no batches for an epoch.
    #[error("data source for domain {domain} produced no batches")]
    EmptySource {
        /// Domain of the empty source.
        domain: Domain,
    },

    /// Data pipeline failure (decode, augmentation, batching).
    #[error("data error: {message}")]
    Data {
        /// Description.
        message: String,
    },

    /// Filesystem failure while loading or persisting.
    #[error("I/O error at {}: {message}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Description.
        message: String,
    },

    /// Tensor backend failure, wrapped with the calling context.
    #[error("tensor error: {message}")]
    Tensor {
        /// Context plus backend message.
        message: String,
    },

    /// The run was cancelled cooperatively at an iteration boundary.
    #[error("training cancelled at epoch {epoch}, iteration {iteration}")]
    Cancelled {
        /// 1-based epoch number.
        epoch: usize,
        /// 0-based iteration within the epoch.
        iteration: usize,
    },
}

impl CycleError {
    /// Builds an [`CycleError::Io`] from a path and any displayable error.
    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Returns `true` for startup configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Returns `true` for errors after which a postmortem snapshot is useful.
    pub fn is_postmortem_worthy(&self) -> bool {
        matches!(self, Self::Divergence { .. } | Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_message_names_loss() {
        let err = CycleError::Divergence {
            loss: "D_A_losses".to_string(),
            epoch: 3,
            iteration: 7,
            value: f32::NAN,
        };
        let msg = err.to_string();
        assert!(msg.contains("D_A_losses"));
        assert!(msg.contains("epoch 3"));
        assert!(err.is_postmortem_worthy());
        assert!(!err.is_config());
    }

    #[test]
    fn io_helper_keeps_path() {
        let err = CycleError::io("/tmp/x.png", "denied");
        match err {
            CycleError::Io { path, message } => {
                assert_eq!(path, PathBuf::from("/tmp/x.png"));
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn shape_mismatch_lists_dims() {
        let err = CycleError::ShapeMismatch {
            context: "paired batches",
            left: vec![1, 3, 8, 8],
            right: vec![2, 3, 8, 8],
        };
        assert!(err.to_string().contains("[1, 3, 8, 8]"));
    }
}
