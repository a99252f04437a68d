//! # cycle-core
//!
//! Shared vocabulary for the cyclegan-rs workspace.
//!
//! Every other crate depends on this one for:
//!
//! - [`CycleError`]: the single error type propagated through training
//! - [`TrainConfig`]: run configuration with up-front validation
//! - [`Domain`]: the two image domains (A and B)
//!
//! ## Architecture Rules
//!
//! - No tensor code here. `cycle-core` does not depend on candle.
//! - Configuration errors are reported by [`TrainConfig::validate`] before
//!   any model is built, never discovered mid-run.

pub mod config;
pub mod domain;
pub mod error;

pub use config::{PairingPolicy, TrainConfig};
pub use domain::Domain;
pub use error::CycleError;

/// Default number of generated samples kept per domain history buffer.
pub const DEFAULT_POOL_CAPACITY: usize = 50;

/// Default epoch interval between held-out evaluation passes.
pub const DEFAULT_EVAL_INTERVAL: usize = 10;
