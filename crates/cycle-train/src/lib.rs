//! # cycle-train
//!
//! Orchestration of unpaired image-to-image training with two generators,
//! two discriminators and a cycle-consistency constraint.
//!
//! ## Key Components
//!
//! - [`CycleTrainer`]: epoch/iteration driver owning the three optimizers
//!   and both history buffers
//! - [`generator_losses`] / [`discriminator_loss`]: LSGAN + L1 cycle terms
//! - [`LinearDecay`]: constant-then-linear learning-rate schedule
//! - [`TrainHistory`]: per-epoch loss means and timings (`train_hist.json`)
//! - [`EvaluationSink`] / [`SampleWriter`]: periodic qualitative samples
//! - [`Persistence`] / [`SafetensorsStore`]: end-of-run checkpoints
//! - [`plot_history`]: loss curves as `train_hist.png`
//! - [`CancelToken`]: cooperative stop at iteration boundaries
//!
//! ## Architecture Rules
//!
//! - Single orchestration thread; nothing here spawns threads.
//! - Learning rates change only at epoch boundaries.
//! - Discriminators only ever see detached generator output.

pub mod cancel;
pub mod eval;
pub mod loss;
pub mod metrics;
pub mod models;
pub mod persist;
pub mod plot;
pub mod schedule;
pub mod trainer;

pub use cancel::CancelToken;
pub use eval::{EvalSplit, EvaluationSink, NoopSink, SampleWriter};
pub use loss::{discriminator_loss, generator_losses, l1, mse_against, CycleWeights, GeneratorLosses};
pub use metrics::{EpochMeter, EpochSummary, LossKind, LossRecord, LossSeries, TrainHistory};
pub use models::CycleModels;
pub use persist::{Persistence, SafetensorsStore};
pub use plot::plot_history;
pub use schedule::LinearDecay;
pub use trainer::{CycleTrainer, GeneratorStep, LearningRates};
