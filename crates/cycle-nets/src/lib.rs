//! # cycle-nets
//!
//! Candle networks consumed by the cycle-consistent training loop.
//!
//! The training engine treats every network as an opaque [`ImageModel`]:
//! a differentiable `forward` plus the [`VarMap`] that owns its trainable
//! parameters. Two concrete architectures ship here:
//!
//! - [`ResnetGenerator`]: c7s1 stem → 2× stride-2 down → N residual blocks
//!   → 2× transposed-conv up → c7s1 head → tanh
//! - [`PatchDiscriminator`]: stacked 4×4 convolutions producing a map of
//!   per-patch realism scores (no sigmoid; trained with LSGAN targets)
//!
//! ## Architecture Rules
//!
//! - Each network owns its own `VarMap`. Optimizers are scoped by handing
//!   them exactly the variables of the networks they update.
//! - Weight init is seeded: N(0, `init_std`) weights, zero biases.

pub mod config;
pub mod discriminator;
pub mod generator;
pub mod init;
mod layers;

pub use config::NetConfig;
pub use discriminator::PatchDiscriminator;
pub use generator::ResnetGenerator;
pub use init::{copy_parameters, normal_init, ParameterSnapshot};

use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use cycle_core::CycleError;

/// A trainable image-to-image (or image-to-score-map) function.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_nets::{ImageModel, NetConfig, ResnetGenerator};
///
/// let config = NetConfig { ngf: 4, n_blocks: 1, ..NetConfig::default() };
/// let g = ResnetGenerator::new("G_A", &config, 0, &Device::Cpu).unwrap();
/// let x = Tensor::zeros((1, 3, 8, 8), DType::F32, &Device::Cpu).unwrap();
/// assert_eq!(g.forward(&x).unwrap().dims(), &[1, 3, 8, 8]);
/// assert!(g.param_count() > 0);
/// ```
pub trait ImageModel {
    /// Short name used in logs and checkpoint files, e.g. `G_A`.
    fn name(&self) -> &str;

    /// Differentiable forward pass over a `(batch, C, H, W)` tensor.
    fn forward(&self, xs: &Tensor) -> Result<Tensor, CycleError>;

    /// The variable store owning this model's parameters.
    fn var_map(&self) -> &VarMap;

    /// All trainable variables of this model.
    fn vars(&self) -> Vec<Var> {
        self.var_map().all_vars()
    }

    /// Total number of scalar parameters.
    fn param_count(&self) -> usize {
        self.vars().iter().map(|v| v.elem_count()).sum()
    }
}
