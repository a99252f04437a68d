//! PatchGAN discriminator.
//!
//! ```text
//! Conv4/s2(in→ndf) → LReLU(0.2)
//! [Conv4/s2 → IN → LReLU] × (n_layers_d - 1)
//! Conv4/s1 → IN → LReLU
//! Conv4/s1(→1)
//! ```
//!
//! The output is an unbounded score map; LSGAN targets (1 real, 0 fake) are
//! applied to every patch.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv2d, Module, VarBuilder, VarMap};
use cycle_core::CycleError;

use crate::config::NetConfig;
use crate::init::normal_init;
use crate::layers::{conv, instance_norm, leaky_relu};
use crate::ImageModel;

const SLOPE: f64 = 0.2;

/// Convolutional realism classifier over overlapping patches.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_nets::{ImageModel, NetConfig, PatchDiscriminator};
///
/// let config = NetConfig { ndf: 4, n_layers_d: 1, ..NetConfig::default() };
/// let d = PatchDiscriminator::new("D_A", &config, 7, &Device::Cpu).unwrap();
/// let x = Tensor::zeros((2, 3, 16, 16), DType::F32, &Device::Cpu).unwrap();
/// assert_eq!(d.forward(&x).unwrap().dims(), &[2, 1, 6, 6]);
/// ```
pub struct PatchDiscriminator {
    name: String,
    first: Conv2d,
    body: Vec<Conv2d>,
    head: Conv2d,
    var_map: VarMap,
    config: NetConfig,
    device: Device,
}

impl std::fmt::Debug for PatchDiscriminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PatchDiscriminator({}: in={}, ndf={}, layers={}, {:.2}M params, device={:?})",
            self.name,
            self.config.disc_input_nc,
            self.config.ndf,
            self.config.n_layers_d,
            self.param_count() as f64 / 1_000_000.0,
            self.device
        )
    }
}

impl PatchDiscriminator {
    /// Builds a discriminator with its own `VarMap`, initialized from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Tensor`] if parameter creation fails.
    pub fn new(
        name: impl Into<String>,
        config: &NetConfig,
        seed: u64,
        device: &Device,
    ) -> Result<Self, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("PatchDiscriminator new: {e}"),
        };

        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        let ndf = config.ndf;
        let n_layers = config.n_layers_d.max(1);

        let first = conv(vb.pp("first"), config.disc_input_nc, ndf, 4, 2, 1).map_err(map_err)?;

        let mut body = Vec::with_capacity(n_layers);
        let mut mult = 1;
        for n in 1..n_layers {
            let prev = mult;
            mult = NetConfig::disc_mult(n);
            body.push(
                conv(vb.pp(format!("body_{}", n - 1)), ndf * prev, ndf * mult, 4, 2, 1)
                    .map_err(map_err)?,
            );
        }
        let prev = mult;
        mult = NetConfig::disc_mult(n_layers);
        body.push(
            conv(vb.pp(format!("body_{}", n_layers - 1)), ndf * prev, ndf * mult, 4, 1, 1)
                .map_err(map_err)?,
        );

        let head = conv(vb.pp("head"), ndf * mult, 1, 4, 1, 1).map_err(map_err)?;

        normal_init(&var_map, seed, config.init_std)?;

        Ok(Self {
            name: name.into(),
            first,
            body,
            head,
            var_map,
            config: config.clone(),
            device: device.clone(),
        })
    }

    /// Returns the architecture this discriminator was built with.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    fn forward_inner(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = leaky_relu(&self.first.forward(xs)?, SLOPE)?;
        for layer in &self.body {
            h = leaky_relu(&instance_norm(&layer.forward(&h)?)?, SLOPE)?;
        }
        self.head.forward(&h)
    }
}

impl ImageModel for PatchDiscriminator {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor, CycleError> {
        self.forward_inner(xs).map_err(|e| CycleError::Tensor {
            message: format!("{} forward: {e}", self.name),
        })
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }
}
