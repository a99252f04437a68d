//! ResNet-style image-to-image generator.
//!
//! Architecture (for `ngf` base filters and `n_blocks` residual blocks):
//!
//! ```text
//! Conv7(in→ngf) → IN → ReLU
//! Conv3/s2(ngf→2ngf) → IN → ReLU
//! Conv3/s2(2ngf→4ngf) → IN → ReLU
//! [Conv3 → IN → ReLU → Conv3 → IN, + skip] × n_blocks
//! ConvT3/s2(4ngf→2ngf) → IN → ReLU
//! ConvT3/s2(2ngf→ngf) → IN → ReLU
//! Conv7(ngf→out) → tanh
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv2d, ConvTranspose2d, Module, VarBuilder, VarMap};
use cycle_core::CycleError;

use crate::config::NetConfig;
use crate::init::normal_init;
use crate::layers::{conv, conv_up, instance_norm};
use crate::ImageModel;

struct ResBlock {
    conv1: Conv2d,
    conv2: Conv2d,
}

impl ResBlock {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let h = instance_norm(&self.conv1.forward(xs)?)?.relu()?;
        let h = instance_norm(&self.conv2.forward(&h)?)?;
        xs + h
    }
}

/// Encoder / residual bottleneck / decoder generator with tanh output in
/// `[-1, 1]`. Preserves spatial size for inputs divisible by 4.
///
/// # Example
///
/// ```
/// use candle_core::{Device, Tensor};
/// use cycle_nets::{ImageModel, NetConfig, ResnetGenerator};
///
/// let config = NetConfig { ngf: 4, n_blocks: 2, ..NetConfig::default() };
/// let g = ResnetGenerator::new("G_A", &config, 42, &Device::Cpu).unwrap();
/// let x = Tensor::randn(0f32, 1.0, (2, 3, 16, 16), &Device::Cpu).unwrap();
/// let y = g.forward(&x).unwrap();
/// assert_eq!(y.dims(), &[2, 3, 16, 16]);
/// ```
pub struct ResnetGenerator {
    name: String,
    stem: Conv2d,
    down: Vec<Conv2d>,
    blocks: Vec<ResBlock>,
    up: Vec<ConvTranspose2d>,
    head: Conv2d,
    var_map: VarMap,
    config: NetConfig,
    device: Device,
}

impl std::fmt::Debug for ResnetGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ResnetGenerator({}: {}→{}, ngf={}, blocks={}, {:.2}M params, device={:?})",
            self.name,
            self.config.input_nc,
            self.config.output_nc,
            self.config.ngf,
            self.config.n_blocks,
            self.param_count() as f64 / 1_000_000.0,
            self.device
        )
    }
}

impl ResnetGenerator {
    /// Builds a generator with its own `VarMap`, initialized from `seed`.
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
            message: format!("ResnetGenerator new: {e}"),
        };

        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        let ngf = config.ngf;

        let stem = conv(vb.pp("stem"), config.input_nc, ngf, 7, 1, 3).map_err(map_err)?;
        let down = vec![
            conv(vb.pp("down_0"), ngf, ngf * 2, 3, 2, 1).map_err(map_err)?,
            conv(vb.pp("down_1"), ngf * 2, ngf * 4, 3, 2, 1).map_err(map_err)?,
        ];

        let mut blocks = Vec::with_capacity(config.n_blocks);
        for i in 0..config.n_blocks {
            let prefix = format!("block_{i}");
            blocks.push(ResBlock {
                conv1: conv(vb.pp(format!("{prefix}.conv1")), ngf * 4, ngf * 4, 3, 1, 1)
                    .map_err(map_err)?,
                conv2: conv(vb.pp(format!("{prefix}.conv2")), ngf * 4, ngf * 4, 3, 1, 1)
                    .map_err(map_err)?,
            });
        }

        let up = vec![
            conv_up(vb.pp("up_0"), ngf * 4, ngf * 2).map_err(map_err)?,
            conv_up(vb.pp("up_1"), ngf * 2, ngf).map_err(map_err)?,
        ];
        let head = conv(vb.pp("head"), ngf, config.output_nc, 7, 1, 3).map_err(map_err)?;

        normal_init(&var_map, seed, config.init_std)?;

        Ok(Self {
            name: name.into(),
            stem,
            down,
            blocks,
            up,
            head,
            var_map,
            config: config.clone(),
            device: device.clone(),
        })
    }

    /// Returns the architecture this generator was built with.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Returns the device holding the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn forward_inner(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = instance_norm(&self.stem.forward(xs)?)?.relu()?;
        for layer in &self.down {
            h = instance_norm(&layer.forward(&h)?)?.relu()?;
        }
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        for layer in &self.up {
            h = instance_norm(&layer.forward(&h)?)?.relu()?;
        }
        self.head.forward(&h)?.tanh()
    }
}

impl ImageModel for ResnetGenerator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::ParameterSnapshot;

    fn small_config() -> NetConfig {
        NetConfig {
            ngf: 4,
            n_blocks: 1,
            ..NetConfig::default()
        }
    }

    #[test]
    fn output_in_tanh_range() {
        let device = Device::Cpu;
        let g = ResnetGenerator::new("G_A", &small_config(), 3, &device).unwrap();
        let x = Tensor::randn(0f32, 2.0, (1, 3, 8, 8), &device).unwrap();
        let y = g.forward(&x).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(y.iter().all(|v| v.is_finite() && (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn same_seed_same_weights() {
        let device = Device::Cpu;
        let a = ResnetGenerator::new("G_A", &small_config(), 9, &device).unwrap();
        let b = ResnetGenerator::new("G_B", &small_config(), 9, &device).unwrap();
        let sa = ParameterSnapshot::capture(a.var_map()).unwrap();
        let sb = ParameterSnapshot::capture(b.var_map()).unwrap();
        assert_eq!(sa.max_abs_diff(&sb), Some(0.0));
    }

    #[test]
    fn param_count_matches_layout() {
        let device = Device::Cpu;
        let config = small_config();
        let g = ResnetGenerator::new("G_A", &config, 0, &device).unwrap();
        let ngf = config.ngf;
        let conv_params = |i: usize, o: usize, k: usize| i * o * k * k + o;
        let expected = conv_params(3, ngf, 7)
            + conv_params(ngf, ngf * 2, 3)
            + conv_params(ngf * 2, ngf * 4, 3)
            + 2 * conv_params(ngf * 4, ngf * 4, 3)
            + conv_params(ngf * 4, ngf * 2, 3)
            + conv_params(ngf * 2, ngf, 3)
            + conv_params(ngf, 3, 7);
        assert_eq!(g.param_count(), expected);
    }

    #[test]
    fn debug_format_readable() {
        let g = ResnetGenerator::new("G_B", &small_config(), 0, &Device::Cpu).unwrap();
        let debug = format!("{g:?}");
        assert!(debug.contains("ResnetGenerator"));
        assert!(debug.contains("G_B"));
    }
}
