//! The four networks of a cycle-consistent GAN.

use candle_core::Device;
use cycle_core::CycleError;
use cycle_nets::{ImageModel, NetConfig, PatchDiscriminator, ResnetGenerator};

/// `G_A` (A→B), `G_B` (B→A), `D_A` (judges B-domain images) and `D_B`
/// (judges A-domain images).
pub struct CycleModels {
    /// Generator A→B.
    pub g_a: Box<dyn ImageModel>,
    /// Generator B→A.
    pub g_b: Box<dyn ImageModel>,
    /// Discriminator over domain B.
    pub d_a: Box<dyn ImageModel>,
    /// Discriminator over domain A.
    pub d_b: Box<dyn ImageModel>,
}

impl std::fmt::Debug for CycleModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: usize = self.iter().map(|(_, m)| m.param_count()).sum();
        write!(
            f,
            "CycleModels({}, {}, {}, {}: {:.2}M params)",
            self.g_a.name(),
            self.g_b.name(),
            self.d_a.name(),
            self.d_b.name(),
            params as f64 / 1_000_000.0
        )
    }
}

impl CycleModels {
    /// Wraps four already-built networks.
    pub fn new(
        g_a: Box<dyn ImageModel>,
        g_b: Box<dyn ImageModel>,
        d_a: Box<dyn ImageModel>,
        d_b: Box<dyn ImageModel>,
    ) -> Self {
        Self { g_a, g_b, d_a, d_b }
    }

    /// Builds ResNet generators and PatchGAN discriminators, each initialized
    /// from its own seed derived from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if `net` does not fit
    /// `input_size`, or [`CycleError::Tensor`] if construction fails.
    pub fn build(
        net: &NetConfig,
        input_size: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self, CycleError> {
        net.validate(input_size)?;
        let models = Self {
            g_a: Box::new(ResnetGenerator::new("G_A", net, seed, device)?),
            g_b: Box::new(ResnetGenerator::new("G_B", net, seed.wrapping_add(1), device)?),
            d_a: Box::new(PatchDiscriminator::new("D_A", net, seed.wrapping_add(2), device)?),
            d_b: Box::new(PatchDiscriminator::new("D_B", net, seed.wrapping_add(3), device)?),
        };
        tracing::info!(models = ?models, "built networks");
        Ok(models)
    }

    /// Checkpoint file stem and network, in save order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &dyn ImageModel)> {
        [
            ("generatorA_param", self.g_a.as_ref()),
            ("generatorB_param", self.g_b.as_ref()),
            ("discriminatorA_param", self.d_a.as_ref()),
            ("discriminatorB_param", self.d_b.as_ref()),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> NetConfig {
        NetConfig {
            ngf: 2,
            ndf: 2,
            n_blocks: 1,
            n_layers_d: 1,
            ..NetConfig::default()
        }
    }

    #[test]
    fn build_names_and_orders_models() {
        let models = CycleModels::build(&tiny(), 16, 0, &Device::Cpu).unwrap();
        let names: Vec<&str> = models.iter().map(|(_, m)| m.name()).collect();
        assert_eq!(names, vec!["G_A", "G_B", "D_A", "D_B"]);
        let stems: Vec<&str> = models.iter().map(|(s, _)| s).collect();
        assert_eq!(stems[0], "generatorA_param");
        assert!(format!("{models:?}").contains("G_A"));
    }

    #[test]
    fn build_validates_input_size() {
        let err = CycleModels::build(&tiny(), 18, 0, &Device::Cpu).unwrap_err();
        assert!(err.is_config());
    }
}
