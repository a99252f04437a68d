//! Architecture hyper-parameters.

use cycle_core::CycleError;
use serde::{Deserialize, Serialize};

/// Generator / discriminator architecture settings.
///
/// # Example
///
/// ```
/// use cycle_nets::NetConfig;
///
/// let config = NetConfig::default();
/// assert_eq!(config.n_blocks, 9);
/// assert_eq!(config.discriminator_output_size(256), Some(30));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Generator input channels (default: 3).
    pub input_nc: usize,

    /// Generator output channels (default: 3).
    pub output_nc: usize,

    /// Discriminator input channels (default: 3).
    pub disc_input_nc: usize,

    /// Base generator filters (default: 32).
    pub ngf: usize,

    /// Base discriminator filters (default: 64).
    pub ndf: usize,

    /// Residual blocks in the generator bottleneck (default: 9).
    pub n_blocks: usize,

    /// Stride-2 convolutions in the discriminator (default: 3).
    pub n_layers_d: usize,

    /// Standard deviation of the normal weight init (default: 0.02).
    pub init_std: f64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            disc_input_nc: 3,
            ngf: 32,
            ndf: 64,
            n_blocks: 9,
            n_layers_d: 3,
            init_std: 0.02,
        }
    }
}

impl NetConfig {
    /// Validates the architecture against a square input of side `input_size`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] if a width is zero, the channel
    /// counts cannot round-trip A→B→A, the input is not divisible by 4, or
    /// the discriminator would shrink the input to nothing.
    pub fn validate(&self, input_size: usize) -> Result<(), CycleError> {
        let invalid = |field: &'static str, message: String| {
            Err(CycleError::InvalidConfig { field, message })
        };

        if self.ngf == 0 || self.ndf == 0 {
            return invalid("ngf/ndf", "filter counts must be at least 1".to_string());
        }
        if self.input_nc == 0 || self.output_nc == 0 {
            return invalid("input_nc/output_nc", "channel counts must be at least 1".to_string());
        }
        if self.input_nc != self.output_nc {
            return invalid(
                "output_nc",
                format!(
                    "cycle reconstruction needs matching channels ({} vs {})",
                    self.input_nc, self.output_nc
                ),
            );
        }
        if self.disc_input_nc != self.output_nc {
            return invalid(
                "disc_input_nc",
                format!(
                    "discriminator sees generator output ({} channels), got {}",
                    self.output_nc, self.disc_input_nc
                ),
            );
        }
        if !(self.init_std.is_finite() && self.init_std > 0.0) {
            return invalid("init_std", format!("must be positive, got {}", self.init_std));
        }
        if input_size == 0 || input_size % 4 != 0 {
            return invalid(
                "input_size",
                format!("generator needs a side divisible by 4, got {input_size}"),
            );
        }
        if self.discriminator_output_size(input_size).is_none() {
            return invalid(
                "n_layers_d",
                format!(
                    "{} discriminator layers reduce a {input_size}px input to nothing",
                    self.n_layers_d
                ),
            );
        }
        Ok(())
    }

    /// Side of the discriminator's patch map for a square input, or `None`
    /// if the input is too small.
    pub fn discriminator_output_size(&self, input_size: usize) -> Option<usize> {
        // k=4, p=1: stride 2 halves, stride 1 shrinks by one.
        let mut side = input_size;
        for _ in 0..self.n_layers_d.max(1) {
            side /= 2;
            if side == 0 {
                return None;
            }
        }
        for _ in 0..2 {
            side = side.checked_sub(1)?;
            if side == 0 {
                return None;
            }
        }
        Some(side)
    }

    /// Filter multiplier of discriminator layer `n`, capped at 8.
    pub(crate) fn disc_mult(n: usize) -> usize {
        (1usize << n.min(3)).min(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates_at_256() {
        assert!(NetConfig::default().validate(256).is_ok());
    }

    #[test]
    fn small_inputs_need_shallow_discriminator() {
        let deep = NetConfig::default();
        assert!(deep.validate(16).is_err());

        let shallow = NetConfig {
            n_layers_d: 1,
            ..NetConfig::default()
        };
        assert_eq!(shallow.discriminator_output_size(16), Some(6));
        assert!(shallow.validate(16).is_ok());
    }

    #[test]
    fn odd_sizes_rejected() {
        let config = NetConfig::default();
        assert!(config.validate(258).is_err());
        assert!(config.validate(0).is_err());
    }

    #[test]
    fn channel_mismatch_rejected() {
        let config = NetConfig {
            output_nc: 1,
            ..NetConfig::default()
        };
        assert!(config.validate(256).unwrap_err().is_config());
    }

    #[test]
    fn disc_mult_caps_at_eight() {
        assert_eq!(NetConfig::disc_mult(0), 1);
        assert_eq!(NetConfig::disc_mult(2), 4);
        assert_eq!(NetConfig::disc_mult(5), 8);
    }
}
