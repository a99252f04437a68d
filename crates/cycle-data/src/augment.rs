//! Training-time augmentation: resize, random crop, random horizontal flip.

use candle_core::{Tensor, D};
use cycle_core::CycleError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Augmentation settings applied to every training batch, in order.
///
/// # Example
///
/// ```
/// use cycle_data::AugmentConfig;
///
/// let config = AugmentConfig::default();
/// assert_eq!(config.resize_scale, Some(286));
/// assert_eq!(config.crop_size, Some(256));
/// assert!(config.validate(256).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Resize every image to this square side first (default: 286).
    pub resize_scale: Option<usize>,

    /// Take a random square crop of this side (default: 256).
    pub crop_size: Option<usize>,

    /// Flip each image left-right with probability 0.5 (default: true).
    pub fliplr: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            resize_scale: Some(286),
            crop_size: Some(256),
            fliplr: true,
        }
    }
}

impl AugmentConfig {
    /// No-op augmentation.
    pub fn none() -> Self {
        Self {
            resize_scale: None,
            crop_size: None,
            fliplr: false,
        }
    }

    /// Side of the images this pipeline emits for inputs of side `input_size`.
    pub fn output_size(&self, input_size: usize) -> usize {
        self.crop_size
            .or(self.resize_scale)
            .unwrap_or(input_size)
    }

    /// Checks that the crop fits inside the (possibly resized) image.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::InvalidConfig`] on zero sizes or an oversized crop.
    pub fn validate(&self, input_size: usize) -> Result<(), CycleError> {
        if self.resize_scale == Some(0) || self.crop_size == Some(0) {
            return Err(CycleError::InvalidConfig {
                field: "resize_scale/crop_size",
                message: "sizes must be at least 1 (use None to disable)".to_string(),
            });
        }
        let before_crop = self.resize_scale.unwrap_or(input_size);
        if let Some(crop) = self.crop_size {
            if crop > before_crop {
                return Err(CycleError::InvalidConfig {
                    field: "crop_size",
                    message: format!("crop {crop} exceeds image side {before_crop}"),
                });
            }
        }
        Ok(())
    }
}

/// Stateful augmentation pipeline with its own seeded RNG.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use cycle_data::{AugmentConfig, Augmenter};
///
/// let config = AugmentConfig { resize_scale: Some(12), crop_size: Some(8), fliplr: true };
/// let mut aug = Augmenter::new(config, 3);
/// let batch = Tensor::zeros((2, 3, 10, 10), DType::F32, &Device::Cpu).unwrap();
/// assert_eq!(aug.apply(&batch).unwrap().dims(), &[2, 3, 8, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
    rng: StdRng,
}

impl Augmenter {
    /// Creates a pipeline seeded with `seed`.
    pub fn new(config: AugmentConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns the pipeline settings.
    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Augments a `(batch, C, H, W)` tensor, returning a new tensor.
    ///
    /// Crop offsets and flips are drawn independently per image.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Data`] if the batch is too small for the crop
    /// and [`CycleError::Tensor`] on backend failures.
    pub fn apply(&mut self, batch: &Tensor) -> Result<Tensor, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("Augmenter apply: {e}"),
        };

        let mut out = match self.config.resize_scale {
            Some(side) => batch.upsample_nearest2d(side, side).map_err(map_err)?,
            None => batch.clone(),
        };

        if self.config.crop_size.is_none() && !self.config.fliplr {
            return Ok(out);
        }

        let n = out.dim(0).map_err(map_err)?;
        let mut items = Vec::with_capacity(n);
        for i in 0..n {
            let mut item = out.narrow(0, i, 1).map_err(map_err)?;
            if let Some(crop) = self.config.crop_size {
                item = self.random_crop(&item, crop)?;
            }
            if self.config.fliplr && self.rng.gen_bool(0.5) {
                item = flip_horizontal(&item).map_err(map_err)?;
            }
            items.push(item);
        }
        out = Tensor::cat(&items, 0).map_err(map_err)?;
        Ok(out)
    }

    fn random_crop(&mut self, item: &Tensor, crop: usize) -> Result<Tensor, CycleError> {
        let map_err = |e: candle_core::Error| CycleError::Tensor {
            message: format!("Augmenter random_crop: {e}"),
        };
        let (_, _, h, w) = item.dims4().map_err(map_err)?;
        if crop > h || crop > w {
            return Err(CycleError::Data {
                message: format!("crop {crop} larger than image {h}x{w}"),
            });
        }
        let top = self.rng.gen_range(0..=h - crop);
        let left = self.rng.gen_range(0..=w - crop);
        item.narrow(2, top, crop)
            .and_then(|t| t.narrow(3, left, crop))
            .map_err(map_err)
    }
}

/// Mirrors a `(…, W)` tensor along its last dimension.
pub fn flip_horizontal(xs: &Tensor) -> candle_core::Result<Tensor> {
    let w = xs.dim(D::Minus1)?;
    let idx: Vec<u32> = (0..w as u32).rev().collect();
    let idx = Tensor::from_vec(idx, w, xs.device())?;
    xs.contiguous()?.index_select(&idx, xs.rank() - 1)
}
