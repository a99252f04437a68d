//! Folder loading and tensor ↔ image conversion.
//!
//! Pixels map linearly between `u8` `[0, 255]` and `f32` `[-1, 1]`.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use cycle_core::CycleError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`CycleError::Io`] if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CycleError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CycleError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CycleError::io(dir, e))?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decodes one file into a `(channels, H, W)` tensor in `[-1, 1]`.
///
/// `channels` must be 1 (grayscale) or 3 (RGB). With `size` set the image is
/// resized to `size × size` with a triangle filter.
///
/// # Errors
///
/// Returns [`CycleError::Io`] on open/decode failure and
/// [`CycleError::InvalidConfig`] for an unsupported channel count.
pub fn load_image(
    path: &Path,
    channels: usize,
    size: Option<u32>,
    device: &Device,
) -> Result<Tensor, CycleError> {
    let map_err = |e: candle_core::Error| CycleError::Tensor {
        message: format!("load_image {}: {e}", path.display()),
    };

    let mut img = image::open(path).map_err(|e| CycleError::io(path, e))?;
    if let Some(side) = size {
        if img.width() != side || img.height() != side {
            img = img.resize_exact(side, side, FilterType::Triangle);
        }
    }
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = match channels {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        other => {
            return Err(CycleError::InvalidConfig {
                field: "input_nc",
                message: format!("images must have 1 or 3 channels, got {other}"),
            })
        }
    };

    Tensor::from_vec(raw, (h, w, channels), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.affine(1.0 / 127.5, -1.0))
        .map_err(map_err)
}

/// Loads every image in `dir` (sorted by name) as `(channels, size, size)`.
///
/// An existing but empty directory yields an empty vector.
///
/// # Errors
///
/// Propagates [`list_images`] and [`load_image`] failures, and returns
/// [`CycleError::Data`] if images differ in size while `size` is `None`.
pub fn load_image_dir(
    dir: &Path,
    channels: usize,
    size: Option<u32>,
    device: &Device,
) -> Result<Vec<Tensor>, CycleError> {
    let paths = list_images(dir)?;
    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let t = load_image(path, channels, size, device)?;
        if let Some(first) = images.first().map(|f: &Tensor| f.dims().to_vec()) {
            if t.dims() != first.as_slice() {
                return Err(CycleError::Data {
                    message: format!(
                        "{}: size {:?} differs from {:?}; set a load size",
                        path.display(),
                        t.dims(),
                        first
                    ),
                });
            }
        }
        images.push(t);
    }
    tracing::info!(dir = %dir.display(), count = images.len(), "loaded images");
    Ok(images)
}

/// Converts a `(C, H, W)` tensor in `[-1, 1]` to an 8-bit image.
///
/// Out-of-range values are clamped.
///
/// # Errors
///
/// Returns [`CycleError::Data`] for a rank other than 3 or a channel count
/// other than 1 or 3.
pub fn tensor_to_image(xs: &Tensor) -> Result<DynamicImage, CycleError> {
    let map_err = |e: candle_core::Error| CycleError::Tensor {
        message: format!("tensor_to_image: {e}"),
    };

    let (c, h, w) = xs.dims3().map_err(|_| CycleError::Data {
        message: format!("expected a (C, H, W) tensor, got {:?}", xs.dims()),
    })?;
    let raw = xs
        .to_dtype(DType::F32)
        .and_then(|t| t.affine(127.5, 127.5))
        .and_then(|t| t.clamp(0f32, 255f32))
        .and_then(|t| t.round())
        .and_then(|t| t.to_dtype(DType::U8))
        .and_then(|t| t.permute((1, 2, 0)))
        .and_then(|t| t.contiguous())
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<u8>())
        .map_err(map_err)?;

    let (w, h) = (w as u32, h as u32);
    let image = match c {
        1 => GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
        other => {
            return Err(CycleError::Data {
                message: format!("cannot render {other}-channel tensor"),
            })
        }
    };
    image.ok_or_else(|| CycleError::Data {
        message: "pixel buffer does not match image dimensions".to_string(),
    })
}

/// Writes a `(C, H, W)` tensor to `path`, creating parent directories.
/// The format follows the file extension.
///
/// # Errors
///
/// Returns [`CycleError::Io`] if the file cannot be written.
pub fn save_image(xs: &Tensor, path: &Path) -> Result<(), CycleError> {
    let image = tensor_to_image(xs)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CycleError::io(parent, e))?;
    }
    image.save(path).map_err(|e| CycleError::io(path, e))
}
