//! Shared building blocks for the generator and discriminator.

use candle_core::{Tensor, D};
use candle_nn::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig, Init, VarBuilder};

const NORM_EPS: f64 = 1e-5;

/// Square `k×k` convolution with a bias. Weights start at zero and are
/// overwritten by [`crate::normal_init`].
pub(crate) fn conv(
    vb: VarBuilder,
    in_c: usize,
    out_c: usize,
    k: usize,
    stride: usize,
    padding: usize,
) -> candle_core::Result<Conv2d> {
    let weight = vb.get_with_hints((out_c, in_c, k, k), "weight", Init::Const(0.0))?;
    let bias = vb.get_with_hints(out_c, "bias", Init::Const(0.0))?;
    let cfg = Conv2dConfig {
        padding,
        stride,
        ..Default::default()
    };
    Ok(Conv2d::new(weight, Some(bias), cfg))
}

/// Stride-2 transposed convolution that exactly doubles the spatial side.
pub(crate) fn conv_up(
    vb: VarBuilder,
    in_c: usize,
    out_c: usize,
) -> candle_core::Result<ConvTranspose2d> {
    let weight = vb.get_with_hints((in_c, out_c, 3, 3), "weight", Init::Const(0.0))?;
    let bias = vb.get_with_hints(out_c, "bias", Init::Const(0.0))?;
    let cfg = ConvTranspose2dConfig {
        padding: 1,
        output_padding: 1,
        stride: 2,
        ..Default::default()
    };
    Ok(ConvTranspose2d::new(weight, Some(bias), cfg))
}

/// Per-sample, per-channel normalization over H×W without affine terms.
pub(crate) fn instance_norm(xs: &Tensor) -> candle_core::Result<Tensor> {
    // xs: [batch, channels, h, w]
    let mean = xs.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?;
    let centered = xs.broadcast_sub(&mean)?;
    let var = centered
        .sqr()?
        .mean_keepdim(D::Minus1)?
        .mean_keepdim(D::Minus2)?;
    let std = (var + NORM_EPS)?.sqrt()?;
    centered.broadcast_div(&std)
}

pub(crate) fn leaky_relu(xs: &Tensor, slope: f64) -> candle_core::Result<Tensor> {
    let scaled = (xs * slope)?;
    xs.maximum(&scaled)
}
