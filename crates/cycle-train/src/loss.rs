//! LSGAN + L1 cycle loss composition.
//!
//! ```text
//! fake_b = G_A(real_a)   G_A_loss = MSE(D_A(fake_b), 1)
//! rec_a  = G_B(fake_b)   A_cycle  = L1(rec_a, real_a) · λA
//! fake_a = G_B(real_b)   G_B_loss = MSE(D_B(fake_a), 1)
//! rec_b  = G_A(fake_a)   B_cycle  = L1(rec_b, real_b) · λB
//! total  = G_A_loss + G_B_loss + A_cycle + B_cycle
//! ```
//!
//! Every function here is a pure function of model outputs; nothing is
//! sampled.

use candle_core::Tensor;
use cycle_core::CycleError;
use cycle_nets::ImageModel;

use crate::models::CycleModels;

fn tensor_err(context: &'static str) -> impl Fn(candle_core::Error) -> CycleError {
    move |e| CycleError::Tensor {
        message: format!("{context}: {e}"),
    }
}

/// Mean squared error of every element of `pred` against the constant
/// `target` (1.0 for "real", 0.0 for "fake").
pub fn mse_against(pred: &Tensor, target: f64) -> Result<Tensor, CycleError> {
    pred.affine(1.0, -target)
        .and_then(|d| d.sqr())
        .and_then(|d| d.mean_all())
        .map_err(tensor_err("mse_against"))
}

/// Mean absolute error between two same-shaped tensors.
pub fn l1(pred: &Tensor, target: &Tensor) -> Result<Tensor, CycleError> {
    if pred.dims() != target.dims() {
        return Err(CycleError::ShapeMismatch {
            context: "l1",
            left: pred.dims().to_vec(),
            right: target.dims().to_vec(),
        });
    }
    (pred - target)
        .and_then(|d| d.abs())
        .and_then(|d| d.mean_all())
        .map_err(tensor_err("l1"))
}

/// Weights of the two cycle-reconstruction terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleWeights {
    /// λA, weight of the A→B→A term.
    pub lambda_a: f64,
    /// λB, weight of the B→A→B term.
    pub lambda_b: f64,
}

/// Output of one generator forward pass: the translated and reconstructed
/// images plus every loss term, still attached to the graph.
#[derive(Debug, Clone)]
pub struct GeneratorLosses {
    /// `G_B(real_b)`.
    pub fake_a: Tensor,
    /// `G_A(real_a)`.
    pub fake_b: Tensor,
    /// `G_B(fake_b)`.
    pub rec_a: Tensor,
    /// `G_A(fake_a)`.
    pub rec_b: Tensor,
    /// `MSE(D_A(fake_b), 1)`.
    pub g_a: Tensor,
    /// `MSE(D_B(fake_a), 1)`.
    pub g_b: Tensor,
    /// `λA · L1(rec_a, real_a)`.
    pub a_cycle: Tensor,
    /// `λB · L1(rec_b, real_b)`.
    pub b_cycle: Tensor,
    /// Sum of the four terms above.
    pub total: Tensor,
}

impl GeneratorLosses {
    /// Scalar values of `(g_a, g_b, a_cycle, b_cycle)`.
    pub fn scalars(&self) -> Result<[f32; 4], CycleError> {
        let map_err = tensor_err("GeneratorLosses scalars");
        Ok([
            self.g_a.to_vec0::<f32>().map_err(&map_err)?,
            self.g_b.to_vec0::<f32>().map_err(&map_err)?,
            self.a_cycle.to_vec0::<f32>().map_err(&map_err)?,
            self.b_cycle.to_vec0::<f32>().map_err(&map_err)?,
        ])
    }
}

/// Runs both generators and both (frozen) discriminators on a paired batch
/// and composes the generator objective.
///
/// # Errors
///
/// Returns [`CycleError::ShapeMismatch`] if a generator changes the image
/// shape, and propagates model failures.
pub fn generator_losses(
    models: &CycleModels,
    real_a: &Tensor,
    real_b: &Tensor,
    weights: CycleWeights,
) -> Result<GeneratorLosses, CycleError> {
    let map_err = tensor_err("generator_losses");

    let fake_b = models.g_a.forward(real_a)?;
    let g_a = mse_against(&models.d_a.forward(&fake_b)?, 1.0)?;
    let rec_a = models.g_b.forward(&fake_b)?;
    let a_cycle = l1(&rec_a, real_a)?
        .affine(weights.lambda_a, 0.0)
        .map_err(&map_err)?;

    let fake_a = models.g_b.forward(real_b)?;
    let g_b = mse_against(&models.d_b.forward(&fake_a)?, 1.0)?;
    let rec_b = models.g_a.forward(&fake_a)?;
    let b_cycle = l1(&rec_b, real_b)?
        .affine(weights.lambda_b, 0.0)
        .map_err(&map_err)?;

    let total = (&g_a + &g_b)
        .and_then(|t| t + &a_cycle)
        .and_then(|t| t + &b_cycle)
        .map_err(&map_err)?;

    Ok(GeneratorLosses {
        fake_a,
        fake_b,
        rec_a,
        rec_b,
        g_a,
        g_b,
        a_cycle,
        b_cycle,
        total,
    })
}

/// `0.5 · (MSE(D(real), 1) + MSE(D(fake), 0))`.
///
/// `fake` should already be detached so no gradient reaches a generator.
pub fn discriminator_loss(
    disc: &dyn ImageModel,
    real: &Tensor,
    fake: &Tensor,
) -> Result<Tensor, CycleError> {
    let real_loss = mse_against(&disc.forward(real)?, 1.0)?;
    let fake_loss = mse_against(&disc.forward(fake)?, 0.0)?;
    (real_loss + fake_loss)
        .and_then(|t| t.affine(0.5, 0.0))
        .map_err(tensor_err("discriminator_loss"))
}
