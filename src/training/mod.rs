//! Training modes for sparse ternary networks.
//!
//! Three ways to drive the same gradient math, differing in cost rather than
//! result:
//!
//! 1. **Immediate** ([`train_sample`]) — forward, backward, apply, one sample
//!    at a time. Simplest; couples learning-rate scaling to per-sample noise.
//! 2. **Accumulate-then-apply** ([`train_step`] + [`TritNet::apply_updates`])
//!    — call `train_step` once per sample in a batch, then flush all
//!    accumulators with a single `apply_updates`. Summed-gradient batch
//!    descent: the effective step grows with batch size, so the learning rate
//!    must shrink accordingly (a rate tuned for single samples diverges at
//!    full-dataset batches).
//! 3. **Fused loop** ([`fit`]) — the accumulate-then-apply pattern run
//!    internally for a whole epoch count, with periodic loss reporting. Same
//!    algorithm as driving mode 2 from outside, minus the per-sample call
//!    overhead.
//!
//! Loss is squared error `sum((output - target)^2)`; the backward pass uses
//! `(output - target)` directly, folding the factor 2 into the learning rate.
//!
//! Whole-dataset loss evaluation ([`dataset_loss`]) runs read-only forward
//! passes in parallel with Rayon. Gradient accumulation stays sequential, so
//! accumulated results match sequential execution exactly.
//!
//! [`TritNet::apply_updates`]: crate::core::TritNet::apply_updates

use crate::core::{TritNet, TritNetError, TritNetResult};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Squared-error loss between an output and its target.
fn squared_error(output: &Array1<f32>, target: &Array1<f32>) -> f32 {
    let diff = output - target;
    diff.dot(&diff)
}

/// Check a target buffer against the network's declared output width.
fn validate_target(net: &TritNet, target: &Array1<f32>) -> TritNetResult<()> {
    match net.out_size() {
        Some(out) if out == target.len() => Ok(()),
        Some(out) => Err(TritNetError::ShapeMismatch(format!(
            "target length: expected {}, got {}",
            out,
            target.len()
        ))),
        None => Err(TritNetError::InvalidConfig(
            "network has no layers".to_string(),
        )),
    }
}

/// Immediate mode: forward, loss, backward, apply.
///
/// Returns the squared-error loss of the forward pass that produced the
/// update.
///
/// # Errors
/// Fails on buffer length mismatches before any gradient is accumulated, so
/// state from previous valid calls is preserved.
pub fn train_sample(
    net: &mut TritNet,
    input: &Array1<f32>,
    target: &Array1<f32>,
) -> TritNetResult<f32> {
    validate_target(net, target)?;

    let output = net.forward(input)?;
    let loss = squared_error(&output, target);
    let loss_grad = &output - target;
    net.backward(&loss_grad)?;
    net.apply_updates();

    Ok(loss)
}

/// Accumulation mode: forward and backward only.
///
/// Gradients sum into the layer accumulators; nothing is applied until
/// [`TritNet::apply_updates`] runs. Call once per sample in a batch.
///
/// # Errors
/// Fails on buffer length mismatches without touching gradients already
/// accumulated by previous valid calls.
///
/// [`TritNet::apply_updates`]: crate::core::TritNet::apply_updates
pub fn train_step(
    net: &mut TritNet,
    input: &Array1<f32>,
    target: &Array1<f32>,
) -> TritNetResult<()> {
    validate_target(net, target)?;

    let output = net.forward(input)?;
    let loss_grad = &output - target;
    net.backward(&loss_grad)?;

    Ok(())
}

/// Whole-dataset squared-error loss, one sample per row.
///
/// Read-only; forward passes run in parallel across samples.
///
/// # Errors
/// - `ShapeMismatch` if the sample counts disagree or any row has the wrong
///   width
pub fn dataset_loss(
    net: &TritNet,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
) -> TritNetResult<f32> {
    if inputs.nrows() != targets.nrows() {
        return Err(TritNetError::ShapeMismatch(format!(
            "sample counts: inputs={}, targets={}",
            inputs.nrows(),
            targets.nrows()
        )));
    }

    let losses: Vec<TritNetResult<f32>> = (0..inputs.nrows())
        .into_par_iter()
        .map(|s| {
            let output = net.predict(&inputs.row(s).to_owned())?;
            Ok(squared_error(&output, &targets.row(s).to_owned()))
        })
        .collect();

    let mut total = 0.0;
    for loss in losses {
        total += loss?;
    }
    Ok(total)
}

/// Fused multi-epoch training loop.
///
/// Each epoch accumulates gradients over every sample in row order, then
/// applies a single update. With `log_interval > 0`, prints the current
/// whole-dataset loss every `log_interval` epochs (0 disables reporting).
/// Returns the whole-dataset loss after the final epoch.
///
/// Semantically identical to calling [`train_step`] per sample and
/// [`TritNet::apply_updates`] per epoch from outside; this loop exists to
/// avoid the per-sample boundary-crossing cost, not to change the algorithm.
///
/// [`TritNet::apply_updates`]: crate::core::TritNet::apply_updates
pub fn fit(
    net: &mut TritNet,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    epochs: usize,
    log_interval: usize,
) -> TritNetResult<f32> {
    if inputs.nrows() != targets.nrows() {
        return Err(TritNetError::ShapeMismatch(format!(
            "sample counts: inputs={}, targets={}",
            inputs.nrows(),
            targets.nrows()
        )));
    }

    for epoch in 0..epochs {
        for s in 0..inputs.nrows() {
            let input = inputs.row(s).to_owned();
            let target = targets.row(s).to_owned();
            train_step(net, &input, &target)?;
        }
        net.apply_updates();

        if log_interval > 0 && epoch % log_interval == 0 {
            let loss = dataset_loss(net, inputs, targets)?;
            println!("  epoch {}: loss = {:.6}", epoch, loss);
        }
    }

    dataset_loss(net, inputs, targets)
}
