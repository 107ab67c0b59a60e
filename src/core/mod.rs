//! Core sparse ternary engine.
//!
//! This module provides the fundamental structures and operations:
//! - Ternary quantization with a straight-through gradient estimator
//! - Sparse layers (dense weight storage behind a fixed connectivity mask)
//! - Feed-forward network stacking with explicit backward passes
//!
//! ## Quantization model
//!
//! Both activations and weights are rounded to {-1, 0, 1} on the forward
//! pass:
//! ```text
//! q(x) = 1   if x > 0.5
//!       -1   if x < -0.5
//!        0   otherwise
//! ```
//!
//! The backward pass treats `q` as the identity (straight-through estimator):
//! the true derivative of a step function is zero almost everywhere, so
//! gradients are passed through unchanged to keep them from vanishing at the
//! quantization boundaries. This is a deliberate approximation, not a bug.
//!
//! Layer outputs are *not* quantized by the layer itself; the next layer
//! quantizes its own input, so the final network output stays real-valued and
//! can be regressed against arbitrary targets.

use ndarray::{Array1, Array2, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Error type for engine operations.
#[derive(Debug, Clone)]
pub enum TritNetError {
    /// Buffer length does not match a declared layer size
    ShapeMismatch(String),
    /// Invalid layer or network configuration
    InvalidConfig(String),
}

impl fmt::Display for TritNetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TritNetError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            TritNetError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl Error for TritNetError {}

pub type TritNetResult<T> = Result<T, TritNetError>;

/// Round a single value to the nearest trit.
#[inline]
pub fn quantize(x: f32) -> f32 {
    if x > 0.5 {
        1.0
    } else if x < -0.5 {
        -1.0
    } else {
        0.0
    }
}

/// Round a vector elementwise to trits. Idempotent.
pub fn quantize_vec(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(quantize)
}

/// Backward half of the quantizer: the straight-through estimator.
///
/// Returns the incoming gradient unchanged, ignoring where the forward value
/// landed in its bucket. Kept as an explicit function so the forward/backward
/// pair reads as one tagged operation rather than being buried in the layer
/// math.
pub fn quantize_grad(grad_output: &Array1<f32>) -> Array1<f32> {
    grad_output.clone()
}

/// A feed-forward layer with ternary-quantized weights and a fixed sparse
/// connectivity mask.
///
/// # Storage
///
/// - `weight`: dense `(out_size, in_size)` matrix of real-valued latent
///   weights. Entries outside the mask are pinned to 0.0 and never touched.
/// - `mask`: boolean `(out_size, in_size)` connectivity pattern, set once at
///   construction and never mutated afterward.
/// - `bias`: real-valued, trainable, never quantized.
/// - `grad_weight` / `grad_bias`: accumulators, zeroed by [`apply`].
///
/// # Invariant
///
/// For every `(o, i)` with `mask[[o, i]] == false`, `weight[[o, i]]` is 0.0
/// and stays 0.0: masked-out edges never influence the output and never
/// receive gradient.
///
/// [`apply`]: SparseLayer::apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseLayer {
    pub in_size: usize,
    pub out_size: usize,
    pub density: f32,
    pub weight: Array2<f32>,
    pub mask: Array2<bool>,
    pub bias: Array1<f32>,
    pub grad_weight: Array2<f32>,
    pub grad_bias: Array1<f32>,
    /// Quantized input cached by the last training forward pass.
    last_input: Array1<f32>,
}

impl SparseLayer {
    /// Create a layer with `density * in_size * out_size` active edges.
    ///
    /// Mask generation is two-phase: every output neuron first gets one
    /// guaranteed input edge (an output with zero active inputs can never
    /// learn), then distinct random edges are added until the target count is
    /// reached. `density == 1.0` is fully connected.
    ///
    /// Active weights are initialized from U(-1, 1), wide enough that
    /// quantization immediately yields a mix of -1, 0 and 1. Biases start at
    /// 0.5.
    ///
    /// # Errors
    /// - `InvalidConfig` if either size is zero or density is outside (0, 1]
    pub fn new(in_size: usize, out_size: usize, density: f32) -> TritNetResult<Self> {
        if in_size == 0 || out_size == 0 {
            return Err(TritNetError::InvalidConfig(format!(
                "layer sizes must be positive (got {}x{})",
                in_size, out_size
            )));
        }
        if !(density > 0.0 && density <= 1.0) {
            return Err(TritNetError::InvalidConfig(format!(
                "density must be in (0, 1], got {}",
                density
            )));
        }

        let mut rng = rand::thread_rng();
        let mask = Self::generate_mask(in_size, out_size, density, &mut rng);

        // Latent weights: U(-1, 1) at active edges, hard zero elsewhere
        let dist = Uniform::new(-1.0f32, 1.0f32);
        let mut weight = Array2::random((out_size, in_size), dist);
        Zip::from(&mut weight).and(&mask).for_each(|w, &m| {
            if !m {
                *w = 0.0;
            }
        });

        Ok(Self {
            in_size,
            out_size,
            density,
            weight,
            mask,
            bias: Array1::from_elem(out_size, 0.5),
            grad_weight: Array2::zeros((out_size, in_size)),
            grad_bias: Array1::zeros(out_size),
            last_input: Array1::zeros(0),
        })
    }

    fn generate_mask(
        in_size: usize,
        out_size: usize,
        density: f32,
        rng: &mut impl Rng,
    ) -> Array2<bool> {
        if density >= 1.0 {
            return Array2::from_elem((out_size, in_size), true);
        }

        let mut mask = Array2::from_elem((out_size, in_size), false);

        // Phase 1: one guaranteed edge per output neuron
        for o in 0..out_size {
            mask[[o, rng.gen_range(0..in_size)]] = true;
        }

        // Phase 2: fill distinct random edges up to the target count
        let total = in_size * out_size;
        let target = ((density as f64 * total as f64).round() as usize).max(out_size);
        let mut active = out_size;
        while active < target {
            let o = rng.gen_range(0..out_size);
            let i = rng.gen_range(0..in_size);
            if !mask[[o, i]] {
                mask[[o, i]] = true;
                active += 1;
            }
        }

        mask
    }

    /// Masked ternary view of the weights: `q(weight)` at active edges, 0.0
    /// elsewhere.
    fn quantized_weights(&self) -> Array2<f32> {
        Zip::from(&self.weight)
            .and(&self.mask)
            .map_collect(|&w, &m| if m { quantize(w) } else { 0.0 })
    }

    /// Training forward pass: quantize input and weights, multiply, add bias.
    ///
    /// Caches the quantized input for the matching [`backward`] call. The
    /// output is left real-valued.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `input.len() != in_size`
    ///
    /// [`backward`]: SparseLayer::backward
    pub fn forward(&mut self, input: &Array1<f32>) -> TritNetResult<Array1<f32>> {
        if input.len() != self.in_size {
            return Err(TritNetError::ShapeMismatch(format!(
                "input length: expected {}, got {}",
                self.in_size,
                input.len()
            )));
        }

        let q_in = quantize_vec(input);
        let mut out = self.quantized_weights().dot(&q_in);
        out += &self.bias;

        self.last_input = q_in;
        Ok(out)
    }

    /// Inference forward pass: identical math to [`forward`] but borrows the
    /// layer immutably and caches nothing.
    ///
    /// [`forward`]: SparseLayer::forward
    pub fn infer(&self, input: &Array1<f32>) -> TritNetResult<Array1<f32>> {
        if input.len() != self.in_size {
            return Err(TritNetError::ShapeMismatch(format!(
                "input length: expected {}, got {}",
                self.in_size,
                input.len()
            )));
        }

        let q_in = quantize_vec(input);
        let mut out = self.quantized_weights().dot(&q_in);
        out += &self.bias;
        Ok(out)
    }

    /// Backward pass under the straight-through rule.
    ///
    /// Accumulates into the gradient buffers (active edges only) and returns
    /// the gradient with respect to this layer's input:
    /// ```text
    /// grad_weight[o][i] += grad_output[o] * qinput[i]    (mask[o][i] only)
    /// grad_bias[o]      += grad_output[o]
    /// grad_input[i]      = sum_o qweight[o][i] * grad_output[o]
    /// ```
    ///
    /// # Errors
    /// - `ShapeMismatch` if `grad_output.len() != out_size`, or if no forward
    ///   pass has run yet
    pub fn backward(&mut self, grad_output: &Array1<f32>) -> TritNetResult<Array1<f32>> {
        if grad_output.len() != self.out_size {
            return Err(TritNetError::ShapeMismatch(format!(
                "gradient length: expected {}, got {}",
                self.out_size,
                grad_output.len()
            )));
        }
        if self.last_input.len() != self.in_size {
            return Err(TritNetError::ShapeMismatch(
                "backward called before forward".to_string(),
            ));
        }

        // STE: the gradient crosses both quantization points unchanged
        let grad_output = quantize_grad(grad_output);

        let q_w = self.quantized_weights();
        let grad_input = q_w.t().dot(&grad_output);

        let go_col = grad_output.view().insert_axis(Axis(1));
        let qi_row = self.last_input.view().insert_axis(Axis(0));
        let outer = &go_col * &qi_row;
        Zip::from(&mut self.grad_weight)
            .and(&self.mask)
            .and(&outer)
            .for_each(|g, &m, &d| {
                if m {
                    *g += d;
                }
            });

        self.grad_bias += &grad_output;

        Ok(grad_input)
    }

    /// Apply accumulated gradients at active edges, then zero the
    /// accumulators.
    pub fn apply(&mut self, learning_rate: f32) {
        Zip::from(&mut self.weight)
            .and(&self.mask)
            .and(&self.grad_weight)
            .for_each(|w, &m, &g| {
                if m {
                    *w -= learning_rate * g;
                }
            });
        self.bias.scaled_add(-learning_rate, &self.grad_bias);

        self.grad_weight.fill(0.0);
        self.grad_bias.fill(0.0);
    }

    /// Clamp latent weight magnitudes to `[-clip, clip]`.
    ///
    /// Keeps quantization-aware training stable: without a bound, latent
    /// weights drift far past the thresholds and stop responding to
    /// gradients of the opposite sign.
    pub fn project_weights(&mut self, clip: f32) {
        self.weight.mapv_inplace(|w| w.clamp(-clip, clip));
    }

    /// Number of active edges in the mask.
    pub fn active_edges(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// An ordered stack of [`SparseLayer`]s.
///
/// Layers are appended once during configuration; training and inference may
/// then be interleaved freely. Each network owns its parameters and
/// accumulators exclusively — independently constructed networks never share
/// state.
///
/// Adjacent layers must agree on sizes (`layers[i].out_size ==
/// layers[i+1].in_size`); [`add_layer`] rejects a broken chain at
/// construction time.
///
/// [`add_layer`]: TritNet::add_layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TritNet {
    pub layers: Vec<SparseLayer>,
    pub learning_rate: f32,
    /// Weight magnitude bound applied after each update; `None` disables
    /// projection.
    pub weight_clip: Option<f32>,
}

impl Default for TritNet {
    fn default() -> Self {
        Self::new()
    }
}

impl TritNet {
    /// Begin an empty network. Learning rate defaults to 0.1 and weight
    /// projection to ±1.5.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            learning_rate: 0.1,
            weight_clip: Some(1.5),
        }
    }

    /// Append a sparse layer.
    ///
    /// # Errors
    /// - `InvalidConfig` if `in_size` does not match the previous layer's
    ///   `out_size`, or if the layer parameters themselves are invalid
    pub fn add_layer(&mut self, in_size: usize, out_size: usize, density: f32) -> TritNetResult<()> {
        if let Some(last) = self.layers.last() {
            if last.out_size != in_size {
                return Err(TritNetError::InvalidConfig(format!(
                    "layer chain broken: previous out_size {} != new in_size {}",
                    last.out_size, in_size
                )));
            }
        }
        self.layers.push(SparseLayer::new(in_size, out_size, density)?);
        Ok(())
    }

    /// Set the rate used by [`apply_updates`].
    ///
    /// [`apply_updates`]: TritNet::apply_updates
    pub fn set_learning_rate(&mut self, rate: f32) {
        self.learning_rate = rate;
    }

    /// Input width of the first layer, if any layer exists.
    pub fn in_size(&self) -> Option<usize> {
        self.layers.first().map(|l| l.in_size)
    }

    /// Output width of the last layer, if any layer exists.
    pub fn out_size(&self) -> Option<usize> {
        self.layers.last().map(|l| l.out_size)
    }

    /// Training forward pass through every layer in order. Returns the final
    /// layer's raw (non-quantized) output.
    ///
    /// # Errors
    /// - `InvalidConfig` on an empty network
    /// - `ShapeMismatch` if `input.len()` does not match the first layer
    pub fn forward(&mut self, input: &Array1<f32>) -> TritNetResult<Array1<f32>> {
        if self.layers.is_empty() {
            return Err(TritNetError::InvalidConfig(
                "network has no layers".to_string(),
            ));
        }
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Side-effect-free inference: same math as [`forward`], touches no
    /// caches and no gradients.
    ///
    /// [`forward`]: TritNet::forward
    pub fn predict(&self, input: &Array1<f32>) -> TritNetResult<Array1<f32>> {
        if self.layers.is_empty() {
            return Err(TritNetError::InvalidConfig(
                "network has no layers".to_string(),
            ));
        }
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.infer(&current)?;
        }
        Ok(current)
    }

    /// Thread the loss gradient back through every layer in reverse order,
    /// accumulating parameter gradients along the way.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the gradient length does not match the last
    ///   layer, or if no forward pass has run
    pub fn backward(&mut self, loss_grad: &Array1<f32>) -> TritNetResult<()> {
        let mut grad = loss_grad.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(())
    }

    /// Flush every layer's accumulators through one gradient-descent step,
    /// then project weights if a clip is configured.
    pub fn apply_updates(&mut self) {
        let lr = self.learning_rate;
        for layer in &mut self.layers {
            layer.apply(lr);
            if let Some(clip) = self.weight_clip {
                layer.project_weights(clip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_quantize_thresholds() {
        assert_eq!(quantize(0.51), 1.0);
        assert_eq!(quantize(0.5), 0.0);
        assert_eq!(quantize(0.0), 0.0);
        assert_eq!(quantize(-0.5), 0.0);
        assert_eq!(quantize(-0.51), -1.0);
        assert_eq!(quantize(100.0), 1.0);
        assert_eq!(quantize(-100.0), -1.0);
    }

    #[test]
    fn test_quantize_idempotent() {
        for &x in &[-2.0f32, -0.7, -0.5, -0.2, 0.0, 0.3, 0.5, 0.9, 3.0] {
            assert_eq!(quantize(quantize(x)), quantize(x));
        }
    }

    #[test]
    fn test_quantize_grad_is_identity() {
        let g = array![0.25f32, -3.0, 0.0];
        assert_eq!(quantize_grad(&g), g);
    }

    #[test]
    fn test_layer_rejects_bad_config() {
        assert!(SparseLayer::new(0, 4, 1.0).is_err());
        assert!(SparseLayer::new(4, 0, 1.0).is_err());
        assert!(SparseLayer::new(4, 4, 0.0).is_err());
        assert!(SparseLayer::new(4, 4, -0.5).is_err());
        assert!(SparseLayer::new(4, 4, 1.5).is_err());
    }

    #[test]
    fn test_dense_layer_fully_connected() {
        let layer = SparseLayer::new(6, 4, 1.0).expect("create layer");
        assert_eq!(layer.active_edges(), 24);
    }

    #[test]
    fn test_sparse_mask_edge_count() {
        let layer = SparseLayer::new(20, 30, 0.25).expect("create layer");
        let target = (0.25f64 * 600.0).round() as usize;
        assert_eq!(layer.active_edges(), target.max(30));
    }

    #[test]
    fn test_every_output_neuron_connected() {
        // Low density is where starved outputs would show up
        let layer = SparseLayer::new(40, 25, 0.05).expect("create layer");
        for o in 0..25 {
            let row_active = layer.mask.row(o).iter().filter(|&&m| m).count();
            assert!(row_active >= 1, "output neuron {} has no active edges", o);
        }
    }

    #[test]
    fn test_inactive_weights_are_zero() {
        let layer = SparseLayer::new(15, 10, 0.3).expect("create layer");
        Zip::from(&layer.weight).and(&layer.mask).for_each(|&w, &m| {
            if !m {
                assert_eq!(w, 0.0);
            }
        });
    }

    #[test]
    fn test_forward_known_values() {
        let mut layer = SparseLayer::new(3, 2, 1.0).expect("create layer");
        // Latent weights on both sides of the thresholds
        layer.weight = array![[0.9, -0.8, 0.1], [0.6, 0.2, -0.9]];
        layer.bias = array![0.0, 1.0];

        let out = layer.forward(&array![1.0, -1.0, 0.0]).expect("forward");
        // Row 0: q = [1, -1, 0] -> 1*1 + (-1)*(-1) + 0 = 2
        // Row 1: q = [1, 0, -1] -> 1*1 + 0 + 0 = 1, plus bias 1
        assert_abs_diff_eq!(out[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_forward_quantizes_input() {
        let mut layer = SparseLayer::new(2, 1, 1.0).expect("create layer");
        layer.weight = array![[1.0, 1.0]];
        layer.bias = array![0.0];

        // 0.4 and -0.3 both land in the zero bucket
        let out = layer.forward(&array![0.4, -0.3]).expect("forward");
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-6);

        let out = layer.forward(&array![0.9, -0.3]).expect("forward");
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_forward_shape_mismatch() {
        let mut layer = SparseLayer::new(3, 2, 1.0).expect("create layer");
        assert!(layer.forward(&array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_backward_before_forward_is_error() {
        let mut layer = SparseLayer::new(3, 2, 1.0).expect("create layer");
        assert!(layer.backward(&array![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_backward_gradients() {
        let mut layer = SparseLayer::new(2, 2, 1.0).expect("create layer");
        layer.weight = array![[1.0, -1.0], [0.0, 1.0]];
        layer.bias = array![0.0, 0.0];

        layer.forward(&array![1.0, -1.0]).expect("forward");
        let grad_in = layer.backward(&array![2.0, -1.0]).expect("backward");

        // grad_input = qW^T . g = [[1, 0], [-1, 1]] . [2, -1]
        assert_abs_diff_eq!(grad_in[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad_in[1], -3.0, epsilon = 1e-6);

        // grad_weight = g (outer) q_in
        assert_abs_diff_eq!(layer.grad_weight[[0, 0]], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.grad_weight[[0, 1]], -2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.grad_weight[[1, 0]], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.grad_weight[[1, 1]], 1.0, epsilon = 1e-6);

        assert_abs_diff_eq!(layer.grad_bias[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.grad_bias[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_apply_updates_and_resets() {
        let mut layer = SparseLayer::new(2, 1, 1.0).expect("create layer");
        layer.weight = array![[0.2, -0.2]];
        layer.bias = array![0.0];

        layer.forward(&array![1.0, 1.0]).expect("forward");
        layer.backward(&array![1.0]).expect("backward");
        layer.apply(0.1);

        assert_abs_diff_eq!(layer.weight[[0, 0]], 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.weight[[0, 1]], -0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(layer.bias[0], -0.1, epsilon = 1e-6);
        assert_eq!(layer.grad_weight, Array2::<f32>::zeros((1, 2)));
        assert_eq!(layer.grad_bias, Array1::<f32>::zeros(1));
    }

    #[test]
    fn test_masked_weights_never_updated() {
        let mut layer = SparseLayer::new(10, 8, 0.3).expect("create layer");
        let mask = layer.mask.clone();

        for step in 0..20 {
            let input = Array1::from_elem(10, if step % 2 == 0 { 1.0 } else { -1.0 });
            layer.forward(&input).expect("forward");
            layer.backward(&Array1::from_elem(8, 0.7)).expect("backward");
            layer.apply(0.05);
            layer.project_weights(1.5);
        }

        assert_eq!(layer.mask, mask);
        Zip::from(&layer.weight).and(&layer.mask).for_each(|&w, &m| {
            if !m {
                assert_eq!(w, 0.0);
            }
        });
    }

    #[test]
    fn test_project_weights_clamps() {
        let mut layer = SparseLayer::new(2, 1, 1.0).expect("create layer");
        layer.weight = array![[4.0, -9.0]];
        layer.project_weights(1.5);
        assert_eq!(layer.weight, array![[1.5, -1.5]]);
    }

    #[test]
    fn test_network_chain_validation() {
        let mut net = TritNet::new();
        net.add_layer(5, 5, 1.0).expect("first layer");
        assert!(net.add_layer(6, 1, 1.0).is_err());
        // The valid continuation still works
        net.add_layer(5, 1, 1.0).expect("second layer");
    }

    #[test]
    fn test_empty_network_rejects_forward() {
        let mut net = TritNet::new();
        assert!(net.forward(&array![1.0]).is_err());
        assert!(net.predict(&array![1.0]).is_err());
    }

    #[test]
    fn test_predict_matches_forward() {
        let mut net = TritNet::new();
        net.add_layer(4, 6, 1.0).expect("layer 1");
        net.add_layer(6, 2, 1.0).expect("layer 2");

        let input = array![1.0, -1.0, 0.0, 1.0];
        let via_forward = net.forward(&input).expect("forward");
        let via_predict = net.predict(&input).expect("predict");
        for (a, b) in via_forward.iter().zip(via_predict.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_predict_leaves_gradients_untouched() {
        let mut net = TritNet::new();
        net.add_layer(3, 2, 1.0).expect("layer");

        net.forward(&array![1.0, 0.0, -1.0]).expect("forward");
        net.backward(&array![1.0, -1.0]).expect("backward");
        let grads_before = net.layers[0].grad_weight.clone();

        net.predict(&array![0.0, 1.0, 1.0]).expect("predict");
        assert_eq!(net.layers[0].grad_weight, grads_before);
    }

    #[test]
    fn test_independent_networks_do_not_interfere() {
        let mut a = TritNet::new();
        a.add_layer(2, 1, 1.0).expect("layer");
        let mut b = TritNet::new();
        b.add_layer(2, 1, 1.0).expect("layer");
        let b_weights = b.layers[0].weight.clone();

        a.forward(&array![1.0, 1.0]).expect("forward");
        a.backward(&array![1.0]).expect("backward");
        a.apply_updates();

        assert_eq!(b.layers[0].weight, b_weights);
    }
}
