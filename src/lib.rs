//! # tritnet
//!
//! A sparse ternary neural-network training and inference engine.
//!
//! Weights and activations are constrained to the trits {-1, 0, 1}, and
//! connectivity between layers can be sparse: each layer carries a fixed
//! boolean mask selecting which of its edges exist. Training works on
//! real-valued latent weights underneath the quantization, with gradients
//! routed through the rounding step by a straight-through estimator.
//!
//! The engine targets tiny character-level language models and toy
//! classifiers trained under severe precision constraints.
//!
//! ## Structure
//!
//! - [`core`] — quantizer, sparse layers, network stacking, error types
//! - [`data`] — ternary character codec and sliding-window sample prep
//! - [`training`] — immediate, accumulate-then-apply, and fused training
//! - [`checkpoint`] — JSON persistence of trained networks
//!
//! ## Quick start
//!
//! ```no_run
//! use tritnet::{fit, window_matrices, Alphabet, TritNet};
//!
//! let alphabet = Alphabet::new();
//! let (inputs, targets) = window_matrices(&alphabet, "hello world hello", 5);
//!
//! let mut net = TritNet::new();
//! net.add_layer(15, 40, 0.2).unwrap();
//! net.add_layer(40, 3, 1.0).unwrap();
//! net.set_learning_rate(0.05);
//!
//! let final_loss = fit(&mut net, &inputs, &targets, 1000, 100).unwrap();
//! println!("final loss: {final_loss}");
//!
//! let next = net.predict(&inputs.row(0).to_owned()).unwrap();
//! println!("next char: {}", alphabet.decode(next.as_slice().unwrap()));
//! ```
//!
//! ## Concurrency
//!
//! A network is exclusively owned by whoever constructed it; gradient
//! accumulation is not synchronized, so share nothing or serialize access.
//! Independent networks coexist freely. Whole-dataset loss evaluation is the
//! one internally parallel operation (read-only forward passes).

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod training;

pub use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
pub use crate::core::{
    quantize, quantize_grad, quantize_vec, SparseLayer, TritNet, TritNetError, TritNetResult,
};
pub use crate::data::samples::{
    load_text, normalize_text, train_eval_split, window_matrices, windows, Windows,
};
pub use crate::data::vocab::{Alphabet, ALPHABET, TRITS_PER_CHAR};
pub use crate::training::{dataset_loss, fit, train_sample, train_step};
