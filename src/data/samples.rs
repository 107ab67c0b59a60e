//! Sliding-window training samples for next-character prediction.
//!
//! Each example pairs a window of `window_size` encoded characters
//! (`3 * window_size` trits) with the encoded character that follows it
//! (3 trits). Examples come out in text order; the order matters for
//! reproducing training curves, not for correctness.

use crate::data::vocab::{Alphabet, TRITS_PER_CHAR};
use ndarray::{s, Array1, Array2};
use std::fs;
use std::io;
use std::path::Path;

/// Lowercase the text and drop characters outside the alphabet.
pub fn normalize_text(alphabet: &Alphabet, text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|&c| alphabet.contains(c))
        .collect()
}

/// Lazy iterator over `(input, target)` windows of a normalized text.
///
/// Finite and restartable: `Clone` the iterator (or call [`windows`] again)
/// to replay the same sequence from the start.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    alphabet: &'a Alphabet,
    chars: Vec<char>,
    window_size: usize,
    pos: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = (Array1<f32>, Array1<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + self.window_size >= self.chars.len() {
            return None;
        }

        let mut input = Vec::with_capacity(self.window_size * TRITS_PER_CHAR);
        for &c in &self.chars[self.pos..self.pos + self.window_size] {
            input.extend_from_slice(&self.alphabet.encode(c));
        }
        let target = self.alphabet.encode(self.chars[self.pos + self.window_size]);

        self.pos += 1;
        Some((Array1::from_vec(input), Array1::from_vec(target.to_vec())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .chars
            .len()
            .saturating_sub(self.pos + self.window_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

/// Build the window iterator for a text. One example per position with at
/// least `window_size` following characters.
pub fn windows<'a>(alphabet: &'a Alphabet, text: &str, window_size: usize) -> Windows<'a> {
    Windows {
        alphabet,
        chars: normalize_text(alphabet, text),
        window_size,
        pos: 0,
    }
}

/// Materialize all windows of a text as `(inputs, targets)` matrices, one
/// sample per row. This is the form [`fit`] consumes.
///
/// [`fit`]: crate::training::fit
pub fn window_matrices(
    alphabet: &Alphabet,
    text: &str,
    window_size: usize,
) -> (Array2<f32>, Array2<f32>) {
    let iter = windows(alphabet, text, window_size);
    let count = iter.len();
    let in_width = window_size * TRITS_PER_CHAR;

    let mut inputs = Array2::zeros((count, in_width));
    let mut targets = Array2::zeros((count, TRITS_PER_CHAR));
    for (row, (input, target)) in iter.enumerate() {
        inputs.row_mut(row).assign(&input);
        targets.row_mut(row).assign(&target);
    }
    (inputs, targets)
}

/// Read a training text file.
pub fn load_text<P: AsRef<Path>>(path: P) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Hold out the trailing `eval_fraction` of samples for evaluation.
///
/// Returns `((train_inputs, train_targets), (eval_inputs, eval_targets))`.
#[allow(clippy::type_complexity)]
pub fn train_eval_split(
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    eval_fraction: f32,
) -> ((Array2<f32>, Array2<f32>), (Array2<f32>, Array2<f32>)) {
    let n = inputs.nrows();
    let eval_count = ((n as f32 * eval_fraction.clamp(0.0, 1.0)).round() as usize).min(n);
    let split = n - eval_count;

    (
        (
            inputs.slice(s![..split, ..]).to_owned(),
            targets.slice(s![..split, ..]).to_owned(),
        ),
        (
            inputs.slice(s![split.., ..]).to_owned(),
            targets.slice(s![split.., ..]).to_owned(),
        ),
    )
}
