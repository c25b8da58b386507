//! Softmax cross-entropy on raw class scores.

use crate::error::{Error, Result};
use crate::utils::activations::softmax_rows;

/// Mean softmax cross-entropy over a batch, with its gradient.
///
/// `logits` holds one row of `n_classes` scores per label. Returns the mean
/// loss and `∂loss/∂logits = (softmax(logits) - onehot(label)) / batch`, so
/// layers receive a gradient that is already averaged over the batch.
///
/// The loss is computed in log-sum-exp form and is not clamped; an overflow
/// in the scores shows up as a non-finite loss for the caller to reject.
pub fn cross_entropy(logits: &[f32], labels: &[usize], n_classes: usize) -> Result<(f32, Vec<f32>)> {
    if labels.is_empty() {
        return Err(Error::EmptyBatch);
    }
    if n_classes == 0 || logits.len() != labels.len() * n_classes {
        return Err(Error::LengthMismatch {
            outputs: if n_classes == 0 { 0 } else { logits.len() / n_classes },
            labels: labels.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(Error::LabelOutOfRange { label, n_classes });
    }

    let batch = labels.len();
    let mut total = 0.0f32;
    for (row, &label) in logits.chunks_exact(n_classes).zip(labels) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let sum: f32 = row.iter().map(|&z| (z - max).exp()).sum();
        total += max + sum.ln() - row[label];
    }

    let mut grad = logits.to_vec();
    softmax_rows(&mut grad, batch, n_classes);
    let scale = 1.0 / batch as f32;
    for (row, &label) in grad.chunks_exact_mut(n_classes).zip(labels) {
        row[label] -= 1.0;
        for g in row.iter_mut() {
            *g *= scale;
        }
    }

    Ok((total / batch as f32, grad))
}
