//! Classification accuracy.
//!
//! Ties between equal top scores go to the lowest class index, and a NaN
//! score never beats a number, so reported accuracy is reproducible.

use crate::error::{Error, Result};

/// Index of the highest score. Lowest index wins ties; NaN is skipped.
///
/// Returns 0 for an empty slice or a row with no comparable score.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = f32::NEG_INFINITY;
    let mut index = 0;
    for (i, &v) in scores.iter().enumerate() {
        if v > best {
            best = v;
            index = i;
        }
    }
    index
}

fn check_rows(outputs: &[f32], labels: &[usize], n_classes: usize) -> Result<()> {
    if labels.is_empty() {
        return Err(Error::EmptyBatch);
    }
    if n_classes == 0 || outputs.len() != labels.len() * n_classes {
        return Err(Error::LengthMismatch {
            outputs: if n_classes == 0 { 0 } else { outputs.len() / n_classes },
            labels: labels.len(),
        });
    }
    Ok(())
}

/// Fraction of rows in `outputs` whose top class equals the label.
///
/// `outputs` holds `labels.len()` rows of `n_classes` scores. A row count
/// that differs from the label count is an error rather than a truncation.
///
/// # Examples
///
/// ```
/// use convnet_trainer::metrics::accuracy;
///
/// let outputs = [0.9, 0.1, 0.2, 0.8];
/// assert_eq!(accuracy(&outputs, &[0, 1], 2).unwrap(), 1.0);
/// assert_eq!(accuracy(&outputs, &[1, 0], 2).unwrap(), 0.0);
/// ```
pub fn accuracy(outputs: &[f32], labels: &[usize], n_classes: usize) -> Result<f32> {
    check_rows(outputs, labels, n_classes)?;
    let correct = outputs
        .chunks_exact(n_classes)
        .zip(labels)
        .filter(|(row, label)| argmax(row) == **label)
        .count();
    Ok(correct as f32 / labels.len() as f32)
}

/// Per-class hit counts accumulated over many batches.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionCounts {
    correct: Vec<usize>,
    total: Vec<usize>,
}

impl ConfusionCounts {
    pub fn new(n_classes: usize) -> Self {
        Self {
            correct: vec![0; n_classes],
            total: vec![0; n_classes],
        }
    }

    pub fn n_classes(&self) -> usize {
        self.total.len()
    }

    /// Tallies one batch of scores against its labels.
    pub fn record(&mut self, outputs: &[f32], labels: &[usize]) -> Result<()> {
        let n_classes = self.n_classes();
        check_rows(outputs, labels, n_classes)?;
        if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(Error::LabelOutOfRange { label, n_classes });
        }
        for (row, &label) in outputs.chunks_exact(n_classes).zip(labels) {
            self.total[label] += 1;
            if argmax(row) == label {
                self.correct[label] += 1;
            }
        }
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.total.iter().sum()
    }

    /// Overall accuracy, `None` before anything was recorded.
    pub fn accuracy(&self) -> Option<f32> {
        let samples = self.samples();
        (samples > 0).then(|| self.correct.iter().sum::<usize>() as f32 / samples as f32)
    }

    /// Accuracy per true class; `None` for classes with no samples.
    pub fn per_class(&self) -> Vec<Option<f32>> {
        self.correct
            .iter()
            .zip(&self.total)
            .map(|(&c, &t)| (t > 0).then(|| c as f32 / t as f32))
            .collect()
    }
}
