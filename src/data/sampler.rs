//! Train/validation split and mini-batch iteration.

use crate::data::{Dataset, ImageShape};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::utils::SimpleRng;

/// Partitions `0..n` into `(train, validation)`.
///
/// The indices are shuffled once and the first `floor(n * validation_fraction)`
/// become the validation subset; the rest are the training subset. The two
/// are disjoint and together cover every index.
pub fn split_indices(
    n: usize,
    validation_fraction: f32,
    rng: &mut SimpleRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&validation_fraction) {
        return Err(Error::InvalidConfig(format!(
            "validation_fraction must be in [0, 1), got {}",
            validation_fraction
        )));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    rng.shuffle_usize(&mut indices);

    let split = (n as f64 * validation_fraction as f64).floor() as usize;
    let train = indices.split_off(split);
    Ok((train, indices))
}

/// Number of batches needed to cover `samples` (the last may be short).
pub fn batch_count(samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        samples.div_ceil(batch_size)
    }
}

/// A group of samples materialized contiguously for one step.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `len() × shape.len()` values, CHW per sample
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    pub shape: ImageShape,
    /// Device the batch was prepared for
    pub device: Device,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One pass over `indices` in order, `batch_size` samples at a time.
///
/// Finite and not restartable; create a new iterator for the next pass.
/// After a read error the iterator yields the error once and then ends.
pub struct BatchIter<'a, D: Dataset + ?Sized> {
    dataset: &'a D,
    indices: &'a [usize],
    batch_size: usize,
    device: Device,
    position: usize,
}

impl<'a, D: Dataset + ?Sized> BatchIter<'a, D> {
    pub fn new(dataset: &'a D, indices: &'a [usize], batch_size: usize, device: Device) -> Self {
        assert!(batch_size > 0, "batch_size must be greater than 0");
        Self {
            dataset,
            indices,
            batch_size,
            device,
            position: 0,
        }
    }

    fn gather(&self, chunk: &[usize]) -> Result<Batch> {
        let shape = self.dataset.image_shape();
        let mut images = Vec::with_capacity(chunk.len() * shape.len());
        let mut labels = Vec::with_capacity(chunk.len());

        for &index in chunk {
            let sample = self.dataset.get(index)?;
            if sample.image.len() != shape.len() {
                return Err(Error::ShapeMismatch {
                    context: "dataset sample",
                    expected: shape.len(),
                    actual: sample.image.len(),
                });
            }
            images.extend_from_slice(&sample.image);
            labels.push(sample.label);
        }

        Ok(Batch {
            images,
            labels,
            shape,
            device: self.device,
        })
    }
}

impl<D: Dataset + ?Sized> Iterator for BatchIter<'_, D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.position..end];
        let batch = self.gather(chunk);
        self.position = if batch.is_ok() { end } else { self.indices.len() };
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = batch_count(self.indices.len() - self.position, self.batch_size);
        (remaining, Some(remaining))
    }
}
