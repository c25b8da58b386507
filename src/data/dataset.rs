//! Indexed access to labeled images.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::SimpleRng;

/// Shape of one sample, channels × height × width.
///
/// Dense activations are described as `flat(n)`, i.e. `n × 1 × 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub const fn flat(size: usize) -> Self {
        Self::new(size, 1, 1)
    }

    /// Values per sample.
    pub const fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// One labeled image, CHW order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Vec<f32>,
    pub label: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// A finite, indexed collection of labeled images of one shape.
pub trait Dataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sample at `index`, transformed and ready for the model.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Class names; label `i` is `classes()[i]`.
    fn classes(&self) -> &[String];

    fn image_shape(&self) -> ImageShape;

    fn n_classes(&self) -> usize {
        self.classes().len()
    }
}

/// Default class names `"0"`, `"1"`, ...
pub fn numbered_classes(n_classes: usize) -> Vec<String> {
    (0..n_classes).map(|c| c.to_string()).collect()
}

/// Images already decoded to `f32`, stored back to back.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    images: Vec<f32>,
    labels: Vec<usize>,
    shape: ImageShape,
    classes: Vec<String>,
}

impl InMemoryDataset {
    pub fn new(
        images: Vec<f32>,
        labels: Vec<usize>,
        shape: ImageShape,
        classes: Vec<String>,
    ) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::Dataset("image shape must be non-empty".into()));
        }
        if images.len() != labels.len() * shape.len() {
            return Err(Error::ShapeMismatch {
                context: "dataset images",
                expected: labels.len() * shape.len(),
                actual: images.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= classes.len()) {
            return Err(Error::LabelOutOfRange {
                label,
                n_classes: classes.len(),
            });
        }
        Ok(Self {
            images,
            labels,
            shape,
            classes,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let label = *self.labels.get(index).ok_or_else(|| {
            Error::Dataset(format!("index {} out of range for {} samples", index, self.len()))
        })?;
        let size = self.shape.len();
        Ok(Sample {
            image: self.images[index * size..(index + 1) * size].to_vec(),
            label,
        })
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn image_shape(&self) -> ImageShape {
        self.shape
    }
}

/// Generated, class-balanced data for smoke runs and tests.
///
/// Each class has a fixed random prototype image; a sample is its class
/// prototype plus Gaussian noise. Label `i % n_classes` is assigned to
/// sample `i`, so every class gets `n / n_classes` samples (±1).
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    inner: InMemoryDataset,
}

impl SyntheticDataset {
    pub fn balanced(n: usize, n_classes: usize, shape: ImageShape, seed: u64) -> Result<Self> {
        if n_classes == 0 {
            return Err(Error::Dataset("synthetic dataset needs at least one class".into()));
        }
        let mut rng = SimpleRng::new(seed);
        let size = shape.len();
        let prototypes: Vec<f32> = (0..n_classes * size).map(|_| rng.next_gaussian()).collect();

        let mut images = Vec::with_capacity(n * size);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = i % n_classes;
            let prototype = &prototypes[label * size..(label + 1) * size];
            images.extend(prototype.iter().map(|&p| p + 0.5 * rng.next_gaussian()));
            labels.push(label);
        }

        let inner = InMemoryDataset::new(images, labels, shape, numbered_classes(n_classes))?;
        Ok(Self { inner })
    }

    pub fn labels(&self) -> &[usize] {
        self.inner.labels()
    }
}

impl Dataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.inner.get(index)
    }

    fn classes(&self) -> &[String] {
        self.inner.classes()
    }

    fn image_shape(&self) -> ImageShape {
        self.inner.image_shape()
    }
}
