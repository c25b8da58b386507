//! Pixel transforms applied when a sample is read.

use crate::data::ImageShape;
use crate::error::{Error, Result};

/// Scales 8-bit pixels into `[0, 1]`.
pub fn to_tensor(pixels: &[u8]) -> Vec<f32> {
    pixels.iter().map(|&p| p as f32 / 255.0).collect()
}

/// Per-channel `(x - mean) / std`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(Error::Dataset(format!(
                "normalize got {} means and {} stds",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::Dataset("normalize std must be positive".into()));
        }
        Ok(Self { mean, std })
    }

    /// Mean and std of 0.5 on every channel, mapping `[0, 1]` to `[-1, 1]`.
    pub fn symmetric(channels: usize) -> Self {
        Self {
            mean: vec![0.5; channels],
            std: vec![0.5; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    pub fn apply(&self, image: &mut [f32], shape: ImageShape) -> Result<()> {
        if shape.channels != self.channels() || image.len() != shape.len() {
            return Err(Error::ShapeMismatch {
                context: "normalize",
                expected: self.channels() * shape.height * shape.width,
                actual: image.len(),
            });
        }
        let plane = shape.height * shape.width;
        for ((values, &mean), &std) in image.chunks_exact_mut(plane).zip(&self.mean).zip(&self.std)
        {
            for v in values {
                *v = (*v - mean) / std;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_symmetric_normalize_range() {
        let shape = ImageShape::new(1, 1, 3);
        let mut image = to_tensor(&[0, 255, 51]);
        Normalize::symmetric(1).apply(&mut image, shape).unwrap();
        assert_relative_eq!(image[0], -1.0);
        assert_relative_eq!(image[1], 1.0);
        assert_relative_eq!(image[2], -0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_per_channel_values() {
        let shape = ImageShape::new(2, 1, 1);
        let norm = Normalize::new(vec![0.0, 1.0], vec![2.0, 0.5]).unwrap();
        let mut image = vec![1.0, 2.0];
        norm.apply(&mut image, shape).unwrap();
        assert_eq!(image, vec![0.5, 2.0]);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(Normalize::new(vec![0.0], vec![0.0]).is_err());
        assert!(Normalize::new(vec![0.0, 0.0], vec![1.0]).is_err());
        let mut image = vec![0.0; 4];
        assert!(Normalize::symmetric(3)
            .apply(&mut image, ImageShape::new(1, 2, 2))
            .is_err());
    }
}
