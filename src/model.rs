//! Classifier models.
//!
//! A [`Classifier`] maps a [`Batch`] of images to one row of class scores
//! per sample. [`Sequential`] chains boxed [`Layer`]s built from an
//! [`ArchitectureConfig`](crate::architecture::ArchitectureConfig).

use crate::data::{Batch, ImageShape};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::Layer;
use crate::optimizers::Optimizer;

/// What the training loop needs from a model.
pub trait Classifier {
    /// Scores for every sample in `batch`, `batch.len() × n_classes()` values.
    ///
    /// In training mode the activations are kept for [`Classifier::backward`];
    /// in evaluation mode nothing is retained.
    fn forward(&mut self, batch: &Batch) -> Result<Vec<f32>>;

    /// Backpropagates `∂loss/∂scores` from the last training forward pass
    /// and accumulates parameter gradients.
    fn backward(&mut self, grad_scores: &[f32]) -> Result<()>;

    /// Enables dropout and batch-statistics updates.
    fn train_mode(&mut self);

    /// Disables dropout and freezes running statistics.
    fn eval_mode(&mut self);

    fn is_training(&self) -> bool;

    fn zero_grad(&mut self);

    /// One optimizer step over every parameter group.
    fn step(&mut self, optimizer: &mut dyn Optimizer);

    fn input_shape(&self) -> ImageShape;

    fn n_classes(&self) -> usize;

    fn device(&self) -> Device;

    fn parameter_count(&self) -> usize;
}

/// Layers applied in order.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    /// Input shape followed by each layer's output shape
    shapes: Vec<ImageShape>,
    device: Device,
    training: bool,
    /// Input of each layer from the last training forward pass
    activations: Vec<Vec<f32>>,
    batch_size: usize,
}

impl Sequential {
    /// # Panics
    ///
    /// Panics if `shapes` does not hold one more entry than `layers` or a
    /// layer's sizes disagree with its shapes. Use
    /// [`build_model`](crate::architecture::build_model) for validated
    /// construction.
    pub fn new(layers: Vec<Box<dyn Layer>>, shapes: Vec<ImageShape>, device: Device) -> Self {
        assert!(!layers.is_empty(), "model needs at least one layer");
        assert_eq!(shapes.len(), layers.len() + 1, "one shape per layer boundary");
        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.input_size(), shapes[i].len(), "layer {} input size", i);
            assert_eq!(layer.output_size(), shapes[i + 1].len(), "layer {} output size", i);
        }

        Self {
            layers,
            shapes,
            device,
            training: true,
            activations: Vec::new(),
            batch_size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// One line per layer: name, input and output shapes, parameter count.
    pub fn summary(&self) -> Vec<String> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                format!(
                    "{:>2} {:<18} {:>10} -> {:<10} {:>9} params",
                    i,
                    layer.name(),
                    self.shapes[i].to_string(),
                    self.shapes[i + 1].to_string(),
                    layer.parameter_count()
                )
            })
            .collect()
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        if batch.device != self.device {
            return Err(Error::DeviceMismatch {
                batch: batch.device.to_string(),
                model: self.device.to_string(),
            });
        }
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let input = self.shapes[0];
        if batch.shape != input {
            return Err(Error::ShapeMismatch {
                context: "model input",
                expected: input.len(),
                actual: batch.shape.len(),
            });
        }
        if batch.images.len() != batch.len() * input.len() {
            return Err(Error::ShapeMismatch {
                context: "batch images",
                expected: batch.len() * input.len(),
                actual: batch.images.len(),
            });
        }
        Ok(())
    }
}

impl Classifier for Sequential {
    fn forward(&mut self, batch: &Batch) -> Result<Vec<f32>> {
        self.check_batch(batch)?;
        let n = batch.len();
        self.activations.clear();

        let mut current = batch.images.clone();
        for layer in &self.layers {
            let mut output = vec![0.0f32; n * layer.output_size()];
            layer.forward(&current, &mut output, n);
            let input = std::mem::replace(&mut current, output);
            if self.training {
                self.activations.push(input);
            }
        }

        self.batch_size = if self.training { n } else { 0 };
        Ok(current)
    }

    fn backward(&mut self, grad_scores: &[f32]) -> Result<()> {
        if self.activations.len() != self.layers.len() {
            return Err(Error::NoActivations);
        }
        let n = self.batch_size;
        let expected = n * self.n_classes();
        if grad_scores.len() != expected {
            return Err(Error::ShapeMismatch {
                context: "score gradient",
                expected,
                actual: grad_scores.len(),
            });
        }

        let mut grad = grad_scores.to_vec();
        for (layer, input) in self.layers.iter().zip(&self.activations).rev() {
            let mut grad_input = vec![0.0f32; n * layer.input_size()];
            layer.backward(input, &grad, &mut grad_input, n);
            grad = grad_input;
        }
        Ok(())
    }

    fn train_mode(&mut self) {
        self.training = true;
        for layer in &mut self.layers {
            layer.set_training(true);
        }
    }

    fn eval_mode(&mut self) {
        self.training = false;
        self.activations.clear();
        for layer in &mut self.layers {
            layer.set_training(false);
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn zero_grad(&mut self) {
        for layer in &self.layers {
            layer.zero_grad();
        }
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        optimizer.begin_step();
        for layer in &mut self.layers {
            layer.update_with_optimizer(optimizer);
        }
    }

    fn input_shape(&self) -> ImageShape {
        self.shapes[0]
    }

    fn n_classes(&self) -> usize {
        self.shapes[self.shapes.len() - 1].len()
    }

    fn device(&self) -> Device {
        self.device
    }

    fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{DenseLayer, ReluLayer};
    use crate::optimizers::SGD;
    use crate::utils::SimpleRng;

    fn tiny_model() -> Sequential {
        let mut rng = SimpleRng::new(9);
        Sequential::new(
            vec![
                Box::new(DenseLayer::new(4, 3, &mut rng)),
                Box::new(ReluLayer::new(3)),
                Box::new(DenseLayer::new(3, 2, &mut rng)),
            ],
            vec![
                ImageShape::new(1, 2, 2),
                ImageShape::flat(3),
                ImageShape::flat(3),
                ImageShape::flat(2),
            ],
            Device::Cpu,
        )
    }

    fn batch(n: usize) -> Batch {
        Batch {
            images: (0..n * 4).map(|i| i as f32 * 0.1).collect(),
            labels: vec![0; n],
            shape: ImageShape::new(1, 2, 2),
            device: Device::Cpu,
        }
    }

    #[test]
    fn test_forward_shapes() {
        let mut model = tiny_model();
        let scores = model.forward(&batch(5)).unwrap();
        assert_eq!(scores.len(), 10);
        assert_eq!(model.n_classes(), 2);
        assert_eq!(model.parameter_count(), 4 * 3 + 3 + 3 * 2 + 2);
        assert_eq!(model.summary().len(), 3);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let mut model = tiny_model();
        let mut bad = batch(2);
        bad.shape = ImageShape::new(1, 1, 4);
        assert!(matches!(
            model.forward(&bad),
            Err(Error::ShapeMismatch { .. })
        ));

        let mut bad = batch(2);
        bad.images.pop();
        assert!(model.forward(&bad).is_err());
    }

    #[test]
    fn test_backward_requires_training_forward() {
        let mut model = tiny_model();
        assert!(matches!(model.backward(&[0.0; 2]), Err(Error::NoActivations)));

        model.eval_mode();
        model.forward(&batch(1)).unwrap();
        assert!(matches!(model.backward(&[0.0; 2]), Err(Error::NoActivations)));

        model.train_mode();
        model.forward(&batch(1)).unwrap();
        assert!(model.backward(&[0.1, -0.1]).is_ok());
        assert!(model.backward(&[0.1]).is_err());
    }

    #[test]
    fn test_step_moves_scores() {
        let mut model = tiny_model();
        let input = batch(2);
        let before = model.forward(&input).unwrap();

        model.zero_grad();
        model.backward(&[1.0, -1.0, 1.0, -1.0]).unwrap();
        let mut sgd = SGD::new(0.1);
        model.step(&mut sgd);

        let after = model.forward(&input).unwrap();
        assert_ne!(before, after);
    }
}
