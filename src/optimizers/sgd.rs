//! Stochastic Gradient Descent optimizer.

use crate::optimizers::Optimizer;

/// Vanilla SGD with optional L2 weight decay.
///
/// `w = w - η * (∇L/∂w + λ * w)`
///
/// Stateless, so the order in which parameter groups are visited does not
/// matter.
pub struct SGD {
    learning_rate: f32,
    weight_decay: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            weight_decay: 0.0,
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for SGD {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * (grad + self.weight_decay * *param);
        }
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
