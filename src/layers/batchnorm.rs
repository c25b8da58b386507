//! Batch normalization layer.
//!
//! Normalizes each channel to zero mean and unit variance using statistics
//! taken over the batch and every spatial position of that channel, then
//! applies a learnable scale (gamma) and shift (beta):
//!
//! 1. μ_c, σ²_c over all `batch × spatial` values of channel `c`
//! 2. x̂ = (x - μ_c) / sqrt(σ²_c + ε)
//! 3. y = γ_c · x̂ + β_c
//!
//! With `spatial = 1` this is the familiar 1-D batch norm over features;
//! with `spatial = H × W` it is the 2-D (per feature map) variant.
//!
//! In training mode the layer uses batch statistics and folds them into
//! running estimates; in evaluation mode it normalizes with the running
//! estimates and leaves them untouched.
//!
//! # References
//!
//! Ioffe, S., & Szegedy, C. (2015). Batch Normalization: Accelerating Deep Network Training
//! by Reducing Internal Covariate Shift. ICML.

use std::cell::RefCell;

use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;
use crate::optimizers::Optimizer;

/// Batch normalization with learnable per-channel scale and shift.
///
/// Running statistics follow `running = momentum · running + (1 - momentum) · batch`;
/// the running variance uses the unbiased batch variance.
///
/// # Example
///
/// ```
/// use convnet_trainer::layers::{BatchNormLayer, Layer};
///
/// // 64 feature maps of 16x16
/// let layer = BatchNormLayer::new(64, 16 * 16, 1e-5, 0.9);
/// assert_eq!(layer.input_size(), 64 * 256);
/// assert_eq!(layer.parameter_count(), 128);
/// ```
pub struct BatchNormLayer {
    channels: usize,
    spatial: usize,
    epsilon: f32,
    momentum: f32,
    training: bool,

    gamma: Vec<f32>,
    beta: Vec<f32>,

    grad_gamma: RefCell<Vec<f32>>,
    grad_beta: RefCell<Vec<f32>>,

    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,

    // Forward-pass cache for backward (training mode only)
    cached_normalized: RefCell<Vec<f32>>,
    cached_inv_std: RefCell<Vec<f32>>,
}

impl BatchNormLayer {
    /// Creates a layer with γ = 1, β = 0, running mean 0 and running variance 1.
    /// Starts in training mode.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon <= 0` or `momentum` is outside `[0, 1]`.
    pub fn new(channels: usize, spatial: usize, epsilon: f32, momentum: f32) -> Self {
        assert!(epsilon > 0.0, "epsilon must be positive");
        assert!(
            (0.0..=1.0).contains(&momentum),
            "momentum must be in range [0.0, 1.0]"
        );

        Self {
            channels,
            spatial,
            epsilon,
            momentum,
            training: true,
            gamma: vec![1.0f32; channels],
            beta: vec![0.0f32; channels],
            grad_gamma: RefCell::new(vec![0.0f32; channels]),
            grad_beta: RefCell::new(vec![0.0f32; channels]),
            running_mean: RefCell::new(vec![0.0f32; channels]),
            running_var: RefCell::new(vec![1.0f32; channels]),
            cached_normalized: RefCell::new(Vec::new()),
            cached_inv_std: RefCell::new(Vec::new()),
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn gamma(&self) -> &[f32] {
        &self.gamma
    }

    pub fn beta(&self) -> &[f32] {
        &self.beta
    }

    pub fn running_mean(&self) -> Vec<f32> {
        self.running_mean.borrow().clone()
    }

    pub fn running_var(&self) -> Vec<f32> {
        self.running_var.borrow().clone()
    }

    #[inline]
    fn index(&self, b: usize, c: usize, s: usize) -> usize {
        (b * self.channels + c) * self.spatial + s
    }
}

impl Layer for BatchNormLayer {
    fn name(&self) -> &'static str {
        "batchnorm"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers(
            "batchnorm",
            input,
            self.input_size(),
            output,
            self.output_size(),
            batch_size,
        );

        if !self.training {
            let running_mean = self.running_mean.borrow();
            let running_var = self.running_var.borrow();
            for b in 0..batch_size {
                for c in 0..self.channels {
                    let inv_std = 1.0 / (running_var[c] + self.epsilon).sqrt();
                    for s in 0..self.spatial {
                        let idx = self.index(b, c, s);
                        output[idx] =
                            self.gamma[c] * (input[idx] - running_mean[c]) * inv_std + self.beta[c];
                    }
                }
            }
            return;
        }

        let count = batch_size * self.spatial;
        let mut normalized = vec![0.0f32; input.len()];
        let mut inv_stds = vec![0.0f32; self.channels];
        let mut running_mean = self.running_mean.borrow_mut();
        let mut running_var = self.running_var.borrow_mut();

        for c in 0..self.channels {
            let mut mean = 0.0f32;
            for b in 0..batch_size {
                for s in 0..self.spatial {
                    mean += input[self.index(b, c, s)];
                }
            }
            mean /= count as f32;

            let mut var = 0.0f32;
            for b in 0..batch_size {
                for s in 0..self.spatial {
                    let diff = input[self.index(b, c, s)] - mean;
                    var += diff * diff;
                }
            }
            let unbiased = if count > 1 {
                var / (count - 1) as f32
            } else {
                var
            };
            var /= count as f32;

            let inv_std = 1.0 / (var + self.epsilon).sqrt();
            inv_stds[c] = inv_std;

            for b in 0..batch_size {
                for s in 0..self.spatial {
                    let idx = self.index(b, c, s);
                    normalized[idx] = (input[idx] - mean) * inv_std;
                    output[idx] = self.gamma[c] * normalized[idx] + self.beta[c];
                }
            }

            running_mean[c] = self.momentum * running_mean[c] + (1.0 - self.momentum) * mean;
            running_var[c] = self.momentum * running_var[c] + (1.0 - self.momentum) * unbiased;
        }

        *self.cached_normalized.borrow_mut() = normalized;
        *self.cached_inv_std.borrow_mut() = inv_stds;
    }

    /// In training mode uses the standard batch-norm gradient
    /// `dx = γ/σ · (dy - mean(dy) - x̂ · mean(dy · x̂))`, per channel.
    fn backward(
        &self,
        _input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers(
            "batchnorm",
            grad_input,
            self.input_size(),
            grad_output,
            self.output_size(),
            batch_size,
        );

        if !self.training {
            let running_var = self.running_var.borrow();
            for b in 0..batch_size {
                for c in 0..self.channels {
                    let scale = self.gamma[c] / (running_var[c] + self.epsilon).sqrt();
                    for s in 0..self.spatial {
                        let idx = self.index(b, c, s);
                        grad_input[idx] = grad_output[idx] * scale;
                    }
                }
            }
            return;
        }

        let normalized = self.cached_normalized.borrow();
        let inv_stds = self.cached_inv_std.borrow();
        assert_eq!(
            normalized.len(),
            grad_output.len(),
            "batchnorm backward called without a matching training forward pass"
        );

        let mut grad_gamma = self.grad_gamma.borrow_mut();
        let mut grad_beta = self.grad_beta.borrow_mut();
        let count = (batch_size * self.spatial) as f32;

        for c in 0..self.channels {
            let mut sum_dy = 0.0f32;
            let mut sum_dy_xhat = 0.0f32;
            for b in 0..batch_size {
                for s in 0..self.spatial {
                    let idx = self.index(b, c, s);
                    sum_dy += grad_output[idx];
                    sum_dy_xhat += grad_output[idx] * normalized[idx];
                }
            }
            grad_beta[c] += sum_dy;
            grad_gamma[c] += sum_dy_xhat;

            let mean_dy = sum_dy / count;
            let mean_dy_xhat = sum_dy_xhat / count;
            let scale = self.gamma[c] * inv_stds[c];
            for b in 0..batch_size {
                for s in 0..self.spatial {
                    let idx = self.index(b, c, s);
                    grad_input[idx] =
                        scale * (grad_output[idx] - mean_dy - normalized[idx] * mean_dy_xhat);
                }
            }
        }
    }

    fn update_with_optimizer(&mut self, optimizer: &mut dyn Optimizer) {
        optimizer.update(&mut self.gamma, &self.grad_gamma.borrow());
        optimizer.update(&mut self.beta, &self.grad_beta.borrow());
    }

    fn zero_grad(&self) {
        self.grad_gamma.borrow_mut().fill(0.0);
        self.grad_beta.borrow_mut().fill(0.0);
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn parameter_count(&self) -> usize {
        2 * self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_training_output_is_normalized_per_channel() {
        let layer = BatchNormLayer::new(2, 2, 1e-5, 0.9);
        // batch of 2, channel 0 values {1,2,3,4}, channel 1 values {10,10,30,30}
        let input = vec![1.0, 2.0, 10.0, 10.0, 3.0, 4.0, 30.0, 30.0];
        let mut output = vec![0.0; 8];
        layer.forward(&input, &mut output, 2);

        for c in 0..2 {
            let values: Vec<f32> = (0..2)
                .flat_map(|b| (0..2).map(move |s| (b, s)))
                .map(|(b, s)| output[(b * 2 + c) * 2 + s])
                .collect();
            let mean = values.iter().sum::<f32>() / 4.0;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
            assert_relative_eq!(var, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_running_stats_update_only_in_training() {
        let mut layer = BatchNormLayer::new(1, 1, 1e-5, 0.5);
        let input = vec![2.0, 4.0];
        let mut output = vec![0.0; 2];

        layer.forward(&input, &mut output, 2);
        // mean 3, unbiased var 2
        assert_relative_eq!(layer.running_mean()[0], 1.5);
        assert_relative_eq!(layer.running_var()[0], 1.5);

        layer.set_training(false);
        layer.forward(&input, &mut output, 2);
        assert_relative_eq!(layer.running_mean()[0], 1.5);

        let inv_std = 1.0 / (1.5f32 + 1e-5).sqrt();
        assert_relative_eq!(output[0], (2.0 - 1.5) * inv_std, epsilon = 1e-6);
    }

    #[test]
    fn test_backward_gradient_sums_to_zero_per_channel() {
        let layer = BatchNormLayer::new(1, 3, 1e-5, 0.9);
        let input = vec![0.5, -1.0, 2.0, 1.5, 0.0, -0.5];
        let mut output = vec![0.0; 6];
        layer.forward(&input, &mut output, 2);

        let grad_output = vec![0.3, -0.1, 0.7, 0.2, 0.0, -0.4];
        let mut grad_input = vec![0.0; 6];
        layer.backward(&input, &grad_output, &mut grad_input, 2);

        // Shifting every input by a constant leaves the output unchanged.
        let sum: f32 = grad_input.iter().sum();
        assert_relative_eq!(sum, 0.0, epsilon = 1e-5);
        assert_relative_eq!(layer.grad_beta.borrow()[0], 0.7, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "epsilon must be positive")]
    fn test_invalid_epsilon() {
        BatchNormLayer::new(4, 1, 0.0, 0.9);
    }
}
