//! 2D convolution layer.
//!
//! Direct (loop-based) convolution over CHW samples with symmetric zero
//! padding and a square kernel. No im2col, no BLAS.

use std::cell::RefCell;

use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;
use crate::optimizers::Optimizer;
use crate::utils::SimpleRng;

/// 2D convolutional layer with learnable filters.
///
/// `weights` is laid out `out_channels × in_channels × kernel_size × kernel_size`.
///
/// # Example
///
/// ```
/// use convnet_trainer::layers::{Conv2DLayer, Layer};
/// use convnet_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 3 input channels, 16 filters, 3x3 kernel, padding 1, stride 1, 32x32 input
/// let layer = Conv2DLayer::new(3, 16, 3, 1, 1, 32, 32, &mut rng);
/// assert_eq!(layer.output_size(), 16 * 32 * 32);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

/// Spatial output extent of a convolution or pooling window.
pub fn conv_output_dim(input: usize, kernel: usize, padding: usize, stride: usize) -> Option<usize> {
    let padded = input + 2 * padding;
    if stride == 0 || kernel == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

impl Conv2DLayer {
    /// Create a layer with Xavier initialization adapted to convolutions
    /// (`fan_in = in_channels × k²`, `fan_out = out_channels × k²`) and zero
    /// biases.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let weights = (0..weight_count)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            weights,
            biases: vec![0.0f32; out_channels],
            grad_weights: RefCell::new(vec![0.0f32; weight_count]),
            grad_biases: RefCell::new(vec![0.0f32; out_channels]),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn output_height(&self) -> usize {
        conv_output_dim(self.input_height, self.kernel_size, self.padding, self.stride)
            .unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        conv_output_dim(self.input_width, self.kernel_size, self.padding, self.stride)
            .unwrap_or(0)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    pub fn grad_weights(&self) -> Vec<f32> {
        self.grad_weights.borrow().clone()
    }

    /// Input coordinate for output position `o` and kernel offset `k`, or
    /// `None` when it falls in the zero padding.
    #[inline]
    fn source(&self, o: usize, k: usize, extent: usize) -> Option<usize> {
        let pos = (o * self.stride + k) as isize - self.padding as isize;
        if pos >= 0 && (pos as usize) < extent {
            Some(pos as usize)
        } else {
            None
        }
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers(
            "conv2d",
            input,
            self.input_size(),
            output,
            self.output_size(),
            batch_size,
        );
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;

        for b in 0..batch_size {
            let in_base = b * self.in_channels * in_spatial;
            let out_base_b = b * self.out_channels * out_spatial;

            for oc in 0..self.out_channels {
                let out_base = out_base_b + oc * out_spatial;
                output[out_base..out_base + out_spatial].fill(self.biases[oc]);

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * k * k;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ky in 0..k {
                            let Some(iy) = self.source(oy, ky, self.input_height) else {
                                continue;
                            };
                            let in_row = in_base_c + iy * self.input_width;
                            for ox in 0..out_w {
                                let mut sum = 0.0f32;
                                for kx in 0..k {
                                    if let Some(ix) = self.source(ox, kx, self.input_width) {
                                        sum += input[in_row + ix] * self.weights[w_base + ky * k + kx];
                                    }
                                }
                                output[out_base + oy * out_w + ox] += sum;
                            }
                        }
                    }
                }
            }
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers(
            "conv2d",
            grad_input,
            self.input_size(),
            grad_output,
            self.output_size(),
            batch_size,
        );
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        grad_input.fill(0.0);

        for b in 0..batch_size {
            let in_base = b * self.in_channels * in_spatial;
            let g_base_b = b * self.out_channels * out_spatial;

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;
                let g_plane = &grad_output[g_base..g_base + out_spatial];

                grad_b[oc] += g_plane.iter().sum::<f32>();

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * k * k;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ky in 0..k {
                            let Some(iy) = self.source(oy, ky, self.input_height) else {
                                continue;
                            };
                            let in_row = in_base_c + iy * self.input_width;
                            for ox in 0..out_w {
                                let g = g_plane[oy * out_w + ox];
                                if g == 0.0 {
                                    continue;
                                }
                                for kx in 0..k {
                                    if let Some(ix) = self.source(ox, kx, self.input_width) {
                                        let w_idx = w_base + ky * k + kx;
                                        grad_w[w_idx] += g * input[in_row + ix];
                                        grad_input[in_row + ix] += g * self.weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn update_with_optimizer(&mut self, optimizer: &mut dyn Optimizer) {
        optimizer.update(&mut self.weights, &self.grad_weights.borrow());
        optimizer.update(&mut self.biases, &self.grad_biases.borrow());
    }

    fn zero_grad(&self) {
        self.grad_weights.borrow_mut().fill(0.0);
        self.grad_biases.borrow_mut().fill(0.0);
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, &mut rng);
        // 8 * 1 * 3 * 3 weights + 8 biases
        assert_eq!(layer.parameter_count(), 80);
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let mut rng = SimpleRng::new(42);
        let same = Conv2DLayer::new(1, 8, 3, 1, 1, 28, 28, &mut rng);
        assert_eq!((same.output_height(), same.output_width()), (28, 28));

        let valid = Conv2DLayer::new(1, 8, 3, 0, 1, 28, 28, &mut rng);
        assert_eq!((valid.output_height(), valid.output_width()), (26, 26));

        let strided = Conv2DLayer::new(1, 8, 3, 1, 2, 32, 32, &mut rng);
        assert_eq!((strided.output_height(), strided.output_width()), (16, 16));
    }

    #[test]
    fn test_conv_output_dim_rejects_oversized_kernel() {
        assert_eq!(conv_output_dim(2, 5, 0, 1), None);
        assert_eq!(conv_output_dim(2, 5, 2, 1), Some(2));
    }

    #[test]
    fn test_conv2d_forward_identity_kernel() {
        let mut rng = SimpleRng::new(3);
        let mut layer = Conv2DLayer::new(1, 1, 3, 1, 1, 3, 3, &mut rng);
        layer.weights_mut().fill(0.0);
        layer.weights_mut()[4] = 1.0; // centre tap

        let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut output = vec![0.0; 9];
        layer.forward(&input, &mut output, 1);

        assert_eq!(output, input);
    }

    #[test]
    fn test_conv2d_forward_sums_with_padding() {
        let mut rng = SimpleRng::new(3);
        let mut layer = Conv2DLayer::new(1, 1, 3, 1, 1, 2, 2, &mut rng);
        layer.weights_mut().fill(1.0);

        // Every 3x3 window over a padded 2x2 covers all four inputs.
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = vec![0.0; 4];
        layer.forward(&input, &mut output, 1);

        assert_eq!(output, vec![10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_conv2d_backward_bias_gradient_is_spatial_sum() {
        let mut rng = SimpleRng::new(5);
        let layer = Conv2DLayer::new(1, 2, 3, 1, 1, 4, 4, &mut rng);
        let input = vec![0.5; 16];
        let grad_output = vec![1.0; 2 * 16];
        let mut grad_input = vec![0.0; 16];

        layer.backward(&input, &grad_output, &mut grad_input, 1);

        assert_eq!(*layer.grad_biases.borrow(), vec![16.0, 16.0]);
    }

    #[test]
    fn test_conv2d_deterministic_initialization() {
        let mut rng1 = SimpleRng::new(12345);
        let layer1 = Conv2DLayer::new(3, 16, 5, 2, 1, 32, 32, &mut rng1);

        let mut rng2 = SimpleRng::new(12345);
        let layer2 = Conv2DLayer::new(3, 16, 5, 2, 1, 32, 32, &mut rng2);

        assert_eq!(layer1.weights, layer2.weights);
    }
}
