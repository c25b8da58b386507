//! Spatial pooling layers over CHW samples.

use std::cell::RefCell;

use crate::layers::conv2d::conv_output_dim;
use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;

/// Max pooling with a square window.
///
/// The forward pass records, for every output element, the flat input index
/// that won so the backward pass can route the gradient to it. Ties go to
/// the first position in row-major window order.
pub struct MaxPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    kernel_size: usize,
    stride: usize,
    argmax: RefCell<Vec<usize>>,
}

impl MaxPool2DLayer {
    pub fn new(
        channels: usize,
        input_height: usize,
        input_width: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self {
            channels,
            input_height,
            input_width,
            kernel_size,
            stride,
            argmax: RefCell::new(Vec::new()),
        }
    }

    pub fn output_height(&self) -> usize {
        conv_output_dim(self.input_height, self.kernel_size, 0, self.stride).unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        conv_output_dim(self.input_width, self.kernel_size, 0, self.stride).unwrap_or(0)
    }
}

impl Layer for MaxPool2DLayer {
    fn name(&self) -> &'static str {
        "maxpool2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers(
            "maxpool2d",
            input,
            self.input_size(),
            output,
            self.output_size(),
            batch_size,
        );
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let in_plane = self.input_height * self.input_width;

        let mut argmax = self.argmax.borrow_mut();
        argmax.clear();
        argmax.resize(output.len(), 0);

        for plane in 0..batch_size * self.channels {
            let in_base = plane * in_plane;
            let out_base = plane * out_h * out_w;

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = in_base + oy * self.stride * self.input_width + ox * self.stride;

                    for ky in 0..self.kernel_size {
                        let row = in_base + (oy * self.stride + ky) * self.input_width;
                        for kx in 0..self.kernel_size {
                            let idx = row + ox * self.stride + kx;
                            if input[idx] > best {
                                best = input[idx];
                                best_idx = idx;
                            }
                        }
                    }

                    let o = out_base + oy * out_w + ox;
                    output[o] = best;
                    argmax[o] = best_idx;
                }
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers(
            "maxpool2d",
            grad_input,
            self.input_size(),
            grad_output,
            self.output_size(),
            batch_size,
        );
        let argmax = self.argmax.borrow();
        assert_eq!(
            argmax.len(),
            grad_output.len(),
            "maxpool2d backward called without a matching forward pass"
        );

        grad_input.fill(0.0);
        for (&src, &g) in argmax.iter().zip(grad_output) {
            grad_input[src] += g;
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height() * self.output_width()
    }
}

/// Adaptive average pooling to a fixed `output_height × output_width` grid.
///
/// Output cell `i` along an axis of length `n` mapped to `m` cells averages
/// input positions `floor(i·n/m) .. ceil((i+1)·n/m)`, so neighbouring bins
/// may overlap when `n` is not a multiple of `m` (e.g. 8 → 6).
pub struct AdaptiveAvgPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    output_height: usize,
    output_width: usize,
}

fn bin(i: usize, input: usize, output: usize) -> (usize, usize) {
    let start = i * input / output;
    let end = ((i + 1) * input).div_ceil(output);
    (start, end)
}

impl AdaptiveAvgPool2DLayer {
    pub fn new(
        channels: usize,
        input_height: usize,
        input_width: usize,
        output_height: usize,
        output_width: usize,
    ) -> Self {
        Self {
            channels,
            input_height,
            input_width,
            output_height,
            output_width,
        }
    }
}

impl Layer for AdaptiveAvgPool2DLayer {
    fn name(&self) -> &'static str {
        "adaptive_avgpool2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers(
            "adaptive_avgpool2d",
            input,
            self.input_size(),
            output,
            self.output_size(),
            batch_size,
        );
        let in_plane = self.input_height * self.input_width;
        let out_plane = self.output_height * self.output_width;

        for plane in 0..batch_size * self.channels {
            let src = &input[plane * in_plane..(plane + 1) * in_plane];
            for oy in 0..self.output_height {
                let (y0, y1) = bin(oy, self.input_height, self.output_height);
                for ox in 0..self.output_width {
                    let (x0, x1) = bin(ox, self.input_width, self.output_width);
                    let mut sum = 0.0f32;
                    for y in y0..y1 {
                        sum += src[y * self.input_width + x0..y * self.input_width + x1]
                            .iter()
                            .sum::<f32>();
                    }
                    let count = ((y1 - y0) * (x1 - x0)) as f32;
                    output[plane * out_plane + oy * self.output_width + ox] = sum / count;
                }
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers(
            "adaptive_avgpool2d",
            grad_input,
            self.input_size(),
            grad_output,
            self.output_size(),
            batch_size,
        );
        let in_plane = self.input_height * self.input_width;
        let out_plane = self.output_height * self.output_width;

        grad_input.fill(0.0);
        for plane in 0..batch_size * self.channels {
            let dst = &mut grad_input[plane * in_plane..(plane + 1) * in_plane];
            for oy in 0..self.output_height {
                let (y0, y1) = bin(oy, self.input_height, self.output_height);
                for ox in 0..self.output_width {
                    let (x0, x1) = bin(ox, self.input_width, self.output_width);
                    let g = grad_output[plane * out_plane + oy * self.output_width + ox];
                    let share = g / ((y1 - y0) * (x1 - x0)) as f32;
                    for y in y0..y1 {
                        for v in &mut dst[y * self.input_width + x0..y * self.input_width + x1] {
                            *v += share;
                        }
                    }
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height * self.output_width
    }
}
