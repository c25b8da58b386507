//! ReLU as a standalone layer so it can appear in a declarative layer list.

use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;
use crate::utils::activations::relu_inplace;

pub struct ReluLayer {
    size: usize,
}

impl ReluLayer {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Layer for ReluLayer {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers("relu", input, self.size, output, self.size, batch_size);
        output.copy_from_slice(input);
        relu_inplace(output);
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers("relu", grad_input, self.size, grad_output, self.size, batch_size);
        for ((dx, &g), &x) in grad_input.iter_mut().zip(grad_output).zip(input) {
            *dx = if x > 0.0 { g } else { 0.0 };
        }
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }
}
