//! Dense (fully connected) layer: `output = input × weights + biases`.

use std::cell::RefCell;

use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;
use crate::optimizers::Optimizer;
use crate::utils::SimpleRng;

/// Fully connected layer.
///
/// `weights` is stored row-major as `input_size × output_size`.
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl DenseLayer {
    /// Create a layer with Xavier/Glorot uniform weights and zero biases.
    ///
    /// `limit = sqrt(6 / (input_size + output_size))`
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Self {
            input_size,
            output_size,
            weights,
            biases: vec![0.0f32; output_size],
            grad_weights: RefCell::new(vec![0.0f32; input_size * output_size]),
            grad_biases: RefCell::new(vec![0.0f32; output_size]),
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn grad_weights(&self) -> Vec<f32> {
        self.grad_weights.borrow().clone()
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers(
            "dense",
            input,
            self.input_size,
            output,
            self.output_size,
            batch_size,
        );

        for (x, y) in input
            .chunks_exact(self.input_size)
            .zip(output.chunks_exact_mut(self.output_size))
        {
            y.copy_from_slice(&self.biases);
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let row = &self.weights[i * self.output_size..(i + 1) * self.output_size];
                for (yj, &w) in y.iter_mut().zip(row) {
                    *yj += xi * w;
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
            "dense",
            grad_input,
            self.input_size,
            grad_output,
            self.output_size,
            batch_size,
        );
        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for b in 0..batch_size {
            let x = &input[b * self.input_size..(b + 1) * self.input_size];
            let g = &grad_output[b * self.output_size..(b + 1) * self.output_size];
            let dx = &mut grad_input[b * self.input_size..(b + 1) * self.input_size];

            for (gb, &gj) in grad_b.iter_mut().zip(g) {
                *gb += gj;
            }
            for i in 0..self.input_size {
                let row = i * self.output_size;
                let mut acc = 0.0f32;
                for j in 0..self.output_size {
                    grad_w[row + j] += x[i] * g[j];
                    acc += g[j] * self.weights[row + j];
                }
                dx[i] = acc;
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
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
