//! Dropout layer for regularization.
//!
//! During training each unit is zeroed with probability `drop_rate` and the
//! survivors are scaled by `1 / (1 - drop_rate)` so the expected activation
//! is unchanged (inverted dropout). In evaluation mode the layer is the
//! identity.

use std::cell::RefCell;

use crate::layers::r#trait::check_buffers;
use crate::layers::Layer;
use crate::utils::SimpleRng;

/// Dropout with a private RNG stream forked from the model's RNG.
///
/// # Example
///
/// ```
/// use convnet_trainer::layers::{DropoutLayer, Layer};
/// use convnet_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DropoutLayer::new(512, 0.5, &mut rng);
/// assert_eq!(layer.parameter_count(), 0);
/// ```
pub struct DropoutLayer {
    size: usize,
    drop_rate: f32,
    training: bool,
    /// 0.0 for dropped units, the keep-scale for kept units
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// # Panics
    ///
    /// Panics unless `drop_rate` is in `[0.0, 1.0)`.
    pub fn new(size: usize, drop_rate: f32, rng: &mut SimpleRng) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_rate),
            "drop_rate must be in range [0.0, 1.0)"
        );

        Self {
            size,
            drop_rate,
            training: true,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(rng.fork()),
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        check_buffers("dropout", input, self.size, output, self.size, batch_size);

        if !self.training || self.drop_rate == 0.0 {
            output.copy_from_slice(input);
            self.mask.borrow_mut().clear();
            return;
        }

        let scale = 1.0 / (1.0 - self.drop_rate);
        let mut mask = self.mask.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        mask.resize(input.len(), 0.0);

        for ((m, y), &x) in mask.iter_mut().zip(output.iter_mut()).zip(input) {
            *m = if rng.next_f32() >= self.drop_rate {
                scale
            } else {
                0.0
            };
            *y = x * *m;
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        check_buffers("dropout", grad_input, self.size, grad_output, self.size, batch_size);

        let mask = self.mask.borrow();
        if mask.is_empty() {
            grad_input.copy_from_slice(grad_output);
            return;
        }
        for ((dx, &g), &m) in grad_input.iter_mut().zip(grad_output).zip(mask.iter()) {
            *dx = g * m;
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }
}
