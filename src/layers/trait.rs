//! Layer trait definition.

use crate::optimizers::Optimizer;

/// Core trait for network layers.
///
/// Layers work on flat `f32` buffers holding `batch_size` samples back to
/// back; image-shaped activations are stored per sample in CHW order.
/// `forward` and `backward` take `&self` and keep their caches (pooling
/// argmax, batch statistics, dropout masks) and gradient accumulators behind
/// `RefCell`, so a model can run a forward pass without exclusive access.
///
/// Gradient handling follows the zero/accumulate/step cycle:
/// [`Layer::zero_grad`] clears the accumulators, [`Layer::backward`] adds to
/// them, and [`Layer::update_with_optimizer`] consumes them without clearing.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; batch_size * layer.output_size()];
/// layer.forward(&input, &mut output, batch_size);
///
/// let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
/// layer.backward(&input, &grad_output, &mut grad_input, batch_size);
/// layer.update_with_optimizer(&mut optimizer);
/// ```
pub trait Layer {
    /// Short lowercase name used in shape reports.
    fn name(&self) -> &'static str;

    /// Forward propagation.
    ///
    /// # Panics
    ///
    /// Panics if `input` is not `batch_size × input_size()` long or `output`
    /// is not `batch_size × output_size()` long. Callers validate shapes at
    /// the model boundary.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Backward propagation.
    ///
    /// Overwrites `grad_input` with ∂L/∂input and accumulates parameter
    /// gradients internally. `input` must be the buffer passed to the
    /// matching `forward` call.
    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Apply one optimizer update to every parameter group of the layer.
    ///
    /// Groups are visited in a fixed order (weights before biases).
    fn update_with_optimizer(&mut self, _optimizer: &mut dyn Optimizer) {}

    /// Reset accumulated parameter gradients to zero.
    fn zero_grad(&self) {}

    /// Switch between training (stochastic regularization, running-statistics
    /// updates) and evaluation behavior.
    fn set_training(&mut self, _training: bool) {}

    /// Values per sample consumed.
    fn input_size(&self) -> usize;

    /// Values per sample produced.
    fn output_size(&self) -> usize;

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize {
        0
    }
}

pub(crate) fn check_buffers(
    layer: &'static str,
    input: &[f32],
    input_size: usize,
    output: &[f32],
    output_size: usize,
    batch_size: usize,
) {
    assert_eq!(
        input.len(),
        batch_size * input_size,
        "{} input len mismatch: expected {}, got {}",
        layer,
        batch_size * input_size,
        input.len()
    );
    assert_eq!(
        output.len(),
        batch_size * output_size,
        "{} output len mismatch: expected {}, got {}",
        layer,
        batch_size * output_size,
        output.len()
    );
}
