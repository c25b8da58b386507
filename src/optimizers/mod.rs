//! Optimizer abstractions for parameter updates.
//!
//! A model exposes its parameters to an optimizer one group at a time (a
//! layer's weights, then its biases, and so on). One optimizer step is:
//!
//! ```ignore
//! optimizer.begin_step();
//! for (params, grads) in model_groups {
//!     optimizer.update(params, grads);
//! }
//! ```
//!
//! Stateful optimizers such as Adam key their per-parameter state on the
//! position of the group within the step, so groups must be visited in the
//! same order on every step. `Sequential::step` guarantees this.

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::config::{OptimizerKind, TrainingConfig};

/// Core trait for optimizers.
pub trait Optimizer {
    /// Start a new optimization step.
    ///
    /// Advances the time step and rewinds the parameter-group cursor.
    /// Stateless optimizers can ignore it.
    fn begin_step(&mut self) {}

    /// Apply the update rule to one parameter group in-place.
    ///
    /// # Panics
    ///
    /// Implementations panic if `parameters` and `gradients` differ in length.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Clear accumulated state (moments, time step).
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

/// Builds the optimizer named in the training configuration.
pub fn from_config(config: &TrainingConfig) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::Adam => Box::new(
            Adam::new(config.learning_rate, 0.9, 0.999, 1e-8)
                .with_weight_decay(config.weight_decay),
        ),
        OptimizerKind::Sgd => {
            Box::new(SGD::new(config.learning_rate).with_weight_decay(config.weight_decay))
        }
    }
}
