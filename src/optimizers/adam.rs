//! Adam (Adaptive Moment Estimation) optimizer.

use crate::optimizers::Optimizer;

/// Adam with optional L2 weight decay.
///
/// The update rule for each parameter is:
///
/// ```text
/// g   = gradient + λ * parameter
/// m_t = β1 * m_{t-1} + (1 - β1) * g
/// v_t = β2 * v_{t-1} + (1 - β2) * g²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// Weight decay is coupled (added to the gradient before the moment
/// updates), matching the classic `Adam(weight_decay=λ)` formulation rather
/// than AdamW.
///
/// Moment estimates are kept per parameter group. The `k`-th call to
/// [`Optimizer::update`] after [`Optimizer::begin_step`] always uses the
/// `k`-th moment slot.
///
/// # Example
///
/// ```
/// use convnet_trainer::optimizers::{Adam, Optimizer};
///
/// let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
/// let mut weights = vec![1.0, 2.0, 3.0];
///
/// optimizer.begin_step();
/// optimizer.update(&mut weights, &[0.1, 0.2, 0.3]);
/// assert!(weights[0] < 1.0);
/// ```
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    /// First and second moment estimates, one entry per parameter group
    moments: Vec<Moments>,
    /// Index of the next parameter group within the current step
    cursor: usize,
    /// Time step counter for bias correction
    t: usize,
}

struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Creates a new Adam optimizer.
    ///
    /// The paper defaults are `learning_rate = 0.001`, `beta1 = 0.9`,
    /// `beta2 = 0.999`, `epsilon = 1e-8`.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
            moments: Vec::new(),
            cursor: 0,
            t: 0,
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> usize {
        self.t
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
        self.cursor = 0;
    }

    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        // Allow a bare update() without begin_step() to behave as step 1.
        if self.t == 0 {
            self.begin_step();
        }

        if self.cursor == self.moments.len() {
            self.moments.push(Moments {
                m: vec![0.0; parameters.len()],
                v: vec![0.0; parameters.len()],
            });
        }
        let slot = &mut self.moments[self.cursor];
        assert_eq!(
            slot.m.len(),
            parameters.len(),
            "Parameter group {} changed size between steps",
            self.cursor
        );
        self.cursor += 1;

        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for (i, param) in parameters.iter_mut().enumerate() {
            let grad = gradients[i] + self.weight_decay * *param;

            slot.m[i] = self.beta1 * slot.m[i] + (1.0 - self.beta1) * grad;
            slot.v[i] = self.beta2 * slot.v[i] + (1.0 - self.beta2) * grad * grad;

            let m_hat = slot.m[i] / bias_correction1;
            let v_hat = slot.v[i] / bias_correction2;

            *param -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.moments.clear();
        self.cursor = 0;
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
