use gradflow_core::error::{fatal, GradError};
use gradflow_core::mat::{Float, Matrix};
use gradflow_core::nn::{Param, Payload};

use crate::Method;

/// Payload label of [`Adam`].
pub const LABEL: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Implements the Adam optimization algorithm.
/// Reference: https://arxiv.org/abs/1412.6980
///
/// First and second moments live in payload slots 0 and 1. The step counter
/// used for bias correction is shared by all params and advances once per
/// optimization step.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    step: u64,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        let valid = config.learning_rate >= 0.0
            && (0.0..1.0).contains(&config.beta1)
            && (0.0..1.0).contains(&config.beta2)
            && config.epsilon >= 0.0;
        if !valid {
            fatal(GradError::InvalidArgument {
                operation: "Adam::new".to_string(),
                message: format!("{:?}", config),
            });
        }
        Adam { config, step: 0 }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// `lr * sqrt(1 - beta2^t) / (1 - beta1^t)`
    fn step_size(&self) -> f64 {
        let t = self.step.max(1) as i32;
        let c = &self.config;
        c.learning_rate * (1.0 - c.beta2.powi(t)).sqrt() / (1.0 - c.beta1.powi(t))
    }
}

impl<T: Float> Method<T> for Adam {
    fn label(&self) -> i64 {
        LABEL
    }

    fn new_payload(&self, param: &Param<T>) -> Payload<T> {
        let (rows, cols) = param.value().shape();
        Payload::new(LABEL, vec![Matrix::zeros(rows, cols), Matrix::zeros(rows, cols)])
    }

    fn begin_step(&mut self) {
        self.step += 1;
    }

    fn delta(&self, _param: &Param<T>, grad: &Matrix<T>, payload: &mut Payload<T>) -> Matrix<T> {
        let b1 = T::cast(self.config.beta1);
        let b2 = T::cast(self.config.beta2);
        let eps = T::cast(self.config.epsilon);
        let alpha = T::cast(self.step_size());
        let one = T::one();

        let (first, rest) = payload.data.split_at_mut(1);
        let (m, v) = (&mut first[0], &mut rest[0]);
        let mut delta = grad.copy_pooled();
        for (((d, m), v), &g) in delta
            .data_mut()
            .iter_mut()
            .zip(m.data_mut())
            .zip(v.data_mut())
            .zip(grad.data())
        {
            *m = b1 * *m + (one - b1) * g;
            *v = b2 * *v + (one - b2) * g * g;
            *d = alpha * *m / (v.sqrt() + eps);
        }
        delta
    }
}
