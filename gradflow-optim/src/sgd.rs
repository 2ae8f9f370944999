use gradflow_core::error::{fatal, GradError};
use gradflow_core::mat::{Float, Matrix};
use gradflow_core::nn::{Param, Payload};

use crate::Method;

/// Payload label of [`Sgd`].
pub const LABEL: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdConfig {
    pub learning_rate: f64,
    /// `0` disables momentum.
    pub momentum: f64,
    pub nesterov: bool,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig {
            learning_rate: 0.01,
            momentum: 0.0,
            nesterov: false,
        }
    }
}

/// Stochastic gradient descent with optional (Nesterov) momentum.
///
/// The velocity `v = momentum * v + lr * grad` lives in payload slot 0. The
/// delta is `v`, or `momentum * v + lr * grad` with Nesterov momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    config: SgdConfig,
}

impl Sgd {
    pub fn new(config: SgdConfig) -> Self {
        if !(config.learning_rate >= 0.0) || !(0.0..1.0).contains(&config.momentum) {
            fatal(GradError::InvalidArgument {
                operation: "Sgd::new".to_string(),
                message: format!("{:?}", config),
            });
        }
        Sgd { config }
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }
}

impl<T: Float> Method<T> for Sgd {
    fn label(&self) -> i64 {
        LABEL
    }

    fn new_payload(&self, param: &Param<T>) -> Payload<T> {
        let (rows, cols) = param.value().shape();
        Payload::new(LABEL, vec![Matrix::zeros(rows, cols)])
    }

    fn delta(&self, _param: &Param<T>, grad: &Matrix<T>, payload: &mut Payload<T>) -> Matrix<T> {
        let lr = T::cast(self.config.learning_rate);
        let mu = T::cast(self.config.momentum);
        let velocity = &mut payload.data[0];
        let mut delta = grad.copy_pooled();
        for ((d, v), &g) in delta.data_mut().iter_mut().zip(velocity.data_mut()).zip(grad.data()) {
            *v = mu * *v + lr * g;
            *d = if self.config.nesterov { mu * *v + lr * g } else { *v };
        }
        delta
    }
}
