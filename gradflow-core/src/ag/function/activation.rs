//! Elementwise activations: `y = f(x)` and `gx = gy ⊙ f'(x)`.

use crate::ag::function::{propagate, propagate_scalar};
use crate::ag::operand::Operand;
use crate::error::{fatal, GradError};
use crate::mat::{Float, Matrix};

const LOG_FLOOR: f64 = 1.0e-8;

/// Activations without hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Tan,
    Tanh,
    Sigmoid,
    /// `0.2x + 0.5` clipped to `[0, 1]` outside `±2.5`.
    HardSigmoid,
    HardTanh,
    ReLU,
    Softsign,
    Cos,
    Sin,
    Exp,
    /// Natural logarithm. Zero is floored to `1e-8`; negative input is fatal.
    Log,
    Neg,
    Reciprocal,
    Abs,
    Mish,
    /// Tanh approximation of GELU.
    GELU,
    Sqrt,
    Swish,
    Square,
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Tan => "Tan",
            UnaryKind::Tanh => "Tanh",
            UnaryKind::Sigmoid => "Sigmoid",
            UnaryKind::HardSigmoid => "HardSigmoid",
            UnaryKind::HardTanh => "HardTanh",
            UnaryKind::ReLU => "ReLU",
            UnaryKind::Softsign => "Softsign",
            UnaryKind::Cos => "Cos",
            UnaryKind::Sin => "Sin",
            UnaryKind::Exp => "Exp",
            UnaryKind::Log => "Log",
            UnaryKind::Neg => "Neg",
            UnaryKind::Reciprocal => "Reciprocal",
            UnaryKind::Abs => "Abs",
            UnaryKind::Mish => "Mish",
            UnaryKind::GELU => "GELU",
            UnaryKind::Sqrt => "Sqrt",
            UnaryKind::Swish => "Swish",
            UnaryKind::Square => "Square",
        }
    }

    pub fn apply<T: Float>(self, v: T) -> T {
        let one = T::one();
        let c = T::cast;
        match self {
            UnaryKind::Tan => v.tan(),
            UnaryKind::Tanh => v.tanh(),
            UnaryKind::Sigmoid => sigmoid(v),
            UnaryKind::HardSigmoid => {
                if v > c(2.5) {
                    one
                } else if v < c(-2.5) {
                    T::zero()
                } else {
                    c(0.2) * v + c(0.5)
                }
            }
            UnaryKind::HardTanh => v.max(-one).min(one),
            UnaryKind::ReLU => v.max(T::zero()),
            UnaryKind::Softsign => v / (one + v.abs()),
            UnaryKind::Cos => v.cos(),
            UnaryKind::Sin => v.sin(),
            UnaryKind::Exp => v.exp(),
            UnaryKind::Log => safe_log_input(v).ln(),
            UnaryKind::Neg => -v,
            UnaryKind::Reciprocal => one / v,
            UnaryKind::Abs => v.abs(),
            UnaryKind::Mish => v * softplus(v).tanh(),
            UnaryKind::GELU => c(0.5) * v * (one + gelu_inner(v).tanh()),
            UnaryKind::Sqrt => v.sqrt(),
            UnaryKind::Swish => v * sigmoid(v),
            UnaryKind::Square => v * v,
        }
    }

    pub fn derivative<T: Float>(self, v: T) -> T {
        let one = T::one();
        let zero = T::zero();
        let c = T::cast;
        match self {
            UnaryKind::Tan => one / (v.cos() * v.cos()),
            UnaryKind::Tanh => one - v.tanh().powi(2),
            UnaryKind::Sigmoid => {
                let s = sigmoid(v);
                s * (one - s)
            }
            UnaryKind::HardSigmoid => {
                if v < c(2.5) && v > c(-2.5) {
                    c(0.2)
                } else {
                    zero
                }
            }
            UnaryKind::HardTanh => {
                if v < one && v > -one {
                    one
                } else {
                    zero
                }
            }
            UnaryKind::ReLU => {
                if v >= zero {
                    one
                } else {
                    zero
                }
            }
            UnaryKind::Softsign => (one + v.abs()).powi(-2),
            UnaryKind::Cos => -v.sin(),
            UnaryKind::Sin => v.cos(),
            UnaryKind::Exp => v.exp(),
            UnaryKind::Log => one / safe_log_input(v),
            UnaryKind::Neg => -one,
            UnaryKind::Reciprocal => -one / (v * v),
            UnaryKind::Abs => {
                if v > zero {
                    one
                } else if v < zero {
                    -one
                } else {
                    zero
                }
            }
            UnaryKind::Mish => {
                let t = softplus(v).tanh();
                t + v * sigmoid(v) * (one - t * t)
            }
            UnaryKind::GELU => {
                let t = gelu_inner(v).tanh();
                let du = gelu_scale::<T>() * (one + c(3.0 * 0.044715) * v * v);
                c(0.5) * (one + t) + c(0.5) * v * (one - t * t) * du
            }
            UnaryKind::Sqrt => c(0.5) / v.sqrt(),
            UnaryKind::Swish => swish_b_derivative(v, one),
            UnaryKind::Square => c(2.0) * v,
        }
    }
}

/// Activations whose shape is controlled by scalar operands following `x`.
/// The scalar operands never receive gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParametricKind {
    /// Operands: `x, alpha`.
    ELU,
    /// Operands: `x, alpha`.
    LeakyReLU,
    /// Operands: `x, alpha, scale`.
    SELU,
    /// Operands: `x, alpha`.
    CELU,
    /// Operands: `x, beta, threshold`.
    SoftPlus,
    /// Operands: `x, lambda`.
    SoftShrink,
    /// Operands: `x, threshold, value`.
    Threshold,
}

impl ParametricKind {
    pub fn name(self) -> &'static str {
        match self {
            ParametricKind::ELU => "ELU",
            ParametricKind::LeakyReLU => "LeakyReLU",
            ParametricKind::SELU => "SELU",
            ParametricKind::CELU => "CELU",
            ParametricKind::SoftPlus => "SoftPlus",
            ParametricKind::SoftShrink => "SoftShrink",
            ParametricKind::Threshold => "Threshold",
        }
    }

    /// Number of scalar operands after `x`.
    pub fn extra_operands(self) -> usize {
        match self {
            ParametricKind::SELU | ParametricKind::SoftPlus | ParametricKind::Threshold => 2,
            _ => 1,
        }
    }

    pub fn apply<T: Float>(self, v: T, a: &[T]) -> T {
        let zero = T::zero();
        let one = T::one();
        match self {
            ParametricKind::ELU => {
                if v > zero {
                    v
                } else {
                    a[0] * (v.exp() - one)
                }
            }
            ParametricKind::LeakyReLU => {
                if v > zero {
                    v
                } else {
                    a[0] * v
                }
            }
            ParametricKind::SELU => {
                if v > zero {
                    a[1] * v
                } else {
                    a[1] * a[0] * (v.exp() - one)
                }
            }
            ParametricKind::CELU => {
                if v > zero {
                    v
                } else {
                    a[0] * ((v / a[0]).exp() - one)
                }
            }
            ParametricKind::SoftPlus => {
                let (beta, threshold) = (a[0], a[1]);
                if v > threshold {
                    v
                } else {
                    (one + (beta * v).exp()).ln() / beta
                }
            }
            ParametricKind::SoftShrink => {
                let lambda = a[0];
                if v < -lambda {
                    v + lambda
                } else if v > lambda {
                    v - lambda
                } else {
                    zero
                }
            }
            ParametricKind::Threshold => {
                let (threshold, value) = (a[0], a[1]);
                if v > threshold {
                    v
                } else {
                    value
                }
            }
        }
    }

    pub fn derivative<T: Float>(self, v: T, a: &[T]) -> T {
        let zero = T::zero();
        let one = T::one();
        match self {
            ParametricKind::ELU => {
                if v > zero {
                    one
                } else {
                    a[0] * v.exp()
                }
            }
            ParametricKind::LeakyReLU => {
                if v > zero {
                    one
                } else {
                    a[0]
                }
            }
            ParametricKind::SELU => {
                if v > zero {
                    a[1]
                } else {
                    a[1] * a[0] * v.exp()
                }
            }
            ParametricKind::CELU => {
                if v > zero {
                    one
                } else {
                    (v / a[0]).exp()
                }
            }
            ParametricKind::SoftPlus => {
                let (beta, threshold) = (a[0], a[1]);
                if v > threshold {
                    one
                } else {
                    let e = (beta * v).exp();
                    e / (e + one)
                }
            }
            ParametricKind::SoftShrink => {
                if v < -a[0] || v > a[0] {
                    one
                } else {
                    zero
                }
            }
            ParametricKind::Threshold => {
                if v > a[0] {
                    one
                } else {
                    zero
                }
            }
        }
    }
}

fn sigmoid<T: Float>(v: T) -> T {
    T::one() / (T::one() + (-v).exp())
}

/// `ln(1 + e^v)` without overflow for large `v`.
fn softplus<T: Float>(v: T) -> T {
    v.max(T::zero()) + (-v.abs()).exp().ln_1p()
}

fn gelu_scale<T: Float>() -> T {
    T::cast((2.0 / std::f64::consts::PI).sqrt())
}

fn gelu_inner<T: Float>(v: T) -> T {
    gelu_scale::<T>() * (v + T::cast(0.044715) * v.powi(3))
}

fn safe_log_input<T: Float>(v: T) -> T {
    if v.is_nan() {
        fatal(GradError::NotANumber("Log".to_string()))
    }
    if v > T::zero() {
        v
    } else if v == T::zero() {
        T::cast(LOG_FLOOR)
    } else {
        fatal(GradError::NegativeLogarithm(v.as_f64()))
    }
}

fn swish_b<T: Float>(v: T, beta: T) -> T {
    v * sigmoid(beta * v)
}

fn swish_b_derivative<T: Float>(v: T, beta: T) -> T {
    let s = sigmoid(beta * v);
    beta * s * (T::one() - s) * v + s
}

fn swish_b_beta_derivative<T: Float>(v: T, beta: T) -> T {
    let s = sigmoid(beta * v);
    v * v * s * (T::one() - s)
}

fn scalar_operands<T: Float, O: Operand<T>>(xs: &[O]) -> Vec<T> {
    xs.iter().map(|x| x.value().scalar_value()).collect()
}

pub(crate) fn unary_forward<T: Float, O: Operand<T>>(kind: UnaryKind, xs: &[O]) -> Matrix<T> {
    xs[0].value().map(|v| kind.apply(v))
}

pub(crate) fn unary_backward<T: Float, O: Operand<T>>(kind: UnaryKind, xs: &[O], gy: &Matrix<T>) {
    propagate(&xs[0], || {
        let x = xs[0].value();
        gy.zip_map(&x, kind.name(), |g, v| g * kind.derivative(v))
    });
}

pub(crate) fn parametric_forward<T: Float, O: Operand<T>>(kind: ParametricKind, xs: &[O]) -> Matrix<T> {
    let a = scalar_operands(&xs[1..]);
    xs[0].value().map(|v| kind.apply(v, &a))
}

pub(crate) fn parametric_backward<T: Float, O: Operand<T>>(kind: ParametricKind, xs: &[O], gy: &Matrix<T>) {
    propagate(&xs[0], || {
        let a = scalar_operands(&xs[1..]);
        let x = xs[0].value();
        gy.zip_map(&x, kind.name(), |g, v| g * kind.derivative(v, &a))
    });
}

/// `y = x ⊙ sigmoid(beta * x)` with a trainable `beta`.
pub(crate) fn swish_b_forward<T: Float, O: Operand<T>>(xs: &[O]) -> Matrix<T> {
    let beta = xs[1].value().scalar_value();
    xs[0].value().map(|v| swish_b(v, beta))
}

pub(crate) fn swish_b_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    let x = xs[0].value();
    let beta = xs[1].value().scalar_value();
    propagate(&xs[0], || gy.zip_map(&x, "SwishB", |g, v| g * swish_b_derivative(v, beta)));
    propagate_scalar(&xs[1], || {
        gy.data()
            .iter()
            .zip(x.data())
            .fold(T::zero(), |acc, (&g, &v)| acc + g * swish_b_beta_derivative(v, beta))
    });
}
