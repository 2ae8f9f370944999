//! The closed catalogue of differentiable operators.
//!
//! A [`Function`] only describes *what* to compute. The operands are handed
//! in on every call, in the order the operator documents, so the same value
//! can be evaluated over graph nodes, standalone variables or params.

pub mod activation;
pub mod arithmetic;
pub mod reduction;
pub mod structural;

pub use activation::{ParametricKind, UnaryKind};
pub use arithmetic::{BinaryKind, ScalarKind};
pub use reduction::ReductionKind;

use crate::ag::operand::Operand;
use crate::error::{fatal, GradError};
use crate::mat::{Float, Matrix};

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// `[x]`
    Unary(UnaryKind),
    /// `[x, hyper-parameters...]`
    Parametric(ParametricKind),
    /// `[x, beta]`, both differentiable.
    SwishB,
    /// `[a, b]`
    Binary(BinaryKind),
    /// `[x]`
    Pow { power: f64 },
    /// `[x, s]` with `s` a `1x1` matrix.
    Scalar(ScalarKind),
    /// `[x]`
    Reduction(ReductionKind),
    /// `[x]`
    Transpose,
    /// `[x]`
    Reshape { rows: usize, cols: usize },
    /// `[x]`, producing a `1x1` matrix.
    At { row: usize, col: usize },
    /// `[x]`, producing row `row` as a `1 x cols` vector.
    RowView { row: usize },
    /// `[x]`, producing column `col` as a `rows x 1` vector.
    ColView { col: usize },
    /// `[x]`, rows `row_start..row_end` and columns `col_start..col_end`.
    Slice {
        row_start: usize,
        col_start: usize,
        row_end: usize,
        col_end: usize,
    },
    /// `[x1, ..., xn]`, all elements in one column vector.
    Concat,
    /// `[x1, ..., xn]`, one row per operand.
    Stack,
    /// `[x, v1, ..., vn]`, `x` followed by one row per `vi`.
    AppendRows,
    /// `[x]`
    Identity,
    /// `[x]`. Elements are zeroed with probability `p`; the mask is derived
    /// from `seed` so forward and backward agree.
    Dropout { p: f64, seed: u64 },
}

/// How many operands a function takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Unary(kind) => kind.name(),
            Function::Parametric(kind) => kind.name(),
            Function::SwishB => "SwishB",
            Function::Binary(kind) => kind.name(),
            Function::Pow { .. } => "Pow",
            Function::Scalar(kind) => kind.name(),
            Function::Reduction(kind) => kind.name(),
            Function::Transpose => "Transpose",
            Function::Reshape { .. } => "Reshape",
            Function::At { .. } => "At",
            Function::RowView { .. } => "RowView",
            Function::ColView { .. } => "ColView",
            Function::Slice { .. } => "Slice",
            Function::Concat => "Concat",
            Function::Stack => "Stack",
            Function::AppendRows => "AppendRows",
            Function::Identity => "Identity",
            Function::Dropout { .. } => "Dropout",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Function::Parametric(kind) => Arity::Exactly(1 + kind.extra_operands()),
            Function::SwishB | Function::Binary(_) | Function::Scalar(_) => Arity::Exactly(2),
            Function::Concat | Function::Stack | Function::AppendRows => Arity::AtLeast(1),
            _ => Arity::Exactly(1),
        }
    }

    /// Checks the operand count, aborting with the operator name when it is wrong.
    pub(crate) fn check_arity(&self, n: usize) {
        if n == 0 && matches!(self.arity(), Arity::AtLeast(_)) {
            fatal(GradError::EmptyOperands(self.name().to_string()));
        }
        if !self.arity().accepts(n) {
            fatal(GradError::InvalidArgument {
                operation: self.name().to_string(),
                message: format!("expected {:?} operands, got {}", self.arity(), n),
            });
        }
    }

    /// Computes the output from the operand values. Operands are never mutated.
    pub fn forward<T: Float, O: Operand<T>>(&self, xs: &[O]) -> Matrix<T> {
        self.check_arity(xs.len());
        match self {
            Function::Unary(kind) => activation::unary_forward(*kind, xs),
            Function::Parametric(kind) => activation::parametric_forward(*kind, xs),
            Function::SwishB => activation::swish_b_forward(xs),
            Function::Binary(kind) => arithmetic::binary_forward(*kind, xs),
            Function::Pow { power } => arithmetic::pow_forward(*power, xs),
            Function::Scalar(kind) => arithmetic::scalar_forward(*kind, xs),
            Function::Reduction(kind) => reduction::reduction_forward(*kind, xs),
            Function::Transpose => xs[0].value().transpose(),
            Function::Reshape { rows, cols } => xs[0].value().reshape(*rows, *cols),
            Function::At { row, col } => {
                let x = xs[0].value();
                Matrix::acquire_full(1, 1, x.at(*row, *col))
            }
            Function::RowView { row } => xs[0].value().extract_row(*row),
            Function::ColView { col } => xs[0].value().column(*col),
            Function::Slice {
                row_start,
                col_start,
                row_end,
                col_end,
            } => xs[0].value().slice(*row_start, *col_start, *row_end, *col_end),
            Function::Concat => structural::concat_forward(xs),
            Function::Stack => structural::stack_forward(xs),
            Function::AppendRows => structural::append_rows_forward(xs),
            Function::Identity => xs[0].value().copy_pooled(),
            Function::Dropout { p, seed } => structural::dropout_forward(*p, *seed, xs),
        }
    }

    /// Delivers the gradient of every operand that requires one, given the
    /// forward output `y` and its gradient `gy`.
    ///
    /// # Panics
    /// If `gy` is not shaped exactly like `y`.
    pub fn backward<T: Float, O: Operand<T>>(&self, xs: &[O], y: &Matrix<T>, gy: &Matrix<T>) {
        if !gy.same_dims(y) {
            fatal(GradError::ShapeMismatch {
                operation: self.name().to_string(),
                expected: y.shape(),
                actual: gy.shape(),
            });
        }
        self.check_arity(xs.len());
        match self {
            Function::Unary(kind) => activation::unary_backward(*kind, xs, gy),
            Function::Parametric(kind) => activation::parametric_backward(*kind, xs, gy),
            Function::SwishB => activation::swish_b_backward(xs, gy),
            Function::Binary(kind) => arithmetic::binary_backward(*kind, xs, gy),
            Function::Pow { power } => arithmetic::pow_backward(*power, xs, gy),
            Function::Scalar(kind) => arithmetic::scalar_backward(*kind, xs, gy),
            Function::Reduction(kind) => reduction::reduction_backward(*kind, xs, y, gy),
            Function::Transpose => structural::transpose_backward(xs, gy),
            Function::Reshape { .. } => structural::reshape_backward(xs, gy),
            Function::At { row, col } => structural::scatter_backward(xs, gy, *row, *col),
            Function::RowView { row } => structural::scatter_backward(xs, gy, *row, 0),
            Function::ColView { col } => structural::col_view_backward(xs, gy, *col),
            Function::Slice {
                row_start, col_start, ..
            } => structural::scatter_backward(xs, gy, *row_start, *col_start),
            Function::Concat | Function::Stack => structural::split_backward(xs, gy),
            Function::AppendRows => structural::append_rows_backward(xs, gy),
            Function::Identity => structural::identity_backward(xs, gy),
            Function::Dropout { p, seed } => structural::dropout_backward(*p, *seed, xs, gy),
        }
    }
}

/// Computes and delivers a gradient to `x` only if `x` requires one. The
/// gradient matrix goes back to the pool once delivered.
pub(crate) fn propagate<T: Float, O: Operand<T>>(x: &O, gx: impl FnOnce() -> Matrix<T>) {
    if x.requires_grad() {
        let gx = gx();
        x.acc_grad(&gx);
        gx.release();
    }
}

/// Delivers `gy` itself, for operators whose local Jacobian is the identity.
pub(crate) fn propagate_gy<T: Float, O: Operand<T>>(x: &O, gy: &Matrix<T>) {
    if x.requires_grad() {
        x.acc_grad(gy);
    }
}

/// Delivers a reduced `1x1` gradient.
pub(crate) fn propagate_scalar<T: Float, O: Operand<T>>(x: &O, gx: impl FnOnce() -> T) {
    propagate(x, || Matrix::acquire_full(1, 1, gx()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ag::Variable;
    use approx::assert_relative_eq;

    #[test]
    fn test_elu_values_and_gradient() {
        let x = Variable::new(Matrix::from_vec(vec![-1.0f64, 0.0, 2.0]), true);
        let alpha = Variable::new(Matrix::scalar(1.0), false);
        let xs = [&x, &alpha];
        let f = Function::Parametric(ParametricKind::ELU);
        let y = f.forward(&xs);
        assert_relative_eq!(y.at(0, 0), -0.632, epsilon = 1e-3);
        assert_eq!(y.at(1, 0), 0.0);
        assert_eq!(y.at(2, 0), 2.0);

        f.backward(&xs, &y, &Matrix::from_vec(vec![1.0, 1.0, 1.0]));
        let gx = x.grad().unwrap();
        assert_relative_eq!(gx.at(0, 0), 0.368, epsilon = 1e-3);
        assert_relative_eq!(gx.at(1, 0), 1.0);
        assert_relative_eq!(gx.at(2, 0), 1.0);
        assert!(alpha.grad().is_none());
    }

    #[test]
    #[should_panic(expected = "Shape mismatch during operation Tanh: expected (3, 1), got (1, 3)")]
    fn test_backward_rejects_misshaped_output_gradient() {
        let x = Variable::new(Matrix::from_vec(vec![1.0f64, 2.0, 3.0]), true);
        let f = Function::Unary(UnaryKind::Tanh);
        let y = f.forward(&[&x]);
        f.backward(&[&x], &y, &Matrix::row_vector(vec![1.0, 1.0, 1.0]));
    }

    #[test]
    #[should_panic(expected = "Operation Stack requires at least one operand")]
    fn test_stack_without_operands_is_fatal() {
        let xs: [&Variable<f64>; 0] = [];
        Function::Stack.forward(&xs);
    }

    #[test]
    fn test_operands_without_grad_are_skipped() {
        let x = Variable::new(Matrix::from_vec(vec![1.0f64, 2.0]), false);
        let f = Function::Unary(UnaryKind::Exp);
        let y = f.forward(&[&x]);
        f.backward(&[&x], &y, &Matrix::from_vec(vec![1.0, 1.0]));
        assert!(!x.has_grad());
    }

    #[test]
    fn test_swish_b_beta_receives_gradient() {
        let x = Variable::new(Matrix::from_vec(vec![0.5f64, -1.0]), true);
        let beta = Variable::new(Matrix::scalar(1.0), true);
        let xs = [&x, &beta];
        let y = Function::SwishB.forward(&xs);
        Function::SwishB.backward(&xs, &y, &Matrix::from_vec(vec![1.0, 1.0]));
        assert!(beta.grad().is_some());
        assert_eq!(beta.grad().unwrap().shape(), (1, 1));
    }
}
