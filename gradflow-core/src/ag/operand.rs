use std::sync::Arc;

use crate::error::{fatal, GradError};
use crate::mat::{Float, Matrix};

/// Anything a [`Function`](crate::ag::Function) can read a value from and
/// deliver a gradient to.
///
/// Implemented by graph nodes, standalone [`Variable`](crate::ag::Variable)s
/// and shared [`Param`](crate::nn::Param)s.
pub trait Operand<T: Float> {
    /// Current value. Operator nodes compute it on first access.
    fn value(&self) -> Arc<Matrix<T>>;

    fn requires_grad(&self) -> bool;

    /// Copy of the accumulated gradient, if any.
    fn grad(&self) -> Option<Matrix<T>>;

    fn has_grad(&self) -> bool {
        self.grad().is_some()
    }

    /// Adds `gx` to the accumulated gradient, allocating it on first use.
    /// Does nothing when the operand does not require gradients.
    fn acc_grad(&self, gx: &Matrix<T>);
}

impl<T: Float, O: Operand<T> + ?Sized> Operand<T> for &O {
    fn value(&self) -> Arc<Matrix<T>> {
        (**self).value()
    }

    fn requires_grad(&self) -> bool {
        (**self).requires_grad()
    }

    fn grad(&self) -> Option<Matrix<T>> {
        (**self).grad()
    }

    fn has_grad(&self) -> bool {
        (**self).has_grad()
    }

    fn acc_grad(&self, gx: &Matrix<T>) {
        (**self).acc_grad(gx)
    }
}

/// Adds `delta` into `slot`, a gradient buffer for a value of `shape`.
///
/// `delta` must have exactly `shape`, or both must be vectors holding the same
/// number of elements, in which case the sum keeps `shape`.
pub(crate) fn accumulate_grad<T: Float>(
    slot: &mut Option<Matrix<T>>,
    shape: (usize, usize),
    delta: &Matrix<T>,
    operation: &str,
) {
    let (rows, cols) = shape;
    let target_is_vector = rows == 1 || cols == 1;
    let compatible =
        delta.shape() == shape || (target_is_vector && delta.is_vector() && delta.size() == rows * cols);
    if !compatible {
        fatal(GradError::ShapeMismatch {
            operation: operation.to_string(),
            expected: shape,
            actual: delta.shape(),
        });
    }
    match slot {
        Some(grad) => {
            for (g, &d) in grad.data_mut().iter_mut().zip(delta.data()) {
                *g += d;
            }
        }
        None => *slot = Some(Matrix::acquire_from_slice(rows, cols, delta.data())),
    }
}
