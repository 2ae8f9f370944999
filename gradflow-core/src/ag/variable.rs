use std::cell::RefCell;
use std::sync::Arc;

use crate::ag::operand::{accumulate_grad, Operand};
use crate::mat::{Float, Matrix};

/// A leaf operand that lives outside any graph.
///
/// Useful to drive a [`Function`](crate::ag::Function) directly: its value
/// never changes and gradients delivered to it accumulate until
/// [`zero_grad`](Variable::zero_grad).
#[derive(Debug)]
pub struct Variable<T: Float> {
    value: Arc<Matrix<T>>,
    grad: RefCell<Option<Matrix<T>>>,
    requires_grad: bool,
    name: Option<String>,
}

impl<T: Float> Variable<T> {
    pub fn new(value: Matrix<T>, requires_grad: bool) -> Self {
        Variable {
            value: Arc::new(value),
            grad: RefCell::new(None),
            requires_grad,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Releases the gradient buffer to the pool.
    pub fn zero_grad(&self) {
        if let Some(grad) = self.grad.borrow_mut().take() {
            grad.release();
        }
    }
}

impl<T: Float> Operand<T> for Variable<T> {
    fn value(&self) -> Arc<Matrix<T>> {
        Arc::clone(&self.value)
    }

    fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    fn grad(&self) -> Option<Matrix<T>> {
        self.grad.borrow().clone()
    }

    fn has_grad(&self) -> bool {
        self.grad.borrow().is_some()
    }

    fn acc_grad(&self, gx: &Matrix<T>) {
        if !self.requires_grad {
            return;
        }
        accumulate_grad(&mut self.grad.borrow_mut(), self.value.shape(), gx, "Variable::acc_grad");
    }
}
