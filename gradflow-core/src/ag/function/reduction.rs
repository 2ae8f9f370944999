use crate::ag::function::propagate;
use crate::ag::operand::Operand;
use crate::mat::{FillPolicy, Float, Matrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionKind {
    /// Sum of all elements, as a `1x1` matrix.
    ReduceSum,
    /// Mean of all elements, as a `1x1` matrix.
    ReduceMean,
    /// Largest element, as a `1x1` matrix. The gradient flows to the first
    /// maximal element only.
    ReduceMax,
    /// Softmax over all elements of a vector.
    Softmax,
}

impl ReductionKind {
    pub fn name(self) -> &'static str {
        match self {
            ReductionKind::ReduceSum => "ReduceSum",
            ReductionKind::ReduceMean => "ReduceMean",
            ReductionKind::ReduceMax => "ReduceMax",
            ReductionKind::Softmax => "Softmax",
        }
    }
}

pub(crate) fn reduction_forward<T: Float, O: Operand<T>>(kind: ReductionKind, xs: &[O]) -> Matrix<T> {
    let x = xs[0].value();
    match kind {
        ReductionKind::ReduceSum => Matrix::acquire_full(1, 1, x.sum()),
        ReductionKind::ReduceMean => Matrix::acquire_full(1, 1, x.sum() / T::cast(x.size() as f64)),
        ReductionKind::ReduceMax => Matrix::acquire_full(1, 1, x.max()),
        ReductionKind::Softmax => x.softmax(),
    }
}

pub(crate) fn reduction_backward<T: Float, O: Operand<T>>(
    kind: ReductionKind,
    xs: &[O],
    y: &Matrix<T>,
    gy: &Matrix<T>,
) {
    propagate(&xs[0], || {
        let x = xs[0].value();
        let (rows, cols) = x.shape();
        match kind {
            ReductionKind::ReduceSum => Matrix::acquire_full(rows, cols, gy.scalar_value()),
            ReductionKind::ReduceMean => {
                Matrix::acquire_full(rows, cols, gy.scalar_value() / T::cast(x.size() as f64))
            }
            ReductionKind::ReduceMax => {
                let mut gx = Matrix::acquire(rows, cols, FillPolicy::Zeroed);
                gx.data_mut()[x.argmax()] = gy.scalar_value();
                gx
            }
            ReductionKind::Softmax => {
                let inner = gy.dot(y);
                let mut gx = Matrix::acquire(rows, cols, FillPolicy::Uninitialized);
                for ((o, &yv), &g) in gx.data_mut().iter_mut().zip(y.data()).zip(gy.data()) {
                    *o = yv * (g - inner);
                }
                gx
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ag::Variable;
    use approx::assert_relative_eq;

    #[test]
    fn test_reduce_mean() {
        let x = Variable::new(Matrix::new(2, 2, vec![1.0f64, 2.0, 3.0, 6.0]), true);
        let xs = [&x];
        let y = reduction_forward(ReductionKind::ReduceMean, &xs);
        assert_eq!(y.scalar_value(), 3.0);
        reduction_backward(ReductionKind::ReduceMean, &xs, &y, &Matrix::scalar(2.0));
        assert_eq!(x.grad().unwrap().data(), &[0.5; 4]);
    }

    #[test]
    fn test_reduce_max_picks_first_maximum() {
        let x = Variable::new(Matrix::from_vec(vec![1.0f64, 7.0, 7.0]), true);
        let xs = [&x];
        let y = reduction_forward(ReductionKind::ReduceMax, &xs);
        reduction_backward(ReductionKind::ReduceMax, &xs, &y, &Matrix::scalar(1.0));
        assert_eq!(x.grad().unwrap().data(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_softmax_gradient_sums_to_zero() {
        let x = Variable::new(Matrix::from_vec(vec![0.5f64, -1.0, 2.0]), true);
        let xs = [&x];
        let y = reduction_forward(ReductionKind::Softmax, &xs);
        reduction_backward(ReductionKind::Softmax, &xs, &y, &Matrix::from_vec(vec![1.0, 0.0, -2.0]));
        assert_relative_eq!(x.grad().unwrap().sum(), 0.0, epsilon = 1e-12);
    }
}
