//! Operators that move elements around without arithmetic, plus dropout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ag::function::{propagate, propagate_gy};
use crate::ag::operand::Operand;
use crate::mat::{FillPolicy, Float, Matrix};

pub(crate) fn transpose_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    propagate(&xs[0], || gy.transpose());
}

pub(crate) fn reshape_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    propagate(&xs[0], || {
        let (rows, cols) = xs[0].value().shape();
        gy.reshape(rows, cols)
    });
}

/// Gradient of a sub-matrix read: `gy` scattered into zeros shaped like `x`
/// at `(row_start, col_start)`.
pub(crate) fn scatter_backward<T: Float, O: Operand<T>>(
    xs: &[O],
    gy: &Matrix<T>,
    row_start: usize,
    col_start: usize,
) {
    propagate(&xs[0], || {
        let (rows, cols) = xs[0].value().shape();
        let mut gx = Matrix::acquire(rows, cols, FillPolicy::Zeroed);
        let width = gy.cols();
        for i in 0..gy.rows() {
            let dst = (row_start + i) * cols + col_start;
            gx.data_mut()[dst..dst + width].copy_from_slice(gy.row(i));
        }
        gx
    });
}

/// Column view as a `rows x 1` vector.
pub(crate) fn col_view_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>, col: usize) {
    propagate(&xs[0], || {
        let (rows, cols) = xs[0].value().shape();
        let mut gx = Matrix::acquire(rows, cols, FillPolicy::Zeroed);
        for (i, &g) in gy.data().iter().enumerate() {
            gx.data_mut()[i * cols + col] = g;
        }
        gx
    });
}

pub(crate) fn concat_forward<T: Float, O: Operand<T>>(xs: &[O]) -> Matrix<T> {
    let values: Vec<_> = xs.iter().map(|x| x.value()).collect();
    let refs: Vec<&Matrix<T>> = values.iter().map(|v| v.as_ref()).collect();
    Matrix::concat_vectors(&refs)
}

/// Splits the flat data of `gy` into consecutive chunks, one per operand,
/// each shaped like that operand.
pub(crate) fn split_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    let mut offset = 0;
    for x in xs {
        let (rows, cols) = x.value().shape();
        let size = rows * cols;
        let start = offset;
        propagate(x, || Matrix::acquire_from_slice(rows, cols, &gy.data()[start..start + size]));
        offset += size;
    }
}

pub(crate) fn stack_forward<T: Float, O: Operand<T>>(xs: &[O]) -> Matrix<T> {
    let values: Vec<_> = xs.iter().map(|x| x.value()).collect();
    let refs: Vec<&Matrix<T>> = values.iter().map(|v| v.as_ref()).collect();
    Matrix::stack(&refs)
}

pub(crate) fn append_rows_forward<T: Float, O: Operand<T>>(xs: &[O]) -> Matrix<T> {
    let values: Vec<_> = xs[1..].iter().map(|x| x.value()).collect();
    let refs: Vec<&Matrix<T>> = values.iter().map(|v| v.as_ref()).collect();
    xs[0].value().append_rows(&refs)
}

pub(crate) fn append_rows_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    let (x_rows, x_cols) = xs[0].value().shape();
    propagate(&xs[0], || gy.slice(0, 0, x_rows, x_cols));
    for (i, v) in xs[1..].iter().enumerate() {
        propagate(v, || gy.extract_row(x_rows + i));
    }
}

pub(crate) fn identity_backward<T: Float, O: Operand<T>>(xs: &[O], gy: &Matrix<T>) {
    propagate_gy(&xs[0], gy);
}

/// Keep mask scaled by `1 / (1 - p)`, regenerated from `seed` on every call.
fn dropout_mask<T: Float>(p: f64, seed: u64, rows: usize, cols: usize) -> Matrix<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let keep = T::cast(1.0 / (1.0 - p));
    let mut mask = Matrix::acquire(rows, cols, FillPolicy::Uninitialized);
    for m in mask.data_mut() {
        *m = if rng.gen_bool(p) { T::zero() } else { keep };
    }
    mask
}

pub(crate) fn dropout_forward<T: Float, O: Operand<T>>(p: f64, seed: u64, xs: &[O]) -> Matrix<T> {
    let x = xs[0].value();
    let mut y = dropout_mask(p, seed, x.rows(), x.cols());
    y.prod_in_place(&x);
    y
}

pub(crate) fn dropout_backward<T: Float, O: Operand<T>>(p: f64, seed: u64, xs: &[O], gy: &Matrix<T>) {
    propagate(&xs[0], || {
        let mut gx = dropout_mask(p, seed, gy.rows(), gy.cols());
        gx.prod_in_place(gy);
        gx
    });
}
