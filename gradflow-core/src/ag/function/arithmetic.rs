//! Binary and scalar-broadcast arithmetic.

use crate::ag::function::{propagate, propagate_gy, propagate_scalar};
use crate::ag::operand::Operand;
use crate::mat::{FillPolicy, Float, Matrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Add,
    Sub,
    /// Hadamard product.
    Prod,
    Div,
    /// Matrix product.
    Mul,
    /// Inner product, producing a `1x1` matrix.
    Dot,
    /// Elementwise maximum.
    Max,
    /// Elementwise minimum.
    Min,
}

impl BinaryKind {
    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::Add => "Add",
            BinaryKind::Sub => "Sub",
            BinaryKind::Prod => "Prod",
            BinaryKind::Div => "Div",
            BinaryKind::Mul => "Mul",
            BinaryKind::Dot => "Dot",
            BinaryKind::Max => "Max",
            BinaryKind::Min => "Min",
        }
    }
}

/// Operations between a matrix `x` and a `1x1` operand `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `x + s`
    AddScalar,
    /// `x - s`
    SubScalar,
    /// `s - x`
    ReverseSubScalar,
    /// `x * s`
    ProdScalar,
    /// `x / s`
    DivScalar,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::AddScalar => "AddScalar",
            ScalarKind::SubScalar => "SubScalar",
            ScalarKind::ReverseSubScalar => "ReverseSubScalar",
            ScalarKind::ProdScalar => "ProdScalar",
            ScalarKind::DivScalar => "DivScalar",
        }
    }
}

pub(crate) fn binary_forward<T: Float, O: Operand<T>>(kind: BinaryKind, xs: &[O]) -> Matrix<T> {
    let a = xs[0].value();
    let b = xs[1].value();
    match kind {
        BinaryKind::Add => a.add(&b),
        BinaryKind::Sub => a.sub(&b),
        BinaryKind::Prod => a.prod(&b),
        BinaryKind::Div => a.div(&b),
        BinaryKind::Mul => a.mul(&b),
        BinaryKind::Dot => Matrix::acquire_full(1, 1, a.dot(&b)),
        BinaryKind::Max => a.zip_map(&b, "Max", |x, y| x.max(y)),
        BinaryKind::Min => a.zip_map(&b, "Min", |x, y| x.min(y)),
    }
}

pub(crate) fn binary_backward<T: Float, O: Operand<T>>(kind: BinaryKind, xs: &[O], gy: &Matrix<T>) {
    let (xa, xb) = (&xs[0], &xs[1]);
    match kind {
        BinaryKind::Add => {
            propagate_gy(xa, gy);
            propagate_gy(xb, gy);
        }
        BinaryKind::Sub => {
            propagate_gy(xa, gy);
            propagate(xb, || gy.scale(-T::one()));
        }
        BinaryKind::Prod => {
            propagate(xa, || gy.prod(&xb.value()));
            propagate(xb, || gy.prod(&xa.value()));
        }
        BinaryKind::Div => {
            let b = xb.value();
            propagate(xa, || gy.div(&b));
            propagate(xb, || {
                let a = xa.value();
                let mut gx = gy.prod(&a);
                for (g, &bv) in gx.data_mut().iter_mut().zip(b.data()) {
                    *g = -*g / (bv * bv);
                }
                gx
            });
        }
        BinaryKind::Mul => {
            propagate(xa, || {
                let bt = xb.value().transpose();
                let gx = gy.mul(&bt);
                bt.release();
                gx
            });
            propagate(xb, || {
                let at = xa.value().transpose();
                let gx = at.mul(gy);
                at.release();
                gx
            });
        }
        BinaryKind::Dot => {
            let g = gy.scalar_value();
            propagate(xa, || xb.value().scale(g));
            propagate(xb, || xa.value().scale(g));
        }
        BinaryKind::Max | BinaryKind::Min => {
            let a = xa.value();
            let b = xb.value();
            let picks_a = |x: T, y: T| if kind == BinaryKind::Max { x >= y } else { x <= y };
            propagate(xa, || selected_grad(gy, &a, &b, |x, y| picks_a(x, y)));
            propagate(xb, || selected_grad(gy, &a, &b, |x, y| !picks_a(x, y)));
        }
    }
}

/// `gy` where `keep(a, b)` holds, zero elsewhere.
fn selected_grad<T: Float>(gy: &Matrix<T>, a: &Matrix<T>, b: &Matrix<T>, keep: impl Fn(T, T) -> bool) -> Matrix<T> {
    let mut gx = Matrix::acquire(gy.rows(), gy.cols(), FillPolicy::Uninitialized);
    for (((o, &g), &x), &y) in gx.data_mut().iter_mut().zip(gy.data()).zip(a.data()).zip(b.data()) {
        *o = if keep(x, y) { g } else { T::zero() };
    }
    gx
}

/// `y = x^power` with a constant exponent.
pub(crate) fn pow_forward<T: Float, O: Operand<T>>(power: f64, xs: &[O]) -> Matrix<T> {
    let p = T::cast(power);
    xs[0].value().map(|v| v.powf(p))
}

pub(crate) fn pow_backward<T: Float, O: Operand<T>>(power: f64, xs: &[O], gy: &Matrix<T>) {
    let p = T::cast(power);
    propagate(&xs[0], || {
        let x = xs[0].value();
        gy.zip_map(&x, "Pow", |g, v| g * p * v.powf(p - T::one()))
    });
}

pub(crate) fn scalar_forward<T: Float, O: Operand<T>>(kind: ScalarKind, xs: &[O]) -> Matrix<T> {
    let x = xs[0].value();
    let s = xs[1].value().scalar_value();
    match kind {
        ScalarKind::AddScalar => x.add_scalar(s),
        ScalarKind::SubScalar => x.sub_scalar(s),
        ScalarKind::ReverseSubScalar => x.map(|v| s - v),
        ScalarKind::ProdScalar => x.scale(s),
        ScalarKind::DivScalar => x.map(|v| v / s),
    }
}

pub(crate) fn scalar_backward<T: Float, O: Operand<T>>(kind: ScalarKind, xs: &[O], gy: &Matrix<T>) {
    let (x, s) = (&xs[0], &xs[1]);
    match kind {
        ScalarKind::AddScalar => {
            propagate_gy(x, gy);
            propagate_scalar(s, || gy.sum());
        }
        ScalarKind::SubScalar => {
            propagate_gy(x, gy);
            propagate_scalar(s, || -gy.sum());
        }
        ScalarKind::ReverseSubScalar => {
            propagate(x, || gy.scale(-T::one()));
            propagate_scalar(s, || gy.sum());
        }
        ScalarKind::ProdScalar => {
            let sv = s.value().scalar_value();
            propagate(x, || gy.scale(sv));
            propagate_scalar(s, || gy.dot(&x.value()));
        }
        ScalarKind::DivScalar => {
            let sv = s.value().scalar_value();
            propagate(x, || gy.map(|g| g / sv));
            propagate_scalar(s, || -gy.dot(&x.value()) / (sv * sv));
        }
    }
}
