//! Finite-difference checks of every operator's backward over random shapes
//! and values.

mod common;

use common::{init_logger, positive_values, random_shape, signed_values};
use gradflow_core::ag::{check_grad, GradCheckOptions};
use gradflow_core::{Graph, Matrix, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type UnaryBuilder = fn(&mut Graph<f64>, NodeId) -> NodeId;
type BinaryBuilder = fn(&mut Graph<f64>, NodeId, NodeId) -> NodeId;

/// Shapes per operator. The first three are `1x1`, `1xn` and `nx1`.
const TRIALS: usize = 6;

fn check<F>(label: &str, trial: usize, build: F, inputs: Vec<Matrix<f64>>)
where
    F: Fn(&mut Graph<f64>, &[NodeId]) -> NodeId,
{
    let options = GradCheckOptions {
        seed: trial as u64,
        ..GradCheckOptions::default()
    };
    if let Err(err) = check_grad(build, &inputs, options) {
        let shapes: Vec<_> = inputs.iter().map(Matrix::shape).collect();
        panic!("{} on {:?}: {}", label, shapes, err);
    }
}

fn signed(rng: &mut StdRng, shape: (usize, usize)) -> Matrix<f64> {
    signed_values(rng, shape, 0.1, 1.0)
}

fn random_scalar(rng: &mut StdRng) -> Matrix<f64> {
    Matrix::scalar(rng.gen_range(0.5..2.0))
}

#[test]
fn test_unary_operators_on_signed_inputs() {
    init_logger();
    let ops: Vec<(&str, UnaryBuilder)> = vec![
        ("tan", Graph::tan),
        ("tanh", Graph::tanh),
        ("sigmoid", Graph::sigmoid),
        ("hard_sigmoid", Graph::hard_sigmoid),
        ("hard_tanh", Graph::hard_tanh),
        ("relu", Graph::relu),
        ("softsign", Graph::softsign),
        ("cos", Graph::cos),
        ("sin", Graph::sin),
        ("exp", Graph::exp),
        ("neg", Graph::neg),
        ("reciprocal", Graph::reciprocal),
        ("abs", Graph::abs),
        ("mish", Graph::mish),
        ("gelu", Graph::gelu),
        ("swish", Graph::swish),
        ("square", Graph::square),
        ("positive_elu", Graph::positive_elu),
        ("identity", Graph::identity),
    ];
    let mut rng = StdRng::seed_from_u64(1);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            check(label, trial, |g, xs| op(g, xs[0]), vec![signed(&mut rng, shape)]);
        }
    }
}

#[test]
fn test_saturating_activations_on_large_inputs() {
    init_logger();
    let ops: Vec<(&str, UnaryBuilder)> = vec![
        ("tanh", Graph::tanh),
        ("sigmoid", Graph::sigmoid),
        ("softsign", Graph::softsign),
        ("mish", Graph::mish),
        ("gelu", Graph::gelu),
        ("swish", Graph::swish),
    ];
    let mut rng = StdRng::seed_from_u64(2);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            let x = signed_values(&mut rng, shape, 5.0, 30.0);
            check(label, trial, |g, xs| op(g, xs[0]), vec![x]);
        }
    }
}

#[test]
fn test_unary_operators_on_positive_inputs() {
    init_logger();
    let ops: Vec<(&str, UnaryBuilder)> = vec![("log", Graph::log), ("sqrt", Graph::sqrt)];
    let mut rng = StdRng::seed_from_u64(3);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            check(label, trial, |g, xs| op(g, xs[0]), vec![positive_values(&mut rng, shape)]);
        }
        check("pow 3", trial, |g, xs| g.pow(xs[0], 3.0), vec![signed(&mut rng, shape)]);
        check("pow 0.5", trial, |g, xs| g.pow(xs[0], 0.5), vec![positive_values(&mut rng, shape)]);
    }
}

#[test]
fn test_parametric_activations() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(4);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        check(
            "elu",
            trial,
            |g, xs| {
                let alpha = g.constant(0.7);
                g.elu(xs[0], alpha)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "leaky_relu",
            trial,
            |g, xs| {
                let alpha = g.constant(0.01);
                g.leaky_relu(xs[0], alpha)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "selu",
            trial,
            |g, xs| {
                let alpha = g.constant(1.673_263_242_354_377_3);
                let scale = g.constant(1.050_700_987_355_480_5);
                g.selu(xs[0], alpha, scale)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "celu",
            trial,
            |g, xs| {
                let alpha = g.constant(1.5);
                g.celu(xs[0], alpha)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "softplus",
            trial,
            |g, xs| {
                let beta = g.constant(2.0);
                let threshold = g.constant(20.0);
                g.softplus(xs[0], beta, threshold)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "soft_shrink",
            trial,
            |g, xs| {
                let lambda = g.constant(0.05);
                g.soft_shrink(xs[0], lambda)
            },
            vec![signed(&mut rng, shape)],
        );
        check(
            "threshold",
            trial,
            |g, xs| {
                let threshold = g.constant(0.0);
                let value = g.constant(-3.0);
                g.threshold(xs[0], threshold, value)
            },
            vec![signed(&mut rng, shape)],
        );
        let beta = Matrix::scalar(rng.gen_range(0.5..1.5));
        check(
            "swish_b",
            trial,
            |g, xs| g.swish_b(xs[0], xs[1]),
            vec![signed(&mut rng, shape), beta],
        );
    }
}

#[test]
fn test_binary_operators() {
    init_logger();
    let ops: Vec<(&str, BinaryBuilder)> = vec![
        ("add", Graph::add),
        ("sub", Graph::sub),
        ("prod", Graph::prod),
        ("div", Graph::div),
        ("max", Graph::max),
        ("min", Graph::min),
        ("dot", Graph::dot),
    ];
    let mut rng = StdRng::seed_from_u64(5);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            let a = signed(&mut rng, shape);
            let b = signed(&mut rng, shape);
            check(label, trial, |g, xs| op(g, xs[0], xs[1]), vec![a, b]);
        }

        let n = rng.gen_range(1..=5);
        check(
            "add of vectors with different orientation",
            trial,
            |g, xs| g.add(xs[0], xs[1]),
            vec![signed(&mut rng, (n, 1)), signed(&mut rng, (1, n))],
        );

        let (m, k, p) = (shape.0, shape.1, rng.gen_range(1..=4));
        check(
            "mul",
            trial,
            |g, xs| g.mul(xs[0], xs[1]),
            vec![signed(&mut rng, (m, k)), signed(&mut rng, (k, p))],
        );
    }
}

#[test]
fn test_scalar_operators() {
    init_logger();
    let ops: Vec<(&str, BinaryBuilder)> = vec![
        ("add_scalar", Graph::add_scalar),
        ("sub_scalar", Graph::sub_scalar),
        ("reverse_sub_scalar", Graph::reverse_sub_scalar),
        ("prod_scalar", Graph::prod_scalar),
        ("div_scalar", Graph::div_scalar),
    ];
    let mut rng = StdRng::seed_from_u64(6);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            let x = signed(&mut rng, shape);
            let s = random_scalar(&mut rng);
            check(label, trial, |g, xs| op(g, xs[0], xs[1]), vec![x, s]);
        }
    }
}

#[test]
fn test_reductions() {
    init_logger();
    let ops: Vec<(&str, UnaryBuilder)> = vec![
        ("reduce_sum", Graph::reduce_sum),
        ("reduce_mean", Graph::reduce_mean),
        ("reduce_max", Graph::reduce_max),
        ("softmax", Graph::softmax),
        ("log_softmax", Graph::log_softmax),
    ];
    let mut rng = StdRng::seed_from_u64(7);
    for trial in 0..TRIALS {
        let shape = random_shape(&mut rng, trial);
        for &(label, op) in &ops {
            check(label, trial, |g, xs| op(g, xs[0]), vec![signed(&mut rng, shape)]);
        }

        let terms = rng.gen_range(2..=4);
        let inputs: Vec<_> = (0..terms).map(|_| signed(&mut rng, shape)).collect();
        check("sum", trial, |g, xs| g.sum(xs), inputs.clone());
        check("mean", trial, |g, xs| g.mean(xs), inputs);
    }
}

#[test]
fn test_structural_operators() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(8);
    for trial in 0..TRIALS {
        let (rows, cols) = random_shape(&mut rng, trial);
        let m = signed(&mut rng, (rows, cols));

        check("transpose", trial, |g, xs| g.transpose(xs[0]), vec![m.clone()]);
        check("reshape", trial, |g, xs| g.reshape(xs[0], cols, rows), vec![m.clone()]);
        check("reshape to a row", trial, |g, xs| g.reshape(xs[0], 1, rows * cols), vec![m.clone()]);

        let (row, col) = (rng.gen_range(0..rows), rng.gen_range(0..cols));
        check("at", trial, |g, xs| g.at(xs[0], row, col), vec![m.clone()]);
        check("row_view", trial, |g, xs| g.row_view(xs[0], row), vec![m.clone()]);
        check("col_view", trial, |g, xs| g.col_view(xs[0], col), vec![m.clone()]);

        let row_start = rng.gen_range(0..rows);
        let row_end = rng.gen_range(row_start + 1..=rows);
        let col_start = rng.gen_range(0..cols);
        let col_end = rng.gen_range(col_start + 1..=cols);
        check(
            "slice",
            trial,
            |g, xs| g.slice(xs[0], row_start, col_start, row_end, col_end),
            vec![m.clone()],
        );

        let other = random_shape(&mut rng, TRIALS);
        check(
            "concat",
            trial,
            |g, xs| g.concat(xs),
            vec![m.clone(), signed(&mut rng, other)],
        );

        let n = rows * cols;
        check(
            "stack",
            trial,
            |g, xs| g.stack(xs),
            vec![signed(&mut rng, (1, n)), signed(&mut rng, (n, 1)), m.clone()],
        );

        check(
            "append_rows",
            trial,
            |g, xs| g.append_rows(xs[0], &xs[1..]),
            vec![m.clone(), signed(&mut rng, (1, cols)), signed(&mut rng, (cols, 1))],
        );

        check("dropout", trial, |g, xs| g.dropout(xs[0], 0.3), vec![m]);
    }
}

#[test]
fn test_composed_expression() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(9);
    for trial in 0..TRIALS {
        let (inputs, hidden) = random_shape(&mut rng, trial);
        let outputs = rng.gen_range(1..=3);
        // A small two-layer perceptron with a softmax head.
        check(
            "mlp",
            trial,
            |g, xs| {
                let h = g.mul(xs[0], xs[2]);
                let h = g.add(h, xs[1]);
                let h = g.tanh(h);
                let h = g.mul(xs[3], h);
                let p = g.log_softmax(h);
                g.reduce_mean(p)
            },
            vec![
                signed(&mut rng, (hidden, inputs)),
                signed(&mut rng, (hidden, 1)),
                signed(&mut rng, (inputs, 1)),
                signed(&mut rng, (outputs, hidden)),
            ],
        );
    }
}
