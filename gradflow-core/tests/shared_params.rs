//! Params shared between graphs running on several threads.

mod common;

use std::sync::Arc;
use std::thread;

use common::{assert_data_eq, init_logger, signed_matrix};
use gradflow_core::{Graph, Matrix, Param};

/// Squared error of `w * x` against `target`, accumulated into `w`.
fn accumulate_example(w: &Arc<Param<f64>>, x: &Matrix<f64>, target: f64) {
    let mut g = Graph::new();
    let wn = g.param(w);
    let xn = g.new_variable(x.clone(), false);
    let y = g.mul(wn, xn);
    let t = g.constant(target);
    let diff = g.sub_scalar(y, t);
    let loss = g.square(diff);
    g.backward(loss, None);
}

#[test]
fn test_parallel_accumulation_matches_sequential() {
    init_logger();
    let examples: Vec<(Matrix<f64>, f64)> = (0..32)
        .map(|i| (signed_matrix(3, 1, i), i as f64 * 0.1))
        .collect();
    let init = Matrix::row_vector(vec![0.2, -0.4, 0.6]);

    let sequential = Arc::new(Param::new(init.clone()));
    for (x, t) in &examples {
        accumulate_example(&sequential, x, *t);
    }

    let parallel = Arc::new(Param::new(init));
    thread::scope(|s| {
        for chunk in examples.chunks(8) {
            let w = Arc::clone(&parallel);
            s.spawn(move || {
                for (x, t) in chunk {
                    accumulate_example(&w, x, *t);
                }
            });
        }
    });

    let expected = sequential.grad().unwrap();
    assert_data_eq(parallel.grad().unwrap().data(), expected.data(), 1e-9);
}

#[test]
fn test_graph_snapshot_is_isolated_from_updates() {
    init_logger();
    let w = Arc::new(Param::new(Matrix::scalar(2.0)));
    let mut g = Graph::new();
    let wn = g.param(&w);
    let y = g.square(wn);

    thread::scope(|s| {
        s.spawn(|| w.apply_delta(&Matrix::scalar(1.0)));
    });

    assert_data_eq(g.value(y).data(), &[4.0], 0.0);
    g.backward(y, None);
    assert_data_eq(w.grad().unwrap().data(), &[4.0], 0.0);
    assert_data_eq(w.value().data(), &[1.0], 0.0);
}

#[test]
fn test_frozen_param_collects_nothing() {
    init_logger();
    let w = Arc::new(Param::new(Matrix::scalar(3.0)).with_requires_grad(false));
    let mut g = Graph::new();
    let wn = g.param(&w);
    let x = g.new_variable(Matrix::scalar(1.0), true);
    let y = g.prod(wn, x);
    g.backward(y, None);
    assert!(!w.has_grad());
    assert_data_eq(g.grad(x).unwrap().data(), &[3.0], 0.0);
}
