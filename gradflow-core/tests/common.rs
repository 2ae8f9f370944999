use gradflow_core::Matrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Each test binary uses a different subset of these helpers.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Elements with magnitude in `[0.1, 1.0]` and a random sign, away from the
/// kinks that piecewise operators have at zero.
#[allow(dead_code)]
pub fn signed_matrix(rows: usize, cols: usize, seed: u64) -> Matrix<f64> {
    signed_values(&mut StdRng::seed_from_u64(seed), (rows, cols), 0.1, 1.0)
}

/// Elements drawn uniformly from `[0.2, 2.0)`.
#[allow(dead_code)]
pub fn positive_matrix(rows: usize, cols: usize, seed: u64) -> Matrix<f64> {
    positive_values(&mut StdRng::seed_from_u64(seed), (rows, cols))
}

/// Elements with magnitude in `[low, high)` and a random sign.
#[allow(dead_code)]
pub fn signed_values(rng: &mut StdRng, (rows, cols): (usize, usize), low: f64, high: f64) -> Matrix<f64> {
    let data = (0..rows * cols)
        .map(|_| {
            let magnitude = rng.gen_range(low..high);
            if rng.gen_bool(0.5) {
                magnitude
            } else {
                -magnitude
            }
        })
        .collect();
    Matrix::new(rows, cols, data)
}

#[allow(dead_code)]
pub fn positive_values(rng: &mut StdRng, (rows, cols): (usize, usize)) -> Matrix<f64> {
    Matrix::random_uniform(rows, cols, 0.2, 2.0, rng).expect("valid range")
}

/// Shape used by the `trial`-th randomized check: `1x1`, then a row vector,
/// then a column vector, then anything up to `4x4`.
#[allow(dead_code)]
pub fn random_shape(rng: &mut StdRng, trial: usize) -> (usize, usize) {
    match trial {
        0 => (1, 1),
        1 => (1, rng.gen_range(2..=5)),
        2 => (rng.gen_range(2..=5), 1),
        _ => (rng.gen_range(1..=4), rng.gen_range(1..=4)),
    }
}

#[allow(dead_code)]
pub fn assert_data_eq(actual: &[f64], expected: &[f64], epsilon: f64) {
    assert_eq!(actual.len(), expected.len(), "length differs: {:?} vs {:?}", actual, expected);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= epsilon, "element {}: {} != {} ({:?})", i, a, e, actual);
    }
}
