//! Finite-difference verification of analytic gradients.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::ag::graph::{Graph, GraphMode, GraphOptions};
use crate::ag::node::NodeId;
use crate::mat::{Float, Matrix};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for input {input_index}, element {element_index}: analytical {analytical} != numerical {numerical} (difference {difference})")]
    GradientMismatch {
        input_index: usize,
        element_index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },

    #[error("Numerical gradient is not finite for input {input_index}, element {element_index}: loss+ {loss_plus}, loss- {loss_minus}")]
    NumericalGradNotFinite {
        input_index: usize,
        element_index: usize,
        loss_plus: f64,
        loss_minus: f64,
    },

    #[error("Analytical gradient is not finite for input {input_index}, element {element_index}: {value}")]
    AnalyticalGradNotFinite {
        input_index: usize,
        element_index: usize,
        value: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckOptions {
    /// Half width of the centered difference.
    pub epsilon: f64,
    /// Accepted `|analytical - numerical|`, scaled by `1 + |numerical|`.
    pub tolerance: f64,
    /// Seed of the upstream gradient and of the graphs' dropout masks.
    pub seed: u64,
}

impl Default for GradCheckOptions {
    fn default() -> Self {
        GradCheckOptions {
            epsilon: 1e-6,
            tolerance: 1e-5,
            seed: 0,
        }
    }
}

fn new_graph<T: Float>(seed: u64) -> Graph<T> {
    Graph::with_options(GraphOptions {
        mode: GraphMode::Training,
        seed: Some(seed),
    })
}

/// Builds a fresh graph with `inputs` as gradient-requiring variables and
/// returns `sum(gy ⊙ build(inputs))`.
fn weighted_output<T: Float, F>(build: &F, inputs: &[Matrix<T>], gy: Option<&Matrix<T>>, seed: u64) -> (f64, Graph<T>, Vec<NodeId>, NodeId)
where
    F: Fn(&mut Graph<T>, &[NodeId]) -> NodeId,
{
    let mut graph = new_graph(seed);
    let ids: Vec<NodeId> = inputs.iter().map(|m| graph.new_variable(m.clone(), true)).collect();
    let out = build(&mut graph, &ids);
    let loss = match gy {
        Some(gy) => graph.value(out).dot(gy).as_f64(),
        None => 0.0,
    };
    (loss, graph, ids, out)
}

/// Compares the gradients computed by backward against centered finite
/// differences of `L = sum(gy ⊙ y)`, where `y` is the node `build` returns
/// and `gy` a random matrix shaped like `y`.
///
/// `build` is called once per evaluation on a fresh graph seeded with
/// `options.seed`, so operators drawing random numbers see the same draws
/// every time.
pub fn check_grad<T: Float, F>(build: F, inputs: &[Matrix<T>], options: GradCheckOptions) -> Result<(), GradCheckError>
where
    F: Fn(&mut Graph<T>, &[NodeId]) -> NodeId,
{
    let mut rng = StdRng::seed_from_u64(options.seed);

    let (_, graph, ids, out) = weighted_output(&build, inputs, None, options.seed);
    let (rows, cols) = graph.value(out).shape();
    let gy = Matrix::new(
        rows,
        cols,
        (0..rows * cols).map(|_| T::cast(rng.gen_range(-1.0..1.0))).collect(),
    );
    graph.backward(out, Some(&gy));
    let analytic: Vec<Option<Matrix<T>>> = ids.iter().map(|&id| graph.grad(id)).collect();
    drop(graph);

    for (input_index, input) in inputs.iter().enumerate() {
        for element_index in 0..input.size() {
            let analytical = analytic[input_index]
                .as_ref()
                .map_or(0.0, |g| g.data()[element_index].as_f64());
            if !analytical.is_finite() {
                return Err(GradCheckError::AnalyticalGradNotFinite {
                    input_index,
                    element_index,
                    value: analytical,
                });
            }

            let mut perturbed = inputs.to_vec();
            let original = input.data()[element_index].as_f64();
            perturbed[input_index].data_mut()[element_index] = T::cast(original + options.epsilon);
            let (loss_plus, ..) = weighted_output(&build, &perturbed, Some(&gy), options.seed);
            perturbed[input_index].data_mut()[element_index] = T::cast(original - options.epsilon);
            let (loss_minus, ..) = weighted_output(&build, &perturbed, Some(&gy), options.seed);

            let numerical = (loss_plus - loss_minus) / (2.0 * options.epsilon);
            if !numerical.is_finite() {
                return Err(GradCheckError::NumericalGradNotFinite {
                    input_index,
                    element_index,
                    loss_plus,
                    loss_minus,
                });
            }
            let difference = (analytical - numerical).abs();
            if difference > options.tolerance * (1.0 + numerical.abs()) {
                return Err(GradCheckError::GradientMismatch {
                    input_index,
                    element_index,
                    analytical,
                    numerical,
                    difference,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_gradient_passes() {
        let inputs = vec![Matrix::new(2, 2, vec![0.3f64, -0.7, 1.1, 0.2])];
        let result = check_grad(|g, xs| g.square(xs[0]), &inputs, GradCheckOptions::default());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_unused_input_has_zero_gradient() {
        let inputs = vec![Matrix::from_vec(vec![0.5f64, 0.25]), Matrix::from_vec(vec![1.0f64, 2.0])];
        let result = check_grad(|g, xs| g.exp(xs[0]), &inputs, GradCheckOptions::default());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_non_differentiable_kink_is_reported() {
        // ReLU's derivative at 0 is taken as 1 while the centered difference sees 0.5.
        let inputs = vec![Matrix::from_vec(vec![0.0f64])];
        let result = check_grad(|g, xs| g.relu(xs[0]), &inputs, GradCheckOptions::default());
        assert!(matches!(result, Err(GradCheckError::GradientMismatch { element_index: 0, .. })));
    }
}
