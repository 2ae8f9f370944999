//! Gradient descent over [`Param`]s.
//!
//! A [`Method`] turns a gradient into the delta subtracted from a param. Any
//! state it needs between steps lives in the param's [`Payload`], tagged with
//! the method's label, so the same params can be saved and restored with
//! their optimizer state.

use std::sync::Arc;

use gradflow_core::mat::{Float, Matrix};
use gradflow_core::nn::{Model, Param, Payload};
use log::debug;

pub mod adam;
pub mod sgd;

pub use adam::{Adam, AdamConfig};
pub use sgd::{Sgd, SgdConfig};

/// An update rule.
pub trait Method<T: Float> {
    /// Tag of the payloads this method creates.
    fn label(&self) -> i64;

    /// Fresh state for `param`, used when it has no payload with this label.
    ///
    /// Like [`delta`](Method::delta), runs while the payload lock of `param`
    /// is held. Reading the value or gradient of `param` is fine.
    fn new_payload(&self, param: &Param<T>) -> Payload<T>;

    /// Called once at the start of every optimization step.
    fn begin_step(&mut self) {}

    /// Amount to subtract from the value of `param` given its gradient.
    ///
    /// Runs while the payload lock of `param` is held: implementations must
    /// not touch the payload of `param` other than through `payload`.
    fn delta(&self, param: &Param<T>, grad: &Matrix<T>, payload: &mut Payload<T>) -> Matrix<T>;
}

/// Applies a [`Method`] to a fixed set of params.
pub struct GradientDescent<T: Float, M: Method<T>> {
    method: M,
    params: Vec<Arc<Param<T>>>,
}

impl<T: Float, M: Method<T>> GradientDescent<T, M> {
    pub fn new(method: M, params: Vec<Arc<Param<T>>>) -> Self {
        GradientDescent { method, params }
    }

    /// Optimizes every param registered by `model`.
    pub fn from_model(method: M, model: &dyn Model<T>) -> Self {
        Self::new(method, model.collect_params())
    }

    pub fn params(&self) -> &[Arc<Param<T>>] {
        &self.params
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    /// Updates every param holding a gradient, then zeroes that gradient.
    /// Returns the number of params updated.
    pub fn optimize(&mut self) -> usize {
        self.method.begin_step();
        let label = self.method.label();
        let mut updated = 0;
        for param in &self.params {
            let grad = match param.grad() {
                Some(grad) => grad,
                None => continue,
            };
            let method = &self.method;
            let delta = param.update_payload(|slot| {
                if slot.as_ref().map(|p| p.label) != Some(label) {
                    if let Some(mut stale) = slot.take() {
                        stale.clear_data();
                    }
                }
                let payload = slot.get_or_insert_with(|| method.new_payload(param));
                method.delta(param, &grad, payload)
            });
            param.apply_delta(&delta);
            delta.release();
            grad.release();
            param.zero_grad();
            updated += 1;
        }
        debug!("Optimization step updated {} of {} params", updated, self.params.len());
        updated
    }

    pub fn zero_grad(&self) {
        for param in &self.params {
            param.zero_grad();
        }
    }
}
