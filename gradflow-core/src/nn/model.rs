use std::collections::HashSet;
use std::sync::Arc;

use log::trace;

use crate::mat::Float;
use crate::nn::param::{Param, ParamKind};

/// A component owning trainable params.
///
/// Implementations list their params, and those of their sub-components,
/// explicitly:
///
/// ```
/// use std::sync::Arc;
/// use gradflow_core::mat::Matrix;
/// use gradflow_core::nn::{Model, Param, ParamKind, ParamRegistry};
///
/// struct Linear {
///     w: Arc<Param<f64>>,
///     b: Arc<Param<f64>>,
/// }
///
/// impl Model<f64> for Linear {
///     fn register(&self, reg: &mut ParamRegistry<f64>) {
///         reg.param("w", ParamKind::Weights, &self.w);
///         reg.param("b", ParamKind::Biases, &self.b);
///     }
/// }
///
/// let layer = Linear {
///     w: Arc::new(Param::new(Matrix::zeros(2, 3))),
///     b: Arc::new(Param::new(Matrix::zeros(2, 1))),
/// };
/// let params = layer.collect_params();
/// assert_eq!(params[0].name(), Some("w"));
/// ```
pub trait Model<T: Float> {
    fn register(&self, reg: &mut ParamRegistry<T>);

    /// Every param of the model, each once, in registration order.
    fn collect_params(&self) -> Vec<Arc<Param<T>>> {
        let mut reg = ParamRegistry::new();
        self.register(&mut reg);
        reg.into_params()
    }

    fn zero_grad(&self) {
        for p in self.collect_params() {
            p.zero_grad();
        }
    }
}

/// Collects params under qualified names such as `encoder.layer0.w`.
pub struct ParamRegistry<T: Float> {
    prefix: Vec<String>,
    entries: Vec<(String, Arc<Param<T>>)>,
    seen: HashSet<usize>,
}

impl<T: Float> Default for ParamRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> ParamRegistry<T> {
    pub fn new() -> Self {
        ParamRegistry {
            prefix: Vec::new(),
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn qualified(&self, name: &str) -> String {
        let mut parts = self.prefix.clone();
        parts.push(name.to_string());
        parts.join(".")
    }

    /// Records `param` under `name`. A param without a name gets the
    /// lowercase qualified name, and one without a kind gets `kind`. A param
    /// reachable through several paths is recorded once.
    pub fn param(&mut self, name: &str, kind: ParamKind, param: &Arc<Param<T>>) {
        if !self.seen.insert(Arc::as_ptr(param) as usize) {
            return;
        }
        let qualified = self.qualified(name);
        param.init_name(qualified.to_lowercase());
        param.init_kind(kind);
        trace!("Registered param {} ({})", qualified, param.kind());
        self.entries.push((qualified, Arc::clone(param)));
    }

    /// Registers the params of `model` under the `name` scope.
    pub fn submodel(&mut self, name: &str, model: &dyn Model<T>) {
        self.scope(name, |reg| model.register(reg));
    }

    /// Runs `f` with `name` appended to the current prefix.
    pub fn scope(&mut self, name: &str, f: impl FnOnce(&mut Self)) {
        self.prefix.push(name.to_string());
        f(self);
        self.prefix.pop();
    }

    pub fn entries(&self) -> &[(String, Arc<Param<T>>)] {
        &self.entries
    }

    pub fn into_params(self) -> Vec<Arc<Param<T>>> {
        self.entries.into_iter().map(|(_, p)| p).collect()
    }
}
