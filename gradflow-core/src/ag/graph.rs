use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace};
use once_cell::unsync::OnceCell;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ag::function::Function;
use crate::ag::node::{GradSlot, Node, NodeId, NodeKind, NodeRecord};
use crate::ag::operand::accumulate_grad;
use crate::error::{fatal, GradError};
use crate::mat::{Float, Matrix};
use crate::nn::Param;

/// Whether a graph tracks gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphMode {
    #[default]
    Training,
    /// Operator nodes never require gradients, backward does nothing and
    /// dropout is the identity. Forward values are the same as in training.
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
    pub mode: GraphMode,
    /// Seed of the generator behind dropout masks. `None` seeds from entropy.
    pub seed: Option<u64>,
}

/// A dynamic computation graph.
///
/// Nodes live in an arena indexed by [`NodeId`]. Builder methods append
/// nodes without computing anything; values are computed on first read and
/// cached. [`backward`](Graph::backward) sweeps the arena in decreasing id
/// order, which is a valid reverse topological order.
///
/// A graph belongs to one thread. Parameters shared with other graphs are
/// reached through [`Param`], which does its own locking.
pub struct Graph<T: Float> {
    pub(crate) nodes: Vec<NodeRecord<T>>,
    mode: GraphMode,
    time_step: usize,
    pub(crate) rng: StdRng,
    params: HashMap<usize, NodeId>,
    forward_count: Cell<usize>,
}

impl<T: Float> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> Graph<T> {
    pub fn new() -> Self {
        Self::with_options(GraphOptions::default())
    }

    pub fn with_mode(mode: GraphMode) -> Self {
        Self::with_options(GraphOptions { mode, seed: None })
    }

    pub fn with_options(options: GraphOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Graph {
            nodes: Vec::new(),
            mode: options.mode,
            time_step: 0,
            rng,
            params: HashMap::new(),
            forward_count: Cell::new(0),
        }
    }

    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of function evaluations run so far.
    pub fn forward_count(&self) -> usize {
        self.forward_count.get()
    }

    // --- Time steps ---

    /// Time step stamped on nodes created from now on.
    pub fn time_step(&self) -> usize {
        self.time_step
    }

    pub fn inc_time_step(&mut self) {
        self.time_step += 1;
    }

    pub fn node_time_step(&self, id: NodeId) -> usize {
        self.record(id).time_step
    }

    // --- Node registration ---

    pub(crate) fn record(&self, id: NodeId) -> &NodeRecord<T> {
        match self.nodes.get(id.0) {
            Some(record) => record,
            None => fatal(GradError::UnknownNode(id.0)),
        }
    }

    pub(crate) fn push(&mut self, kind: NodeKind<T>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeRecord {
            kind,
            grad: GradSlot::new(),
            name: None,
            time_step: self.time_step,
        });
        id
    }

    /// Registers a leaf holding `value`.
    pub fn new_variable(&mut self, value: Matrix<T>, requires_grad: bool) -> NodeId {
        self.push(NodeKind::Variable {
            value: Arc::new(value),
            requires_grad,
        })
    }

    /// Registers a `1x1` leaf that does not require gradients.
    pub fn new_scalar(&mut self, value: T) -> NodeId {
        self.new_variable(Matrix::scalar(value), false)
    }

    /// Same as [`new_scalar`](Graph::new_scalar) from an `f64` literal.
    pub fn constant(&mut self, value: f64) -> NodeId {
        self.new_scalar(T::cast(value))
    }

    /// Returns the node standing for `param` in this graph, creating it on
    /// first use. The node reads the value the param has at that moment.
    pub fn param(&mut self, param: &Arc<Param<T>>) -> NodeId {
        let key = Arc::as_ptr(param) as usize;
        if let Some(&id) = self.params.get(&key) {
            return id;
        }
        let id = self.push(NodeKind::Param {
            param: Arc::clone(param),
            value: param.value(),
        });
        if let Some(name) = param.name() {
            self.nodes[id.0].name = Some(name.to_string());
        }
        self.params.insert(key, id);
        id
    }

    /// Registers an operator node. Nothing is computed until its value is read.
    pub fn new_operator(&mut self, function: Function, operands: Vec<NodeId>) -> NodeId {
        function.check_arity(operands.len());
        for &operand in &operands {
            self.record(operand);
        }
        let requires_grad =
            self.mode == GraphMode::Training && operands.iter().any(|&operand| self.requires_grad(operand));
        self.push(NodeKind::Operator {
            function,
            operands,
            value: OnceCell::new(),
            requires_grad,
        })
    }

    pub fn with_name(&mut self, id: NodeId, name: impl Into<String>) -> NodeId {
        self.record(id);
        self.nodes[id.0].name = Some(name.into());
        id
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.record(id).name.as_deref()
    }

    pub fn node(&self, id: NodeId) -> Node<'_, T> {
        self.record(id);
        Node { graph: self, id }
    }

    /// Handles on the given nodes, in order.
    pub fn nodes(&self, ids: &[NodeId]) -> Vec<Node<'_, T>> {
        ids.iter().map(|&id| self.node(id)).collect()
    }

    // --- Forward ---

    /// Value of `id`, computing it and any uncomputed ancestor on first read.
    pub fn value(&self, id: NodeId) -> Arc<Matrix<T>> {
        match &self.record(id).kind {
            NodeKind::Variable { value, .. } | NodeKind::Param { value, .. } => Arc::clone(value),
            NodeKind::Operator { value, .. } => {
                if let Some(v) = value.get() {
                    return Arc::clone(v);
                }
                self.force(id);
                match value.get() {
                    Some(v) => Arc::clone(v),
                    None => fatal(GradError::BackwardBeforeForward { node: id.0 }),
                }
            }
        }
    }

    /// Computes every uncomputed operator `root` depends on, in id order.
    fn force(&self, root: NodeId) {
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let NodeKind::Operator { operands, value, .. } = &self.nodes[id.0].kind {
                if value.get().is_none() {
                    pending.push(id);
                    stack.extend(operands.iter().copied());
                }
            }
        }
        pending.sort_unstable();
        for id in pending {
            if let NodeKind::Operator {
                function,
                operands,
                value,
                ..
            } = &self.nodes[id.0].kind
            {
                value.get_or_init(|| {
                    let xs = self.nodes(operands);
                    let y = function.forward(&xs);
                    self.forward_count.set(self.forward_count.get() + 1);
                    trace!("Forward {} {} -> {:?}", function.name(), id, y.shape());
                    Arc::new(y)
                });
            }
        }
    }

    // --- Gradients ---

    pub fn requires_grad(&self, id: NodeId) -> bool {
        match &self.record(id).kind {
            NodeKind::Variable { requires_grad, .. } | NodeKind::Operator { requires_grad, .. } => *requires_grad,
            NodeKind::Param { param, .. } => param.requires_grad(),
        }
    }

    /// Copy of the gradient accumulated on `id`.
    pub fn grad(&self, id: NodeId) -> Option<Matrix<T>> {
        self.record(id).grad.total.borrow().clone()
    }

    pub fn has_grad(&self, id: NodeId) -> bool {
        self.record(id).grad.total.borrow().is_some()
    }

    /// Adds `gx` to the gradient of `id` and marks it for propagation by the
    /// next backward sweep. Does nothing when `id` does not require gradients.
    pub fn acc_grad(&self, id: NodeId, gx: &Matrix<T>) {
        if !self.requires_grad(id) {
            return;
        }
        let shape = self.value(id).shape();
        let slot = &self.record(id).grad;
        accumulate_grad(&mut slot.total.borrow_mut(), shape, gx, "AccGrad");
        accumulate_grad(&mut slot.pending.borrow_mut(), shape, gx, "AccGrad");
    }

    /// Seeds `id` with `grad` (ones shaped like its value when `None`) and
    /// propagates everything pending from `id` downwards.
    ///
    /// Calling it on several roots accumulates: each contribution is
    /// propagated exactly once.
    pub fn backward(&self, id: NodeId, grad: Option<&Matrix<T>>) {
        if self.mode == GraphMode::Inference || !self.requires_grad(id) {
            return;
        }
        let value = self.value(id);
        match grad {
            Some(g) => self.acc_grad(id, g),
            None => {
                let ones = Matrix::acquire_full(value.rows(), value.cols(), T::one());
                self.acc_grad(id, &ones);
                ones.release();
            }
        }
        self.propagate_from(id);
    }

    /// Propagates whatever gradient is pending anywhere in the graph.
    pub fn backward_all(&self) {
        if self.mode == GraphMode::Inference || self.nodes.is_empty() {
            return;
        }
        self.propagate_from(NodeId(self.nodes.len() - 1));
    }

    fn propagate_from(&self, start: NodeId) {
        let mut visited = 0usize;
        for index in (0..=start.0).rev() {
            let record = &self.nodes[index];
            let pending = record.grad.pending.borrow_mut().take();
            let gy = match pending {
                Some(gy) => gy,
                None => continue,
            };
            visited += 1;
            match &record.kind {
                NodeKind::Variable { .. } => {}
                NodeKind::Param { param, .. } => param.acc_grad(&gy),
                NodeKind::Operator {
                    function,
                    operands,
                    value,
                    ..
                } => {
                    let y = match value.get() {
                        Some(y) => Arc::clone(y),
                        None => fatal(GradError::BackwardBeforeForward { node: index }),
                    };
                    let xs = self.nodes(operands);
                    function.backward(&xs, &y, &gy);
                }
            }
            gy.release();
        }
        debug!("Backward from {} propagated through {} nodes", start, visited);
    }

    /// Releases every node gradient to the pool.
    pub fn zero_grad(&mut self) {
        for record in &self.nodes {
            record.grad.clear();
        }
    }

    /// Releases all buffers the graph owns and removes every node.
    pub fn clear(&mut self) {
        for record in self.nodes.drain(..) {
            record.grad.clear();
            let value = match record.kind {
                NodeKind::Variable { value, .. } => Some(value),
                NodeKind::Operator { value, .. } => value.into_inner(),
                NodeKind::Param { .. } => None,
            };
            if let Some(matrix) = value.and_then(|v| Arc::try_unwrap(v).ok()) {
                matrix.release();
            }
        }
        self.params.clear();
        self.time_step = 0;
        debug!("Graph cleared");
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
