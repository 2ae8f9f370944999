use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::ag::function::Function;
use crate::ag::graph::Graph;
use crate::ag::operand::Operand;
use crate::mat::{Float, Matrix};
use crate::nn::Param;

/// Index of a node inside its [`Graph`]. Ids grow with creation order and an
/// operator's operands always have smaller ids than the operator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) enum NodeKind<T: Float> {
    Variable {
        value: Arc<Matrix<T>>,
        requires_grad: bool,
    },
    /// A shared param seen through this graph. `value` is the snapshot taken
    /// when the param was reified.
    Param {
        param: Arc<Param<T>>,
        value: Arc<Matrix<T>>,
    },
    Operator {
        function: Function,
        operands: Vec<NodeId>,
        value: OnceCell<Arc<Matrix<T>>>,
        requires_grad: bool,
    },
}

/// Gradient storage of one node.
///
/// `total` is what [`Operand::grad`] reports. `pending` holds the part that
/// has not been propagated to the operands yet; a backward sweep drains it.
pub(crate) struct GradSlot<T: Float> {
    pub(crate) total: RefCell<Option<Matrix<T>>>,
    pub(crate) pending: RefCell<Option<Matrix<T>>>,
}

impl<T: Float> GradSlot<T> {
    pub(crate) fn new() -> Self {
        GradSlot {
            total: RefCell::new(None),
            pending: RefCell::new(None),
        }
    }

    pub(crate) fn clear(&self) {
        for cell in [&self.total, &self.pending] {
            if let Some(grad) = cell.borrow_mut().take() {
                grad.release();
            }
        }
    }
}

pub(crate) struct NodeRecord<T: Float> {
    pub(crate) kind: NodeKind<T>,
    pub(crate) grad: GradSlot<T>,
    pub(crate) name: Option<String>,
    pub(crate) time_step: usize,
}

/// Borrowed handle on a node, usable wherever an [`Operand`] is expected.
#[derive(Clone, Copy)]
pub struct Node<'g, T: Float> {
    pub(crate) graph: &'g Graph<T>,
    pub(crate) id: NodeId,
}

impl<'g, T: Float> Node<'g, T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &'g Graph<T> {
        self.graph
    }

    pub fn name(&self) -> Option<&'g str> {
        self.graph.name(self.id)
    }

    pub fn time_step(&self) -> usize {
        self.graph.node_time_step(self.id)
    }

    /// The function of an operator node, `None` for leaves.
    pub fn function(&self) -> Option<&'g Function> {
        match &self.graph.record(self.id).kind {
            NodeKind::Operator { function, .. } => Some(function),
            _ => None,
        }
    }
}

impl<T: Float> fmt::Debug for Node<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("function", &self.function().map(Function::name))
            .finish()
    }
}

impl<T: Float> Operand<T> for Node<'_, T> {
    fn value(&self) -> Arc<Matrix<T>> {
        self.graph.value(self.id)
    }

    fn requires_grad(&self) -> bool {
        self.graph.requires_grad(self.id)
    }

    fn grad(&self) -> Option<Matrix<T>> {
        self.graph.grad(self.id)
    }

    fn has_grad(&self) -> bool {
        self.graph.has_grad(self.id)
    }

    fn acc_grad(&self, gx: &Matrix<T>) {
        self.graph.acc_grad(self.id, gx)
    }
}
