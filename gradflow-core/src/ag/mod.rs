//! Reverse-mode automatic differentiation.
//!
//! A [`Graph`] records operations as they are built, evaluates them lazily
//! and propagates gradients back to its leaves: [`Variable`]-like nodes
//! created with [`Graph::new_variable`] and params reified with
//! [`Graph::param`].

pub mod function;
pub mod gradcheck;
pub mod graph;
pub mod node;
pub mod operand;
mod operators;
pub mod variable;

pub use function::{Function, ParametricKind, UnaryKind};
pub use gradcheck::{check_grad, GradCheckError, GradCheckOptions};
pub use graph::{Graph, GraphMode, GraphOptions};
pub use node::{Node, NodeId};
pub use operand::Operand;
pub use variable::Variable;
