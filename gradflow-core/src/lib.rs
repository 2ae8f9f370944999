//! Reverse-mode automatic differentiation over dense matrices.
//!
//! [`Graph`] records operations between matrices and computes their
//! gradients; [`Param`] holds trainable values shared by any number of
//! graphs, possibly on different threads.

pub mod ag;
pub mod error;
pub mod mat;
pub mod nn;

pub use ag::{Graph, GraphMode, GraphOptions, Node, NodeId, Operand, Variable};
pub use error::GradError;
pub use mat::{DType, Float, Matrix};
pub use nn::{Param, ParamKind, Payload};
// Re-export traits required by public functions/structs
pub use num_traits;
