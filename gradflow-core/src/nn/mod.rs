//! Trainable params shared between graphs, their optimizer payloads, binary
//! persistence and model registration.

pub mod marshal;
pub mod model;
pub mod param;
pub mod payload;

pub use marshal::{read_param, read_param_into, write_param};
pub use model::{Model, ParamRegistry};
pub use param::{Param, ParamKind};
pub use payload::Payload;
