use crate::mat::DType;
use thiserror::Error;

/// Error type for the gradflow engine.
///
/// Two families live here. Decoding variants (`UnexpectedEof`, `UnknownDType`,
/// ...) are returned to callers as ordinary `Result` errors. Invariant variants
/// (`ShapeMismatch`, `EmptyOperands`, ...) describe graph-construction defects;
/// they are never returned, they are passed to [`fatal`] which aborts the
/// current unit of work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradError {
    #[error("Shape mismatch during operation {operation}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        operation: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Operation {0} requires at least one operand")]
    EmptyOperands(String),

    #[error("Backward reached node {node} before its forward value was computed")]
    BackwardBeforeForward { node: usize },

    #[error("Invalid logarithm of negative value {0}")]
    NegativeLogarithm(f64),

    #[error("Operation {0} received a NaN operand")]
    NotANumber(String),

    #[error("Operation {operation} expects a scalar, got a {rows}x{cols} matrix")]
    NotAScalar {
        operation: String,
        rows: usize,
        cols: usize,
    },

    #[error("Index out of bounds: ({row}, {col}) for shape {shape:?}")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        shape: (usize, usize),
    },

    #[error("Node {0} does not belong to this graph")]
    UnknownNode(usize),

    #[error("Invalid argument for {operation}: {message}")]
    InvalidArgument { operation: String, message: String },

    #[error("Unexpected end of data while decoding {0}")]
    UnexpectedEof(String),

    #[error("Unknown dtype tag {0}")]
    UnknownDType(u8),

    #[error("Data type mismatch: expected {expected:?}, found {actual:?}")]
    DTypeMismatch { expected: DType, actual: DType },

    #[error("Invalid presence flag {0}, expected 0 or 1")]
    InvalidPresenceFlag(u8),

    #[error("Encoded shape {rows}x{cols} is too large")]
    InvalidShape { rows: usize, cols: usize },

    #[error("{0} unexpected trailing bytes after decoding")]
    TrailingBytes(usize),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GradError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => GradError::UnexpectedEof(err.to_string()),
            _ => GradError::Io(err.to_string()),
        }
    }
}

/// Aborts the current computation on an invariant violation.
///
/// The error is logged before panicking so that worker threads whose panics
/// are caught still leave a trace of the offending operation.
#[track_caller]
pub fn fatal(err: GradError) -> ! {
    log::error!("gradflow invariant violation: {}", err);
    panic!("{}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_eof_maps_to_unexpected_eof() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(matches!(GradError::from(io), GradError::UnexpectedEof(_)));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(GradError::from(other), GradError::Io("boom".to_string()));
    }

    #[test]
    #[should_panic(expected = "Shape mismatch during operation Add: expected (2, 2), got (3, 1)")]
    fn test_fatal_panics_with_context() {
        fatal(GradError::ShapeMismatch {
            operation: "Add".to_string(),
            expected: (2, 2),
            actual: (3, 1),
        });
    }
}
