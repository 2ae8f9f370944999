//! Dense matrices, their element types, the buffer pool and the binary codec.

pub mod codec;
pub mod matrix;
pub mod numeric;
pub mod pool;

pub use codec::{decode_any, marshal_binary_matrix, unmarshal_binary_matrix, AnyMatrix};
pub use matrix::Matrix;
pub use numeric::{DType, Float};
pub use pool::{FillPolicy, MatrixPool, PoolConfig, PoolStats};

/// Takes a matrix from the process-wide pool of element type `T`.
pub fn acquire<T: Float>(rows: usize, cols: usize, fill: FillPolicy) -> Matrix<T> {
    T::pool().acquire(rows, cols, fill)
}

/// Returns a matrix to the process-wide pool of element type `T`.
pub fn release<T: Float>(m: Matrix<T>) {
    T::pool().release(m)
}
