use num_traits::NumAssignOps;
use once_cell::sync::Lazy;
use std::fmt::{Debug, Display};

use crate::error::GradError;
use crate::mat::pool::MatrixPool;

/// Element width of a matrix, also used as the tag of the binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating-point type.
    F32,
    /// 64-bit floating-point type.
    F64,
}

impl DType {
    /// Tag written in front of every encoded matrix.
    pub fn tag(self) -> u8 {
        match self {
            DType::F32 => 1,
            DType::F64 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, GradError> {
        match tag {
            1 => Ok(DType::F32),
            2 => Ok(DType::F64),
            other => Err(GradError::UnknownDType(other)),
        }
    }

    /// Size in bytes of one element.
    pub fn size_of(self) -> usize {
        match self {
            DType::F32 => std::mem::size_of::<f32>(),
            DType::F64 => std::mem::size_of::<f64>(),
        }
    }
}

/// The floating-point element types a [`Matrix`](crate::mat::Matrix) can hold.
///
/// Besides the arithmetic provided by `num_traits::Float`, every width knows
/// its [`DType`] tag, how to encode itself in little endian, and which
/// process-wide [`MatrixPool`] recycles its buffers.
pub trait Float:
    num_traits::Float + NumAssignOps + Default + Debug + Display + Send + Sync + 'static
{
    const DTYPE: DType;

    /// Lossy conversion from an `f64` literal or hyper-parameter.
    fn cast(v: f64) -> Self;

    fn as_f64(self) -> f64;

    fn write_le(self, out: &mut Vec<u8>);

    /// Reads one element from exactly `Self::DTYPE.size_of()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// The shared pool recycling buffers of this width.
    fn pool() -> &'static MatrixPool<Self>;
}

static F32_POOL: Lazy<MatrixPool<f32>> = Lazy::new(MatrixPool::new);
static F64_POOL: Lazy<MatrixPool<f64>> = Lazy::new(MatrixPool::new);

impl Float for f32 {
    const DTYPE: DType = DType::F32;

    fn cast(v: f64) -> Self {
        v as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(raw)
    }

    fn pool() -> &'static MatrixPool<f32> {
        &F32_POOL
    }
}

impl Float for f64 {
    const DTYPE: DType = DType::F64;

    fn cast(v: f64) -> Self {
        v
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }

    fn pool() -> &'static MatrixPool<f64> {
        &F64_POOL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Float>(v: T) -> T {
        let mut buf = Vec::new();
        v.write_le(&mut buf);
        assert_eq!(buf.len(), T::DTYPE.size_of());
        T::read_le(&buf)
    }

    #[test]
    fn test_dtype_tags() {
        assert_eq!(DType::from_tag(DType::F32.tag()), Ok(DType::F32));
        assert_eq!(DType::from_tag(DType::F64.tag()), Ok(DType::F64));
        assert_eq!(DType::from_tag(9), Err(GradError::UnknownDType(9)));
    }

    #[test]
    fn test_le_roundtrip_is_bit_exact() {
        assert_eq!(roundtrip(0.1f32).to_bits(), 0.1f32.to_bits());
        assert_eq!(roundtrip(-1.0e-300f64).to_bits(), (-1.0e-300f64).to_bits());
        assert!(roundtrip(f64::NAN).is_nan());
    }
}
