use std::io::{Read, Write};

use crate::error::GradError;
use crate::mat::codec::{read_i64, read_u32};
use crate::mat::{marshal_binary_matrix, unmarshal_binary_matrix, Float, Matrix};

/// Optimizer state attached to a [`Param`](crate::nn::Param).
///
/// `label` identifies the method that owns the data, so a payload created by
/// one optimizer is never misread by another.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload<T: Float> {
    pub label: i64,
    pub data: Vec<Matrix<T>>,
}

impl<T: Float> Default for Payload<T> {
    fn default() -> Self {
        Payload {
            label: 0,
            data: Vec::new(),
        }
    }
}

impl<T: Float> Payload<T> {
    pub fn new(label: i64, data: Vec<Matrix<T>>) -> Self {
        Payload { label, data }
    }

    /// Releases every matrix to the pool.
    pub fn clear_data(&mut self) {
        for m in self.data.drain(..) {
            m.release();
        }
    }

    /// `[i64 LE label][u32 LE count][count matrices]`
    pub fn marshal_binary<W: Write + ?Sized>(&self, w: &mut W) -> Result<(), GradError> {
        let count = u32::try_from(self.data.len()).map_err(|_| GradError::InvalidArgument {
            operation: "Payload::marshal_binary".to_string(),
            message: format!("too many matrices: {}", self.data.len()),
        })?;
        w.write_all(&self.label.to_le_bytes())?;
        w.write_all(&count.to_le_bytes())?;
        for m in &self.data {
            marshal_binary_matrix(m, w)?;
        }
        Ok(())
    }

    pub fn unmarshal_binary<R: Read>(r: &mut R) -> Result<Self, GradError> {
        let label = read_i64(r, "payload label")?;
        let count = read_u32(r, "payload count")? as usize;
        // Capacity is bounded since every matrix needs at least 9 bytes.
        let mut data = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            data.push(unmarshal_binary_matrix(r)?);
        }
        Ok(Payload { label, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip() {
        let payload = Payload::new(
            -3,
            vec![Matrix::new(1, 2, vec![0.5f64, -0.25]), Matrix::scalar(7.0)],
        );
        let mut buf = Vec::new();
        payload.marshal_binary(&mut buf).unwrap();
        assert_eq!(&buf[..8], &(-3i64).to_le_bytes());
        assert_eq!(&buf[8..12], &2u32.to_le_bytes());
        let decoded = Payload::<f64>::unmarshal_binary(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_truncated_payload() {
        let payload = Payload::new(1, vec![Matrix::scalar(1.0f32)]);
        let mut buf = Vec::new();
        payload.marshal_binary(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);
        let err = Payload::<f32>::unmarshal_binary(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, GradError::UnexpectedEof(_)));
    }

    #[test]
    fn test_clear_data() {
        let mut payload = Payload::new(2, vec![Matrix::<f64>::zeros(2, 2)]);
        payload.clear_data();
        assert!(payload.data.is_empty());
        assert_eq!(payload.label, 2);
    }
}
