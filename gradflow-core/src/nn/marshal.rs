//! Binary persistence of params.
//!
//! A param is encoded as `[value matrix][u8 payload flag][payload if flag is 1]`.
//! [`write_param`] wraps that in `[u8 present flag][u32 LE length][bytes]` so an
//! optional param can be stored inline in a larger stream; an absent param is
//! a single zero byte.

use std::io::{Cursor, Read, Write};

use crate::error::GradError;
use crate::mat::codec::{read_u32, read_u8};
use crate::mat::{marshal_binary_matrix, unmarshal_binary_matrix, Float, Matrix};
use crate::nn::param::Param;
use crate::nn::payload::Payload;

fn read_presence(r: &mut dyn Read, what: &str) -> Result<bool, GradError> {
    match read_u8(r, what)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GradError::InvalidPresenceFlag(other)),
    }
}

/// Decodes value and payload from `data`, which must be consumed entirely.
fn decode<T: Float>(data: &[u8]) -> Result<(Matrix<T>, Option<Payload<T>>), GradError> {
    let mut cursor = Cursor::new(data);
    let value = unmarshal_binary_matrix(&mut cursor)?;
    let payload = if read_presence(&mut cursor, "payload flag")? {
        Some(Payload::unmarshal_binary(&mut cursor)?)
    } else {
        None
    };
    let remaining = data.len() - cursor.position() as usize;
    if remaining != 0 {
        return Err(GradError::TrailingBytes(remaining));
    }
    Ok((value, payload))
}

impl<T: Float> Param<T> {
    pub fn marshal_binary(&self) -> Result<Vec<u8>, GradError> {
        let mut buf = Vec::new();
        marshal_binary_matrix(&self.value(), &mut buf)?;
        match self.payload() {
            None => buf.push(0),
            Some(payload) => {
                buf.push(1);
                payload.marshal_binary(&mut buf)?;
            }
        }
        Ok(buf)
    }

    /// A new param holding the decoded value and payload. Name and kind are
    /// not part of the encoding.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, GradError> {
        let (value, payload) = decode(data)?;
        let param = Param::new(value);
        if let Some(payload) = payload {
            param.set_payload(payload);
        }
        Ok(param)
    }

    /// Overwrites value and payload with the decoded ones. The gradient is
    /// cleared. On error the param is left untouched.
    pub fn load_binary(&self, data: &[u8]) -> Result<(), GradError> {
        let (value, payload) = decode(data)?;
        self.replace_value(value);
        if let Some(payload) = payload {
            self.set_payload(payload);
        }
        Ok(())
    }
}

/// Writes an optional param with its presence flag and length prefix.
pub fn write_param<T: Float, W: Write + ?Sized>(param: Option<&Param<T>>, w: &mut W) -> Result<(), GradError> {
    let param = match param {
        Some(param) => param,
        None => {
            w.write_all(&[0])?;
            return Ok(());
        }
    };
    let bin = param.marshal_binary()?;
    let len = u32::try_from(bin.len()).map_err(|_| GradError::InvalidArgument {
        operation: "write_param".to_string(),
        message: format!("encoded param of {} bytes does not fit a u32 length", bin.len()),
    })?;
    w.write_all(&[1])?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&bin)?;
    Ok(())
}

/// Reads the length-prefixed body that follows a set presence flag.
fn read_body<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>, GradError> {
    if !read_presence(r, "param flag")? {
        return Ok(None);
    }
    let declared = read_u32(r, "param length")? as usize;
    let mut bin = Vec::new();
    r.take(declared as u64).read_to_end(&mut bin)?;
    if bin.len() != declared {
        return Err(GradError::UnexpectedEof(format!(
            "param body: expected {} bytes, got {}",
            declared,
            bin.len()
        )));
    }
    Ok(Some(bin))
}

/// Reads a param written by [`write_param`]; `None` if it was absent.
pub fn read_param<T: Float, R: Read>(r: &mut R) -> Result<Option<Param<T>>, GradError> {
    match read_body(r)? {
        Some(bin) => Param::unmarshal_binary(&bin).map(Some),
        None => Ok(None),
    }
}

/// Reads a param written by [`write_param`] into `dest`. An absent param
/// leaves `dest` untouched. Returns whether a param was present.
pub fn read_param_into<T: Float, R: Read>(r: &mut R, dest: &Param<T>) -> Result<bool, GradError> {
    match read_body(r)? {
        Some(bin) => dest.load_binary(&bin).map(|_| true),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Param<f64> {
        Param::new(Matrix::new(2, 2, vec![0.1, -0.2, 0.3, 1e-10]))
    }

    #[test]
    fn test_layout_without_payload() {
        let bin = sample().marshal_binary().unwrap();
        assert_eq!(bin.len(), 9 + 4 * 8 + 1);
        assert_eq!(*bin.last().unwrap(), 0);
    }

    #[test]
    fn test_roundtrip_with_payload() {
        let p = sample();
        p.set_payload(Payload::new(2, vec![Matrix::zeros(2, 2), Matrix::full(2, 2, 0.5)]));
        let restored = Param::<f64>::unmarshal_binary(&p.marshal_binary().unwrap()).unwrap();
        assert_eq!(*restored.value(), *p.value());
        assert_eq!(restored.payload(), p.payload());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bin = sample().marshal_binary().unwrap();
        bin.push(42);
        assert_eq!(Param::<f64>::unmarshal_binary(&bin).unwrap_err(), GradError::TrailingBytes(1));
    }

    #[test]
    fn test_invalid_flag() {
        let mut bin = sample().marshal_binary().unwrap();
        *bin.last_mut().unwrap() = 5;
        assert_eq!(Param::<f64>::unmarshal_binary(&bin).unwrap_err(), GradError::InvalidPresenceFlag(5));
    }

    #[test]
    fn test_wrapper_absent_and_present() {
        let mut buf = Vec::new();
        write_param::<f64, _>(None, &mut buf).unwrap();
        assert_eq!(buf, vec![0]);
        write_param(Some(&sample()), &mut buf).unwrap();

        let mut r = Cursor::new(&buf);
        assert!(read_param::<f64, _>(&mut r).unwrap().is_none());
        let p = read_param::<f64, _>(&mut r).unwrap().unwrap();
        assert_eq!(*p.value(), *sample().value());
    }

    #[test]
    fn test_read_into_replaces_value_and_clears_grad() {
        let mut buf = Vec::new();
        write_param(Some(&sample()), &mut buf).unwrap();

        let dest = Param::new(Matrix::<f64>::zeros(1, 1)).with_name("w");
        dest.acc_grad(&Matrix::scalar(1.0));
        assert!(read_param_into(&mut Cursor::new(&buf), &dest).unwrap());
        assert_eq!(dest.value().shape(), (2, 2));
        assert!(!dest.has_grad());
        assert_eq!(dest.name(), Some("w"));
    }

    #[test]
    fn test_truncated_wrapper() {
        let mut buf = Vec::new();
        write_param(Some(&sample()), &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = read_param::<f64, _>(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, GradError::UnexpectedEof(_)));
    }
}
