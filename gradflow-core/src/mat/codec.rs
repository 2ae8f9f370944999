//! Binary encoding of matrices.
//!
//! Layout: `[u8 dtype tag][u32 LE rows][u32 LE cols][rows * cols LE elements]`.
//! Decoding untyped data goes through [`decode_any`], which looks the tag up in
//! a fixed table of decoders.

use std::io::{Read, Write};

use crate::error::GradError;
use crate::mat::matrix::Matrix;
use crate::mat::numeric::{DType, Float};

/// A decoded matrix whose element width was only known from its tag.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMatrix {
    F32(Matrix<f32>),
    F64(Matrix<f64>),
}

impl AnyMatrix {
    pub fn dtype(&self) -> DType {
        match self {
            AnyMatrix::F32(_) => DType::F32,
            AnyMatrix::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            AnyMatrix::F32(m) => m.shape(),
            AnyMatrix::F64(m) => m.shape(),
        }
    }
}

type Decoder = fn(&mut dyn Read) -> Result<AnyMatrix, GradError>;

const DECODERS: [(DType, Decoder); 2] = [(DType::F32, decode_f32), (DType::F64, decode_f64)];

fn decode_f32(r: &mut dyn Read) -> Result<AnyMatrix, GradError> {
    read_body::<f32>(r).map(AnyMatrix::F32)
}

fn decode_f64(r: &mut dyn Read) -> Result<AnyMatrix, GradError> {
    read_body::<f64>(r).map(AnyMatrix::F64)
}

pub(crate) fn read_u8(r: &mut dyn Read, what: &str) -> Result<u8, GradError> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf, what)?;
    Ok(buf[0])
}

pub(crate) fn read_u32(r: &mut dyn Read, what: &str) -> Result<u32, GradError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_i64(r: &mut dyn Read, what: &str) -> Result<i64, GradError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf, what)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_exact(r: &mut dyn Read, buf: &mut [u8], what: &str) -> Result<(), GradError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => GradError::UnexpectedEof(what.to_string()),
        _ => GradError::from(e),
    })
}

fn read_body<T: Float>(r: &mut dyn Read) -> Result<Matrix<T>, GradError> {
    let rows = read_u32(r, "matrix rows")? as usize;
    let cols = read_u32(r, "matrix cols")? as usize;
    let byte_len = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(T::DTYPE.size_of()))
        .ok_or(GradError::InvalidShape { rows, cols })?;

    // Read through `take` so a corrupt header cannot trigger a huge allocation
    // before the data is known to exist.
    let mut bytes = Vec::new();
    (&mut *r).take(byte_len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != byte_len {
        return Err(GradError::UnexpectedEof(format!(
            "matrix data: expected {} bytes, got {}",
            byte_len,
            bytes.len()
        )));
    }
    let data = bytes.chunks_exact(T::DTYPE.size_of()).map(T::read_le).collect();
    Ok(Matrix::new(rows, cols, data))
}

/// Writes `m` in the matrix binary layout.
pub fn marshal_binary_matrix<T: Float, W: Write + ?Sized>(m: &Matrix<T>, w: &mut W) -> Result<(), GradError> {
    let (rows, cols) = m.shape();
    let rows32 = u32::try_from(rows).map_err(|_| GradError::InvalidShape { rows, cols })?;
    let cols32 = u32::try_from(cols).map_err(|_| GradError::InvalidShape { rows, cols })?;

    let mut buf = Vec::with_capacity(9 + m.size() * T::DTYPE.size_of());
    buf.push(T::DTYPE.tag());
    buf.extend_from_slice(&rows32.to_le_bytes());
    buf.extend_from_slice(&cols32.to_le_bytes());
    for &v in m.data() {
        v.write_le(&mut buf);
    }
    w.write_all(&buf)?;
    Ok(())
}

/// Reads a matrix of element type `T`. A tag naming another width is an error.
pub fn unmarshal_binary_matrix<T: Float, R: Read + ?Sized>(r: &mut R) -> Result<Matrix<T>, GradError> {
    let mut r = ReadAdapter(r);
    let actual = DType::from_tag(read_u8(&mut r, "matrix dtype")?)?;
    if actual != T::DTYPE {
        return Err(GradError::DTypeMismatch {
            expected: T::DTYPE,
            actual,
        });
    }
    read_body::<T>(&mut r)
}

/// Reads a matrix of whichever width its tag announces.
pub fn decode_any<R: Read + ?Sized>(r: &mut R) -> Result<AnyMatrix, GradError> {
    let mut r = ReadAdapter(r);
    let dtype = DType::from_tag(read_u8(&mut r, "matrix dtype")?)?;
    let (_, decode) = DECODERS
        .iter()
        .find(|(d, _)| *d == dtype)
        .ok_or(GradError::UnknownDType(dtype.tag()))?;
    decode(&mut r)
}

/// Lets unsized readers be handed out as `&mut dyn Read`.
struct ReadAdapter<'a, R: Read + ?Sized>(&'a mut R);

impl<R: Read + ?Sized> Read for ReadAdapter<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}
