//! Constant tensor payloads
//!
//! Convert between the raw-bytes [`ConstTensor`] a host hands out for
//! compile-time constants and ndarray views passes can inspect.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{FusionError, FusionResult};

use super::dtype::DataType;
use super::shape::numel;

/// A compile-time constant tensor (little-endian raw bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstTensor {
    /// Element type
    pub dtype: DataType,
    /// Dimensions
    pub shape: Vec<i64>,
    /// Raw little-endian element bytes
    pub bytes: Vec<u8>,
}

impl ConstTensor {
    /// Build an f32 constant
    pub fn from_f32(shape: &[i64], values: &[f32]) -> Self {
        Self {
            dtype: DataType::Float32,
            shape: shape.to_vec(),
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Build an i64 constant
    pub fn from_i64(shape: &[i64], values: &[i64]) -> Self {
        Self {
            dtype: DataType::Int64,
            shape: shape.to_vec(),
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Number of elements implied by the shape
    pub fn len(&self) -> usize {
        numel(&self.shape)
    }

    /// True when the shape has a zero dimension
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode into an f32 array
    pub fn to_array_f32(&self) -> FusionResult<ArrayD<f32>> {
        let expected = self.len();
        let data: Vec<f32> = match self.dtype {
            DataType::Float32 => decode(&self.bytes, expected, |c| {
                f32::from_le_bytes([c[0], c[1], c[2], c[3]])
            })?,
            DataType::Float64 => decode(&self.bytes, expected, |c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            })?,
            DataType::Int32 => decode(&self.bytes, expected, |c| {
                i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32
            })?,
            DataType::Int8 => decode(&self.bytes, expected, |c| c[0] as i8 as f32)?,
            other => {
                return Err(FusionError::InvalidTensor(format!(
                    "cannot read {:?} constant as f32",
                    other
                )))
            }
        };
        into_array(&self.shape, data)
    }

    /// Decode into an i64 array
    pub fn to_array_i64(&self) -> FusionResult<ArrayD<i64>> {
        let expected = self.len();
        let data: Vec<i64> = match self.dtype {
            DataType::Int64 => decode(&self.bytes, expected, |c| {
                i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })?,
            DataType::Int32 => decode(&self.bytes, expected, |c| {
                i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64
            })?,
            other => {
                return Err(FusionError::InvalidTensor(format!(
                    "cannot read {:?} constant as i64",
                    other
                )))
            }
        };
        into_array(&self.shape, data)
    }
}

fn decode<T>(bytes: &[u8], expected: usize, f: impl Fn(&[u8]) -> T) -> FusionResult<Vec<T>> {
    if expected == 0 {
        return Ok(Vec::new());
    }
    let width = bytes.len() / expected;
    if width == 0 || bytes.len() % expected != 0 {
        return Err(FusionError::InvalidTensor(format!(
            "{} bytes cannot hold {} elements",
            bytes.len(),
            expected
        )));
    }
    Ok(bytes.chunks_exact(width).map(f).collect())
}

fn into_array<T>(shape: &[i64], data: Vec<T>) -> FusionResult<ArrayD<T>> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    Array::from_shape_vec(IxDyn(&dims), data).map_err(|e| FusionError::InvalidTensor(e.to_string()))
}
