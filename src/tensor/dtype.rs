//! Data types and memory formats of tensor descriptors

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};

/// Element data type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// Unknown / not yet inferred
    #[default]
    Undefined,
    /// 32-bit float
    Float32,
    /// 16-bit float
    Float16,
    /// bfloat16
    BFloat16,
    /// 64-bit float
    Float64,
    /// 8-bit signed int
    Int8,
    /// 16-bit signed int
    Int16,
    /// 32-bit signed int
    Int32,
    /// 64-bit signed int
    Int64,
    /// 8-bit unsigned int
    UInt8,
    /// 64-bit unsigned int
    UInt64,
    /// Boolean
    Bool,
}

impl DataType {
    /// Canonical type name, e.g. `DT_FLOAT16`
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Undefined => "DT_UNDEFINED",
            DataType::Float32 => "DT_FLOAT",
            DataType::Float16 => "DT_FLOAT16",
            DataType::BFloat16 => "DT_BF16",
            DataType::Float64 => "DT_DOUBLE",
            DataType::Int8 => "DT_INT8",
            DataType::Int16 => "DT_INT16",
            DataType::Int32 => "DT_INT32",
            DataType::Int64 => "DT_INT64",
            DataType::UInt8 => "DT_UINT8",
            DataType::UInt64 => "DT_UINT64",
            DataType::Bool => "DT_BOOL",
        }
    }

    /// Size in bytes of one element
    pub fn size_in_bytes(self) -> FusionResult<usize> {
        match self {
            DataType::Float32 | DataType::Int32 => Ok(4),
            DataType::Float16 | DataType::BFloat16 | DataType::Int16 => Ok(2),
            DataType::Float64 | DataType::Int64 | DataType::UInt64 => Ok(8),
            DataType::Int8 | DataType::UInt8 | DataType::Bool => Ok(1),
            DataType::Undefined => Err(FusionError::InvalidTensor(
                "undefined data type has no size".to_string(),
            )),
        }
    }

    /// Check if data type is floating point
    pub fn is_float(self) -> bool {
        matches!(
            self,
            DataType::Float32 | DataType::Float16 | DataType::BFloat16 | DataType::Float64
        )
    }

    /// Check if data type is integer
    pub fn is_int(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt64
        )
    }
}

/// Memory layout of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Format {
    /// Plain N-dimensional
    #[default]
    Nd,
    /// Batch, channel, height, width
    Nchw,
    /// Batch, height, width, channel
    Nhwc,
    /// Channel-split 5D layout used by cube units
    Nc1hwc0,
    /// Fractal NZ matrix layout
    FractalNz,
    /// Fractal Z weight layout
    FractalZ,
}

impl Format {
    /// Canonical format name, e.g. `NC1HWC0`
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Nd => "ND",
            Format::Nchw => "NCHW",
            Format::Nhwc => "NHWC",
            Format::Nc1hwc0 => "NC1HWC0",
            Format::FractalNz => "FRACTAL_NZ",
            Format::FractalZ => "FRACTAL_Z",
        }
    }

    /// Index of the channel axis in this layout, when it has one
    pub fn channel_axis(self) -> Option<i64> {
        match self {
            Format::Nchw | Format::Nc1hwc0 => Some(1),
            Format::Nhwc => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
