//! Tensor descriptors and helpers
//!
//! - Data types and memory formats (`dtype`)
//! - Shape utilities (`shape`)
//! - Constant tensor payloads and ndarray conversion (`convert`)
//!
//! The engine never infers descriptors. Whenever a rewrite splices a node in
//! or out, the descriptor on the newly exposed edge is copied or recomputed
//! explicitly from a [`TensorDesc`].

pub mod convert;
pub mod dtype;
pub mod shape;

pub use convert::ConstTensor;
pub use dtype::{DataType, Format};
pub use shape::{is_dynamic, is_scalar_like, normalize_axis, numel, permute};

/// Descriptor of one input or output tensor of a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TensorDesc {
    /// Runtime shape
    pub shape: Vec<i64>,
    /// Shape before any layout transformation
    pub origin_shape: Vec<i64>,
    /// Runtime format
    pub format: Format,
    /// Format before any layout transformation
    pub origin_format: Format,
    /// Element type
    pub dtype: DataType,
    /// Per-dimension `(min, max)` range for dynamic shapes
    pub shape_range: Vec<(i64, i64)>,
}

impl TensorDesc {
    /// Descriptor with identical runtime and origin shape/format
    pub fn new(shape: &[i64], format: Format, dtype: DataType) -> Self {
        Self {
            shape: shape.to_vec(),
            origin_shape: shape.to_vec(),
            format,
            origin_format: format,
            dtype,
            shape_range: Vec::new(),
        }
    }

    /// Plain ND float32 descriptor
    pub fn nd(shape: &[i64]) -> Self {
        Self::new(shape, Format::Nd, DataType::Float32)
    }

    /// True when the runtime shape has unknown dimensions
    pub fn is_dynamic(&self) -> bool {
        is_dynamic(&self.shape)
    }

    /// Copy of this descriptor with another dtype
    pub fn with_dtype(&self, dtype: DataType) -> Self {
        Self {
            dtype,
            ..self.clone()
        }
    }

    /// Copy of this descriptor with both shapes permuted by `perm`
    pub fn permuted(&self, perm: &[i64]) -> crate::error::FusionResult<Self> {
        let origin_shape = if self.origin_shape.len() == perm.len() {
            permute(&self.origin_shape, perm)?
        } else {
            self.origin_shape.clone()
        };
        Ok(Self {
            shape: permute(&self.shape, perm)?,
            origin_shape,
            shape_range: if self.shape_range.len() == perm.len() {
                perm.iter()
                    .map(|&p| normalize_axis(p, perm.len()).map(|a| self.shape_range[a]))
                    .collect::<crate::error::FusionResult<_>>()?
            } else {
                self.shape_range.clone()
            },
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permuted_desc() {
        let desc = TensorDesc::new(&[1, 16, 8, 8], Format::Nchw, DataType::Float16);
        let t = desc.permuted(&[0, 2, 3, 1]).unwrap();
        assert_eq!(t.shape, vec![1, 8, 8, 16]);
        assert_eq!(t.origin_shape, vec![1, 8, 8, 16]);
        assert_eq!(t.dtype, DataType::Float16);
    }

    #[test]
    fn test_with_dtype_keeps_shape() {
        let desc = TensorDesc::nd(&[4, -1]);
        let cast = desc.with_dtype(DataType::Float16);
        assert_eq!(cast.shape, vec![4, -1]);
        assert!(cast.is_dynamic());
        assert_eq!(cast.dtype, DataType::Float16);
    }
}
