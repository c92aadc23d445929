//! Shape utilities
//!
//! Shapes are `i64` dimension lists; a negative dimension is unknown
//! (dynamic), `-2` conventionally meaning unknown rank.

use crate::error::{FusionError, FusionResult};

/// Calculate total number of elements from shape
pub fn numel(shape: &[i64]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Check if shape contains dynamic dimensions (negative values)
pub fn is_dynamic(shape: &[i64]) -> bool {
    shape.iter().any(|&d| d < 0)
}

/// True for `[]` and `[1]`, the shapes a single shared scale value takes
pub fn is_scalar_like(shape: &[i64]) -> bool {
    shape.is_empty() || shape == [1]
}

/// Apply a permutation to a shape (`out[i] = shape[perm[i]]`)
pub fn permute(shape: &[i64], perm: &[i64]) -> FusionResult<Vec<i64>> {
    if perm.len() != shape.len() {
        return Err(FusionError::InvalidTensor(format!(
            "permutation {:?} does not match rank {}",
            perm,
            shape.len()
        )));
    }

    let mut seen = vec![false; shape.len()];
    let mut out = Vec::with_capacity(shape.len());
    for &p in perm {
        let axis = normalize_axis(p, shape.len())?;
        if std::mem::replace(&mut seen[axis], true) {
            return Err(FusionError::InvalidTensor(format!(
                "permutation {:?} repeats axis {}",
                perm, axis
            )));
        }
        out.push(shape[axis]);
    }

    Ok(out)
}

/// Normalize axis to positive index
pub fn normalize_axis(axis: i64, ndim: usize) -> FusionResult<usize> {
    let ndim_i64 = ndim as i64;
    let normalized = if axis < 0 { axis + ndim_i64 } else { axis };

    if normalized < 0 || normalized >= ndim_i64 {
        return Err(FusionError::InvalidTensor(format!(
            "Axis {} out of bounds for ndim {}",
            axis, ndim
        )));
    }

    Ok(normalized as usize)
}
