use crate::pattern::{BranchMode, BufferFusionPattern, OpCategory};

use super::common::FusionPass;

const PATTERN_CONV: &str = "convolution";
const PATTERN_ELEMWISE1: &str = "elemwise1";
const PATTERN_ELEMWISE2: &str = "elemwise2";

/// Fuses a convolution with up to two trailing elementwise ops
///
/// Matches:
///   Conv2D -> ElemWise? -> ElemWise?
/// Every link is single-consumer. Split info is the intersection of the
/// members' own split maps.
#[derive(Debug, Default)]
pub struct ConvElemwiseFusion;

impl ConvElemwiseFusion {
    /// Create a new pass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for ConvElemwiseFusion {
    fn name(&self) -> &str {
        "ConvElemwiseFusion"
    }

    fn define_patterns(&self) -> Vec<BufferFusionPattern> {
        vec![BufferFusionPattern::new("TbeConvElemwiseFusion")
            .add_op_desc(PATTERN_CONV, OpCategory::Convolution, 1, 1)
            .add_op_desc(PATTERN_ELEMWISE1, OpCategory::ElemWise, 1, 1)
            .add_op_desc(PATTERN_ELEMWISE2, OpCategory::ElemWise, 0, 1)
            .set_head(&[PATTERN_CONV])
            .set_outputs(PATTERN_CONV, &[PATTERN_ELEMWISE1], BranchMode::Single)
            .set_outputs(PATTERN_ELEMWISE1, &[PATTERN_ELEMWISE2], BranchMode::Single)]
    }
}
