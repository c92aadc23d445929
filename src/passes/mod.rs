//! Fusion passes
//!
//! This module provides the pass interface and ready-to-use passes:
//!
//! - **Fusion**: group adjacent nodes into one kernel scope
//!   (Conv+ElemWise, Conv+Dequant+Add+Quant, BatchMatMul+Dropout)
//! - **Rewrite**: restructure the graph ahead of fusion (MatMul+TransData)
//!
//! # Overview
//!
//! Each pass implements the [`FusionPass`] trait. It declares patterns and
//! decides what to do with each match; the
//! [`FusionEngine`](crate::transform::FusionEngine) does the matching and
//! commits the decision.
//!
//! # Example
//!
//! ```ignore
//! use buffer_fusion::passes::{ConvElemwiseFusion, PassRegistry};
//! use buffer_fusion::transform::FusionEngine;
//!
//! let registry = PassRegistry::new().with_pass(ConvElemwiseFusion::new());
//! let stats = FusionEngine::new().run_passes(&mut graph, &registry)?;
//!
//! println!("Fused {} groups", stats.fusions_committed);
//! ```

/// Common pass interface
pub mod common;
/// BatchMatMul + DropOutDoMaskV3D
pub mod batch_matmul_dropout;
/// Conv2D + AscendDequant + Add + AscendQuant
pub mod conv_dequant_add_quant;
/// Conv2D + elementwise
pub mod conv_elemwise;
/// MatMul + TransData removal
pub mod matmul_transdata;

pub use batch_matmul_dropout::BatchMatmulDropoutFusion;
pub use common::{external_inputs, Decision, FusionPass, PassRegistry};
pub use conv_dequant_add_quant::ConvDequantAddQuantFusion;
pub use conv_elemwise::ConvElemwiseFusion;
pub use matmul_transdata::{MatmulTransdataFusion, ATTR_OUTPUT_FORMAT};

impl PassRegistry {
    /// Every built-in pass, rewrites before fusions
    pub fn with_defaults() -> Self {
        Self::new()
            .with_pass(MatmulTransdataFusion::new())
            .with_pass(ConvDequantAddQuantFusion::new())
            .with_pass(BatchMatmulDropoutFusion::new())
            .with_pass(ConvElemwiseFusion::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComputeGraph, OpSpec};
    use crate::tensor::TensorDesc;
    use crate::transform::{fused_groups, FusionEngine};

    #[test]
    fn test_default_registry() {
        let registry = PassRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "MatmulTransdataFusion",
                "ConvDequantAddQuantFusion",
                "BatchMatmulDropOutDoMaskV3DFusion",
                "ConvElemwiseFusion",
            ]
        );
    }

    #[test]
    fn test_default_pipeline() {
        let d = TensorDesc::nd(&[1, 16, 8, 8]);
        let mut g = ComputeGraph::new("pipeline");
        let x = g.add(OpSpec::new("x", "Data").output(d.clone()));
        let conv = g.add(OpSpec::new("conv", "Conv2D").input(d.clone()).output(d.clone()));
        let relu = g.add(OpSpec::new("relu", "Relu").input(d.clone()).output(d.clone()));
        let out = g.add(OpSpec::new("out", "NetOutput").input(d));
        g.connect(x, 0, conv, 0).unwrap();
        g.connect(conv, 0, relu, 0).unwrap();
        g.connect(relu, 0, out, 0).unwrap();

        let stats = FusionEngine::new()
            .run_passes(&mut g, &PassRegistry::with_defaults())
            .unwrap();

        assert_eq!(stats.fusions_committed, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(fused_groups(&g).values().next(), Some(&vec![conv, relu]));
    }
}
