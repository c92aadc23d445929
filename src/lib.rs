//! # Buffer Fusion
//!
//! Pattern matching, graph rewriting and split-info propagation for
//! tensor-compiler fusion passes.
//!
//! This crate provides the engine fusion passes are built on: a pattern
//! model with multi-slot matching, safe graph rewrite primitives, and the
//! axis-tiling metadata a fused kernel publishes to its scheduler.
//!
//! ## Features
//!
//! - **Pattern Matching**: Declare slot patterns and find them in a host graph
//! - **Graph Rewriting**: Splice, remove and relink nodes without losing control flow
//! - **Split Info**: Re-express member split maps in the fused group's index space
//!
//! ## Example
//!
//! ```ignore
//! use buffer_fusion::prelude::*;
//!
//! let registry = PassRegistry::with_defaults();
//! let stats = FusionEngine::new().run_passes(&mut graph, &registry)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod error;
pub mod graph;
pub mod passes;
pub mod pattern;
pub mod split;
pub mod tensor;
pub mod traits;
pub mod transform;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use buffer_fusion::prelude::*`
pub mod prelude {
    pub use crate::error::{FusionError, FusionResult};
    pub use crate::graph::{AttrValue, ComputeGraph, InPort, NodeId, OpSpec, OutPort};
    pub use crate::passes::{Decision, FusionPass, PassRegistry};
    pub use crate::pattern::{
        BranchMode, BufferFusionMapping, BufferFusionPattern, OpCategory, SlotTieBreak,
        SubgraphMatcher,
    };
    pub use crate::split::{AxisSplitMap, SliceInfo, SplitInfoPropagator};
    pub use crate::tensor::{DataType, Format, TensorDesc};
    pub use crate::traits::GraphAccessor;
    pub use crate::transform::{FusionConfig, FusionEngine, GraphRewriter, PassStats};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{FusionError, FusionResult};
pub use traits::GraphAccessor;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
