//! Pattern matching module for buffer fusion
//!
//! This module provides the pattern model passes declare and the matcher
//! that finds it in a host graph.
//!
//! # Overview
//!
//! The pattern matching system works by:
//! 1. Declaring slots ([`PatternDesc`]) that accept op categories or op types
//! 2. Connecting slots with directed pattern edges and choosing head slot(s)
//! 3. Seeding a match at every node a head accepts and expanding along the
//!    pattern edges, binding each slot to an ordered list of real nodes
//!
//! # Example
//!
//! ```ignore
//! use buffer_fusion::pattern::{BranchMode, BufferFusionPattern, OpCategory, SubgraphMatcher};
//!
//! let pattern = BufferFusionPattern::new("BatchMatmulDropout")
//!     .add_op_desc("batchmatmul", OpCategory::BatchMatMul, 1, 1)
//!     .add_op_desc("dropout", OpCategory::DropOutDoMaskV3D, 1, 1)
//!     .set_head(&["batchmatmul"])
//!     .set_outputs("batchmatmul", &["dropout"], BranchMode::Single);
//!
//! for mapping in SubgraphMatcher::new(&pattern, &graph).find_all() {
//!     let group = mapping.fused_node_group(&pattern);
//! }
//! ```

pub mod desc;
pub mod matcher;
pub mod ops;
pub mod traversal;

// Re-export main types
pub use desc::{
    BranchMode, BufferFusionPattern, DescId, PatternDesc, ShapeTypeRule, GROUP_ID_INVALID,
    REPEAT_DEFAULT, REPEAT_MAX, REPEAT_NONE,
};
pub use matcher::{BufferFusionMapping, SlotTieBreak, SubgraphMatcher};
pub use ops::{categorize_op, OpCategory, OpTag, TypeSet};
pub use traversal::group_creates_cycle;
