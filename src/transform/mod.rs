//! Graph transformation module
//!
//! This module provides the rewrite and commit infrastructure fusion passes
//! run on:
//!
//! - [`FusionEngine`]: Main fusion loop
//! - [`GraphRewriter`]: Splice, remove and relink primitives
//! - [`bridge`]: Reconnection around removed pass-through nodes
//! - [`fuse`]: Fused-group commit
//!
//! # Overview
//!
//! Transformations work on any [`GraphAccessor`](crate::traits::GraphAccessor)
//! and modify it in place. The typical workflow is:
//!
//! 1. Build a `PassRegistry` of fusion passes
//! 2. Run them with `FusionEngine::run_passes`
//! 3. Read back the fused scopes with `fuse::fused_groups`
//!
//! # Example
//!
//! ```ignore
//! use buffer_fusion::passes::PassRegistry;
//! use buffer_fusion::transform::{fuse::fused_groups, FusionEngine};
//!
//! let registry = PassRegistry::with_defaults();
//! let stats = FusionEngine::new().run_passes(&mut graph, &registry)?;
//!
//! for (scope, members) in fused_groups(&graph) {
//!     println!("scope {}: {:?}", scope, members);
//! }
//! ```

pub mod bridge;
pub mod core;
pub mod fuse;
pub mod rewriter;

// Re-export main types and functions
pub use bridge::bridge_and_remove;

pub use core::{FusionConfig, FusionContext, FusionEngine, PassStats};

pub use fuse::{
    check_fusible, commit_fusion, fused_groups, scope_of, CommittedGroup,
    ATTR_FUSION_PASS, ATTR_FUSION_SCOPE,
};

pub use rewriter::GraphRewriter;
