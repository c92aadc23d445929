//! Error types for buffer-fusion
//!
//! "Pattern does not apply" is not an error anywhere in this crate: the matcher
//! returns an empty list and passes return [`Decision::NotApplicable`].
//! The variants here cover malformed patterns, rejected graph mutations and
//! degraded split-info input.
//!
//! [`Decision::NotApplicable`]: crate::passes::Decision::NotApplicable

use thiserror::Error;

use crate::graph::NodeId;

/// Which side of a node a port index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Input (consumer side) data anchor
    Input,
    /// Output (producer side) data anchor
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Main error type for fusion operations
#[derive(Error, Debug)]
pub enum FusionError {
    /// Pattern violates its own structural invariants
    #[error("Malformed pattern '{pattern}': {reason}")]
    MalformedPattern {
        /// Pattern name
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// Node handle does not refer to a live node
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port index beyond the node's anchor count
    #[error("{direction} port {index} out of range on node {node}")]
    PortOutOfRange {
        /// Node the port belongs to
        node: NodeId,
        /// Requested index
        index: usize,
        /// Input or output side
        direction: PortDirection,
    },

    /// Input port already has a producer
    #[error("Input port {index} of node {node} is already connected")]
    PortOccupied {
        /// Consumer node
        node: NodeId,
        /// Input index
        index: usize,
    },

    /// Edge to remove does not exist
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// Generic rewrite failure reported by the graph store
    #[error("Rewrite failed: {0}")]
    Rewrite(String),

    /// Split-info input could not be interpreted
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Slice-info JSON could not be encoded or decoded
    #[error("Slice info codec error: {0}")]
    SliceInfo(#[from] serde_json::Error),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid tensor data
    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FusionError {
    /// Shorthand for a malformed pattern error
    pub fn malformed(pattern: &str, reason: impl Into<String>) -> Self {
        FusionError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised by a graph mutation (the RewriteFailure family)
    pub fn is_rewrite_failure(&self) -> bool {
        matches!(
            self,
            FusionError::NodeNotFound(_)
                | FusionError::PortOutOfRange { .. }
                | FusionError::PortOccupied { .. }
                | FusionError::EdgeNotFound(_)
                | FusionError::Rewrite(_)
        )
    }
}

/// Result type alias for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
