//! Host graph model
//!
//! This module provides the reference host graph the engine runs against:
//!
//! - [`ComputeGraph`]: arena of nodes with explicit data and control edges
//! - [`maps`]: handles ([`NodeId`], [`OutPort`], [`InPort`]) and node entries
//!
//! # Overview
//!
//! A data edge connects one output anchor to one input anchor. An output may
//! feed any number of inputs; an input has at most one producer. Control
//! edges carry ordering only.
//!
//! # Example
//!
//! ```ignore
//! use buffer_fusion::graph::{ComputeGraph, OpSpec};
//! use buffer_fusion::tensor::TensorDesc;
//!
//! let mut g = ComputeGraph::new("net");
//! let d = TensorDesc::nd(&[1, 16, 8, 8]);
//! let conv = g.add(OpSpec::new("conv", "Conv2D").inputs(2, &d).output(d.clone()));
//! let relu = g.add(OpSpec::new("relu", "Relu").input(d.clone()).output(d));
//! g.connect(conv, 0, relu, 0)?;
//! ```
//!
//! Every mutation is also reachable through
//! [`GraphAccessor`](crate::traits::GraphAccessor), which is the only surface
//! the matcher and the rewriter use.

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;

// Re-export main types
pub use context::ComputeGraph;
pub use maps::{AttrMap, AttrValue, ControlList, InPort, NodeEntry, NodeId, OpSpec, OutPort, PeerList};
