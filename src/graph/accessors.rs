//! Graph query helpers
//!
//! Inherent lookups on [`ComputeGraph`] beyond the [`GraphAccessor`] surface.
//!
//! [`GraphAccessor`]: crate::traits::GraphAccessor

use crate::error::{FusionError, FusionResult, PortDirection};
use crate::tensor::{ConstTensor, TensorDesc};

use super::context::ComputeGraph;
use super::maps::{AttrValue, InPort, NodeEntry, NodeId, OutPort};

/// Op types whose `value` attribute holds a compile-time constant
const CONSTANT_OPS: &[&str] = &["Const", "Constant"];

impl ComputeGraph {
    // ========================================================================
    // Node lookup
    // ========================================================================

    /// Get a live node entry
    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a live node entry or fail with `NodeNotFound`
    pub fn entry(&self, id: NodeId) -> FusionResult<&NodeEntry> {
        self.node(id).ok_or(FusionError::NodeNotFound(id))
    }

    pub(crate) fn entry_mut(&mut self, id: NodeId) -> FusionResult<&mut NodeEntry> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(FusionError::NodeNotFound(id))
    }

    pub(crate) fn input_desc_mut(&mut self, port: InPort) -> FusionResult<&mut TensorDesc> {
        self.entry_mut(port.node)?
            .inputs
            .get_mut(port.index)
            .ok_or(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Input,
            })
    }

    pub(crate) fn output_desc_mut(&mut self, port: OutPort) -> FusionResult<&mut TensorDesc> {
        self.entry_mut(port.node)?
            .outputs
            .get_mut(port.index)
            .ok_or(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Output,
            })
    }

    /// Iterate over live node handles in insertion order
    pub fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Find a node by name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.live_ids()
            .find(|&id| self.node(id).map(|e| e.name == name).unwrap_or(false))
    }

    /// Find nodes by op type
    pub fn nodes_by_op_type(&self, op_type: &str) -> Vec<NodeId> {
        self.live_ids()
            .filter(|&id| self.node(id).map(|e| e.op_type == op_type).unwrap_or(false))
            .collect()
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of data edges
    pub fn edge_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .map(|e| e.in_data.iter().filter(|p| p.is_some()).count())
            .sum()
    }

    /// Number of control edges
    pub fn control_edge_count(&self) -> usize {
        self.nodes.iter().flatten().map(|e| e.out_ctrl.len()).sum()
    }

    // ========================================================================
    // Constants
    // ========================================================================

    /// Constant tensor feeding an input, read from a `Const` producer's
    /// `value` attribute
    pub fn constant_value(&self, port: InPort) -> Option<&ConstTensor> {
        let producer = self
            .node(port.node)?
            .in_data
            .get(port.index)
            .copied()
            .flatten()?;
        let entry = self.node(producer.node)?;
        if !CONSTANT_OPS.contains(&entry.op_type.as_str()) {
            return None;
        }
        match entry.attrs.get("value") {
            Some(AttrValue::Tensors(tensors)) => tensors.first(),
            _ => None,
        }
    }
}
