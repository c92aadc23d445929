//! Arena compute graph
//!
//! `ComputeGraph` is the reference host graph: an arena of [`NodeEntry`]
//! slots addressed by [`NodeId`]. Removed nodes leave a tombstone, so handles
//! held by a caller never alias a different node.

use crate::error::FusionResult;
use crate::pattern::ops::OpCategory;
use crate::tensor::{ConstTensor, TensorDesc};
use crate::traits::GraphAccessor;

use super::maps::{AttrValue, InPort, NodeEntry, NodeId, OpSpec, OutPort};

/// Arena-of-nodes compute graph
///
/// `Clone + PartialEq`, so a caller can snapshot the graph before a pass and
/// check afterwards that nothing changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputeGraph {
    /// Graph name
    pub name: String,
    /// Arena slots; `None` marks a removed node
    pub(crate) nodes: Vec<Option<NodeEntry>>,
}

impl ComputeGraph {
    /// Create an empty graph
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
        }
    }
}

impl GraphAccessor for ComputeGraph {
    fn node_ids(&self) -> Vec<NodeId> {
        self.live_ids().collect()
    }

    fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn node_name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|e| e.name.as_str())
    }

    fn op_type(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|e| e.op_type.as_str())
    }

    fn op_category(&self, node: NodeId) -> Option<OpCategory> {
        self.node(node).map(|e| e.category)
    }

    fn input_count(&self, node: NodeId) -> usize {
        self.node(node).map(|e| e.inputs.len()).unwrap_or(0)
    }

    fn output_count(&self, node: NodeId) -> usize {
        self.node(node).map(|e| e.outputs.len()).unwrap_or(0)
    }

    fn in_data_peer(&self, port: InPort) -> Option<OutPort> {
        self.node(port.node)
            .and_then(|e| e.in_data.get(port.index).copied().flatten())
    }

    fn out_data_peers(&self, port: OutPort) -> Vec<InPort> {
        self.node(port.node)
            .and_then(|e| e.out_data.get(port.index))
            .map(|peers| peers.to_vec())
            .unwrap_or_default()
    }

    fn in_control_peers(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|e| e.in_ctrl.to_vec())
            .unwrap_or_default()
    }

    fn out_control_peers(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|e| e.out_ctrl.to_vec())
            .unwrap_or_default()
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&AttrValue> {
        self.node(node).and_then(|e| e.attrs.get(name))
    }

    fn input_desc(&self, port: InPort) -> Option<&TensorDesc> {
        self.node(port.node).and_then(|e| e.inputs.get(port.index))
    }

    fn output_desc(&self, port: OutPort) -> Option<&TensorDesc> {
        self.node(port.node).and_then(|e| e.outputs.get(port.index))
    }

    fn constant_input(&self, port: InPort) -> Option<ConstTensor> {
        self.constant_value(port).cloned()
    }

    fn add_node(&mut self, spec: OpSpec) -> FusionResult<NodeId> {
        Ok(self.add(spec))
    }

    fn remove_node(&mut self, node: NodeId) -> FusionResult<()> {
        self.delete_node(node).map(|_| ())
    }

    fn add_data_edge(&mut self, src: OutPort, dst: InPort) -> FusionResult<()> {
        self.link_data(src, dst)
    }

    fn remove_data_edge(&mut self, src: OutPort, dst: InPort) -> FusionResult<()> {
        self.unlink_data(src, dst)
    }

    fn add_control_edge(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()> {
        self.link_control(src, dst)
    }

    fn remove_control_edge(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()> {
        self.unlink_control(src, dst)
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: AttrValue) -> FusionResult<()> {
        self.entry_mut(node)?.attrs.insert(name.to_string(), value);
        Ok(())
    }

    fn set_input_desc(&mut self, port: InPort, desc: TensorDesc) -> FusionResult<()> {
        *self.input_desc_mut(port)? = desc;
        Ok(())
    }

    fn set_output_desc(&mut self, port: OutPort, desc: TensorDesc) -> FusionResult<()> {
        *self.output_desc_mut(port)? = desc;
        Ok(())
    }
}
