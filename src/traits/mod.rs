//! Core traits for buffer-fusion
//!
//! [`GraphAccessor`] is the capability surface the engine uses to read and
//! mutate a host compute graph. The host owns the graph; the matcher, the
//! rewriter and the split-info propagator only ever call through this trait.

use rustc_hash::FxHashSet;

use crate::error::FusionResult;
use crate::graph::{AttrValue, InPort, NodeId, OpSpec, OutPort};
use crate::pattern::ops::OpCategory;
use crate::tensor::{ConstTensor, TensorDesc};

/// Read/write access to a host compute graph
///
/// Every mutation either succeeds or reports an error without changing the
/// graph. Sequences of mutations are not transactional; see
/// [`GraphRewriter`](crate::transform::GraphRewriter).
pub trait GraphAccessor {
    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Live node handles in graph order
    fn node_ids(&self) -> Vec<NodeId>;

    /// True if `node` refers to a live node
    fn contains(&self, node: NodeId) -> bool;

    /// Node name
    fn node_name(&self, node: NodeId) -> Option<&str>;

    /// Operator type, e.g. `Conv2D`
    fn op_type(&self, node: NodeId) -> Option<&str>;

    /// Op-pattern category
    fn op_category(&self, node: NodeId) -> Option<OpCategory>;

    /// Number of input data anchors
    fn input_count(&self, node: NodeId) -> usize;

    /// Number of output data anchors
    fn output_count(&self, node: NodeId) -> usize;

    /// Producer feeding an input anchor
    fn in_data_peer(&self, port: InPort) -> Option<OutPort>;

    /// Consumers of an output anchor, in connection order
    fn out_data_peers(&self, port: OutPort) -> Vec<InPort>;

    /// Control predecessors
    fn in_control_peers(&self, node: NodeId) -> Vec<NodeId>;

    /// Control successors
    fn out_control_peers(&self, node: NodeId) -> Vec<NodeId>;

    /// Named attribute
    fn attr(&self, node: NodeId, name: &str) -> Option<&AttrValue>;

    /// Descriptor of an input anchor
    fn input_desc(&self, port: InPort) -> Option<&TensorDesc>;

    /// Descriptor of an output anchor
    fn output_desc(&self, port: OutPort) -> Option<&TensorDesc>;

    /// Compile-time constant feeding an input, when the host can resolve one
    ///
    /// `None` means "not constant" or "query unavailable"; callers must treat
    /// both the same way.
    fn constant_input(&self, _port: InPort) -> Option<ConstTensor> {
        None
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Create an unconnected node
    fn add_node(&mut self, spec: OpSpec) -> FusionResult<NodeId>;

    /// Detach every edge of `node` and delete it
    fn remove_node(&mut self, node: NodeId) -> FusionResult<()>;

    /// Connect an output anchor to a free input anchor
    fn add_data_edge(&mut self, src: OutPort, dst: InPort) -> FusionResult<()>;

    /// Remove an existing data edge
    fn remove_data_edge(&mut self, src: OutPort, dst: InPort) -> FusionResult<()>;

    /// Add an ordering-only edge
    fn add_control_edge(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()>;

    /// Remove an existing control edge
    fn remove_control_edge(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()>;

    /// Set (or overwrite) an attribute
    fn set_attr(&mut self, node: NodeId, name: &str, value: AttrValue) -> FusionResult<()>;

    /// Replace an input descriptor
    fn set_input_desc(&mut self, port: InPort, desc: TensorDesc) -> FusionResult<()>;

    /// Replace an output descriptor
    fn set_output_desc(&mut self, port: OutPort, desc: TensorDesc) -> FusionResult<()>;

    // ------------------------------------------------------------------
    // Provided helpers
    // ------------------------------------------------------------------

    /// Distinct producer nodes in input-anchor order
    fn in_data_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        (0..self.input_count(node))
            .filter_map(|i| self.in_data_peer(InPort::new(node, i)))
            .map(|p| p.node)
            .filter(|n| seen.insert(*n))
            .collect()
    }

    /// Distinct consumer nodes in output-anchor, then connection order
    fn out_data_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        (0..self.output_count(node))
            .flat_map(|i| self.out_data_peers(OutPort::new(node, i)))
            .map(|p| p.node)
            .filter(|n| seen.insert(*n))
            .collect()
    }

    /// Total number of consumer anchors across every output
    fn data_consumer_count(&self, node: NodeId) -> usize {
        (0..self.output_count(node))
            .map(|i| self.out_data_peers(OutPort::new(node, i)).len())
            .sum()
    }

    /// True if any input or output descriptor has an unknown dimension
    fn is_dynamic_shape(&self, node: NodeId) -> bool {
        let inputs = (0..self.input_count(node))
            .filter_map(|i| self.input_desc(InPort::new(node, i)))
            .any(TensorDesc::is_dynamic);
        inputs
            || (0..self.output_count(node))
                .filter_map(|i| self.output_desc(OutPort::new(node, i)))
                .any(TensorDesc::is_dynamic)
    }

    /// True if a control edge `src -> dst` exists
    fn has_control_edge(&self, src: NodeId, dst: NodeId) -> bool {
        self.out_control_peers(src).contains(&dst)
    }

    /// Integer attribute shortcut
    fn attr_int(&self, node: NodeId, name: &str) -> Option<i64> {
        self.attr(node, name).and_then(AttrValue::as_int)
    }

    /// String attribute shortcut
    fn attr_str(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attr(node, name).and_then(AttrValue::as_str)
    }
}
