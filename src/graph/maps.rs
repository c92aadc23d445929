//! Graph handle and entry types
//!
//! Nodes live in an arena and are referenced by [`NodeId`]; data edges are
//! stored on both endpoints as port handles.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::pattern::ops::{categorize_op, OpCategory};
use crate::tensor::{ConstTensor, TensorDesc};

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena slot of this node
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Output data anchor of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPort {
    /// Producer node
    pub node: NodeId,
    /// Output index
    pub index: usize,
}

impl OutPort {
    /// Output `index` of `node`
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Input data anchor of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InPort {
    /// Consumer node
    pub node: NodeId,
    /// Input index
    pub index: usize,
}

impl InPort {
    /// Input `index` of `node`
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Node attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String attribute
    Str(String),
    /// Integer attribute
    Int(i64),
    /// Boolean attribute
    Bool(bool),
    /// Integer list attribute
    Ints(Vec<i64>),
    /// Tensor list attribute
    Tensors(Vec<ConstTensor>),
}

impl AttrValue {
    /// String payload, if this is a string attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer attribute
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Consumers of one output anchor; most outputs feed 1-4 nodes
pub type PeerList = SmallVec<[InPort; 4]>;

/// Control-edge peers of a node
pub type ControlList = SmallVec<[NodeId; 2]>;

/// Node attributes (order preserved)
pub type AttrMap = IndexMap<String, AttrValue>;

/// Operator spec used to create a node
#[derive(Debug, Clone, PartialEq)]
pub struct OpSpec {
    /// Node name
    pub name: String,
    /// Operator type, e.g. `Conv2D`
    pub op_type: String,
    /// Op-pattern category
    pub category: OpCategory,
    /// Input descriptors (one per input anchor)
    pub inputs: Vec<TensorDesc>,
    /// Output descriptors (one per output anchor)
    pub outputs: Vec<TensorDesc>,
    /// Initial attributes
    pub attrs: AttrMap,
}

impl OpSpec {
    /// New spec with no anchors; the category is derived from the op type
    pub fn new(name: &str, op_type: &str) -> Self {
        Self {
            name: name.to_string(),
            op_type: op_type.to_string(),
            category: categorize_op(op_type),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: AttrMap::new(),
        }
    }

    /// Override the op-pattern category
    pub fn category(mut self, category: OpCategory) -> Self {
        self.category = category;
        self
    }

    /// Append an input anchor
    pub fn input(mut self, desc: TensorDesc) -> Self {
        self.inputs.push(desc);
        self
    }

    /// Append an output anchor
    pub fn output(mut self, desc: TensorDesc) -> Self {
        self.outputs.push(desc);
        self
    }

    /// Append `count` inputs sharing one descriptor
    pub fn inputs(mut self, count: usize, desc: &TensorDesc) -> Self {
        self.inputs.extend(std::iter::repeat(desc.clone()).take(count));
        self
    }

    /// Set an attribute
    pub fn attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }
}

/// Arena entry for one live node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
    /// Node name
    pub name: String,
    /// Operator type
    pub op_type: String,
    /// Op-pattern category
    pub category: OpCategory,
    /// Input descriptors
    pub inputs: Vec<TensorDesc>,
    /// Output descriptors
    pub outputs: Vec<TensorDesc>,
    /// Attributes
    pub attrs: AttrMap,
    /// Producer feeding each input anchor
    pub in_data: Vec<Option<OutPort>>,
    /// Consumers of each output anchor
    pub out_data: Vec<PeerList>,
    /// Control predecessors
    pub in_ctrl: ControlList,
    /// Control successors
    pub out_ctrl: ControlList,
}

impl NodeEntry {
    /// Fresh, unconnected entry for `spec`
    pub fn new(spec: OpSpec) -> Self {
        let in_count = spec.inputs.len();
        let out_count = spec.outputs.len();
        Self {
            name: spec.name,
            op_type: spec.op_type,
            category: spec.category,
            inputs: spec.inputs,
            outputs: spec.outputs,
            attrs: spec.attrs,
            in_data: vec![None; in_count],
            out_data: vec![PeerList::new(); out_count],
            in_ctrl: ControlList::new(),
            out_ctrl: ControlList::new(),
        }
    }

    /// True when no data or control edge touches this node
    pub fn is_isolated(&self) -> bool {
        self.in_data.iter().all(Option::is_none)
            && self.out_data.iter().all(|p| p.is_empty())
            && self.in_ctrl.is_empty()
            && self.out_ctrl.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(12).to_string(), "n12");
        assert_eq!(NodeId(12).index(), 12);
    }

    #[test]
    fn test_op_spec_builder() {
        let spec = OpSpec::new("conv_0", "Conv2D")
            .inputs(2, &TensorDesc::nd(&[1, 3, 8, 8]))
            .output(TensorDesc::nd(&[1, 16, 8, 8]))
            .attr("groups", AttrValue::Int(1));

        assert_eq!(spec.category, OpCategory::Convolution);
        assert_eq!(spec.inputs.len(), 2);
        assert_eq!(spec.outputs.len(), 1);
        assert_eq!(spec.attrs.get("groups").and_then(AttrValue::as_int), Some(1));
    }

    #[test]
    fn test_entry_starts_isolated() {
        let entry = NodeEntry::new(
            OpSpec::new("relu", "Relu")
                .input(TensorDesc::nd(&[4]))
                .output(TensorDesc::nd(&[4])),
        );
        assert!(entry.is_isolated());
        assert_eq!(entry.in_data, vec![None]);
        assert_eq!(entry.out_data.len(), 1);
    }
}
