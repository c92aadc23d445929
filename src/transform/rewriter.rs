//! Graph rewrite primitives
//!
//! [`GraphRewriter`] wraps a mutable [`GraphAccessor`] and offers the splice
//! operations fusion passes are built from. Each operation checks all of its
//! preconditions before the first mutation and orders edge additions before
//! the removals they replace, wherever an occupied input port allows it.
//!
//! There is no rollback: if the graph store rejects a mutation midway, the
//! error is returned and the mutations already applied stay in place.
//!
//! Descriptors are never inferred. A splice copies the descriptor of the
//! tensor it redirects onto the newly exposed edge:
//!
//! | Operation       | Descriptor flow                                           |
//! |-----------------|-----------------------------------------------------------|
//! | `insert_before` | `node.in[i]` → `new.in[0]`, then `new.out[0]` → `node.in[i]` |
//! | `insert_after`  | `node.out[i]` → `new.in[0]`, `new.out[0]` → each consumer input |
//! | `replace_edge_endpoint` | `src` output → `new_dst` input                    |

use tracing::debug;

use crate::error::{FusionError, FusionResult, PortDirection};
use crate::graph::{AttrValue, InPort, NodeId, OpSpec, OutPort};
use crate::tensor::{DataType, TensorDesc};
use crate::traits::GraphAccessor;

/// Mutating view over a host graph
pub struct GraphRewriter<'g, G: GraphAccessor + ?Sized> {
    graph: &'g mut G,
}

impl<'g, G: GraphAccessor + ?Sized> GraphRewriter<'g, G> {
    /// Wrap a graph
    pub fn new(graph: &'g mut G) -> Self {
        Self { graph }
    }

    /// Read access to the wrapped graph
    pub fn graph(&self) -> &G {
        &*self.graph
    }

    // ========================================================================
    // Splicing
    // ========================================================================

    /// Splice a new node into input `input_index` of `node`
    ///
    /// The producer that fed the input now feeds input 0 of the new node, and
    /// output 0 of the new node feeds the input.
    pub fn insert_before(
        &mut self,
        node: NodeId,
        input_index: usize,
        mut spec: OpSpec,
    ) -> FusionResult<NodeId> {
        let port = InPort::new(node, input_index);
        let desc = self.require_input_desc(port)?;
        require_splice_anchors(&spec)?;

        let producer = self.graph.in_data_peer(port);
        spec.inputs[0] = desc;
        let new_out_desc = spec.outputs[0].clone();
        let name = spec.name.clone();

        let new_node = self.graph.add_node(spec)?;
        if let Some(src) = producer {
            self.graph.add_data_edge(src, InPort::new(new_node, 0))?;
            self.graph.remove_data_edge(src, port)?;
        }
        self.graph.add_data_edge(OutPort::new(new_node, 0), port)?;
        self.graph.set_input_desc(port, new_out_desc)?;

        debug!(node = %node, input = input_index, inserted = name.as_str(), "inserted node before input");
        Ok(new_node)
    }

    /// Splice a new node after output `output_index` of `node`
    ///
    /// Every consumer of the output is redirected to output 0 of the new
    /// node, and the output feeds input 0 of the new node.
    pub fn insert_after(
        &mut self,
        node: NodeId,
        output_index: usize,
        mut spec: OpSpec,
    ) -> FusionResult<NodeId> {
        let port = OutPort::new(node, output_index);
        let desc = self.require_output_desc(port)?;
        require_splice_anchors(&spec)?;

        let consumers = self.graph.out_data_peers(port);
        spec.inputs[0] = desc;
        let new_out_desc = spec.outputs[0].clone();
        let name = spec.name.clone();

        let new_node = self.graph.add_node(spec)?;
        self.graph.add_data_edge(port, InPort::new(new_node, 0))?;
        for dst in &consumers {
            self.graph.remove_data_edge(port, *dst)?;
            self.graph.add_data_edge(OutPort::new(new_node, 0), *dst)?;
            self.graph.set_input_desc(*dst, new_out_desc.clone())?;
        }

        debug!(
            node = %node,
            output = output_index,
            consumers = consumers.len(),
            inserted = name.as_str(),
            "inserted node after output"
        );
        Ok(new_node)
    }

    /// Insert a transpose ahead of input `input_index` of `node`
    ///
    /// The node's input descriptor becomes the permuted one.
    pub fn insert_transpose(
        &mut self,
        node: NodeId,
        input_index: usize,
        perm: &[i64],
    ) -> FusionResult<NodeId> {
        let port = InPort::new(node, input_index);
        let desc = self.require_input_desc(port)?;
        let permuted = desc.permuted(perm)?;
        let name = format!("{}_input_{}_transpose", self.node_name(node), input_index);

        let spec = OpSpec::new(&name, "TransposeD")
            .input(desc)
            .output(permuted)
            .attr("perm", AttrValue::Ints(perm.to_vec()));
        self.insert_before(node, input_index, spec)
    }

    /// Insert a cast to `dtype` ahead of input `input_index` of `node`
    pub fn insert_cast(
        &mut self,
        node: NodeId,
        input_index: usize,
        dtype: DataType,
    ) -> FusionResult<NodeId> {
        let port = InPort::new(node, input_index);
        let desc = self.require_input_desc(port)?;
        let cast = desc.with_dtype(dtype);
        let name = format!("{}_input_{}_cast", self.node_name(node), input_index);

        let spec = OpSpec::new(&name, "Cast")
            .input(desc)
            .output(cast)
            .attr("dst_type", AttrValue::Str(dtype.as_str().to_string()));
        self.insert_before(node, input_index, spec)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a node without dropping any control dependency through it
    ///
    /// Every control predecessor is linked to every control successor, then
    /// the node's data edges are detached and the node is deleted.
    pub fn remove_node_preserving_control_flow(&mut self, node: NodeId) -> FusionResult<()> {
        if !self.graph.contains(node) {
            return Err(FusionError::NodeNotFound(node));
        }

        let preds = self.graph.in_control_peers(node);
        let succs = self.graph.out_control_peers(node);
        let mut relinked = 0;
        for &p in &preds {
            for &s in &succs {
                if p != s && !self.graph.has_control_edge(p, s) {
                    self.graph.add_control_edge(p, s)?;
                    relinked += 1;
                }
            }
        }
        self.graph.remove_node(node)?;

        debug!(node = %node, relinked, "removed node");
        Ok(())
    }

    // ========================================================================
    // Relinking
    // ========================================================================

    /// Move the data edge `src -> old_dst` to `src -> new_dst`
    pub fn replace_edge_endpoint(
        &mut self,
        src: OutPort,
        old_dst: InPort,
        new_dst: InPort,
    ) -> FusionResult<()> {
        if self.graph.in_data_peer(old_dst) != Some(src) {
            return Err(FusionError::EdgeNotFound(format!(
                "{}:{} -> {}:{}",
                src.node, src.index, old_dst.node, old_dst.index
            )));
        }
        if old_dst == new_dst {
            return Ok(());
        }
        self.require_input_desc(new_dst)?;
        if self.graph.in_data_peer(new_dst).is_some() {
            return Err(FusionError::PortOccupied {
                node: new_dst.node,
                index: new_dst.index,
            });
        }
        let desc = self.require_output_desc(src)?;

        self.graph.add_data_edge(src, new_dst)?;
        self.graph.remove_data_edge(src, old_dst)?;
        self.graph.set_input_desc(new_dst, desc)?;
        Ok(())
    }

    /// Move every control edge of `from` onto `to`
    ///
    /// Edges that would become self loops on `to` are dropped; edges `to`
    /// already has are not duplicated.
    pub fn relink_control_edges(&mut self, from: NodeId, to: NodeId) -> FusionResult<()> {
        for n in [from, to] {
            if !self.graph.contains(n) {
                return Err(FusionError::NodeNotFound(n));
            }
        }
        if from == to {
            return Ok(());
        }

        let preds = self.graph.in_control_peers(from);
        let succs = self.graph.out_control_peers(from);

        for &p in &preds {
            if p != to && !self.graph.has_control_edge(p, to) {
                self.graph.add_control_edge(p, to)?;
            }
        }
        for &s in &succs {
            if s != to && !self.graph.has_control_edge(to, s) {
                self.graph.add_control_edge(to, s)?;
            }
        }
        for &p in &preds {
            self.graph.remove_control_edge(p, from)?;
        }
        for &s in &succs {
            self.graph.remove_control_edge(from, s)?;
        }

        debug!(from = %from, to = %to, moved = preds.len() + succs.len(), "relinked control edges");
        Ok(())
    }

    // ========================================================================
    // Preconditions
    // ========================================================================

    fn node_name(&self, node: NodeId) -> String {
        self.graph
            .node_name(node)
            .map(str::to_string)
            .unwrap_or_else(|| node.to_string())
    }

    fn require_input_desc(&self, port: InPort) -> FusionResult<TensorDesc> {
        if !self.graph.contains(port.node) {
            return Err(FusionError::NodeNotFound(port.node));
        }
        self.graph
            .input_desc(port)
            .cloned()
            .ok_or(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Input,
            })
    }

    fn require_output_desc(&self, port: OutPort) -> FusionResult<TensorDesc> {
        if !self.graph.contains(port.node) {
            return Err(FusionError::NodeNotFound(port.node));
        }
        self.graph
            .output_desc(port)
            .cloned()
            .ok_or(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Output,
            })
    }
}

/// A spliced node needs input 0 and output 0
fn require_splice_anchors(spec: &OpSpec) -> FusionResult<()> {
    if spec.inputs.is_empty() || spec.outputs.is_empty() {
        return Err(FusionError::Rewrite(format!(
            "node '{}' needs at least one input and one output to be spliced",
            spec.name
        )));
    }
    Ok(())
}
