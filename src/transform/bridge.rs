//! Bridge around pass-through nodes
//!
//! When a pass-through node (layout conversion, identity, dropout at
//! inference) is removed, its consumers must be fed by its producer instead.

use tracing::debug;

use crate::error::{FusionError, FusionResult, PortDirection};
use crate::graph::{InPort, NodeId, OutPort};
use crate::traits::GraphAccessor;

use super::rewriter::GraphRewriter;

/// Reconnect consumers of `output_index` to the producer of `input_index`,
/// then remove the node
///
/// Each consumer input takes over the producer's output descriptor, and the
/// node's control edges are preserved through its control peers.
///
/// # Returns
/// * Number of consumer inputs bridged
pub fn bridge_and_remove<G: GraphAccessor + ?Sized>(
    graph: &mut G,
    node: NodeId,
    input_index: usize,
    output_index: usize,
) -> FusionResult<usize> {
    if !graph.contains(node) {
        return Err(FusionError::NodeNotFound(node));
    }
    let src = graph
        .in_data_peer(InPort::new(node, input_index))
        .ok_or_else(|| {
            FusionError::Rewrite(format!(
                "input {} of node {} has no producer to bridge from",
                input_index, node
            ))
        })?;
    let out = OutPort::new(node, output_index);
    if output_index >= graph.output_count(node) {
        return Err(FusionError::PortOutOfRange {
            node,
            index: output_index,
            direction: PortDirection::Output,
        });
    }
    let desc = graph.output_desc(src).cloned().ok_or_else(|| {
        FusionError::Rewrite(format!("producer of node {} has no output descriptor", node))
    })?;

    let consumers = graph.out_data_peers(out);
    for &dst in &consumers {
        graph.remove_data_edge(out, dst)?;
        graph.add_data_edge(src, dst)?;
        graph.set_input_desc(dst, desc.clone())?;
    }

    GraphRewriter::new(graph).remove_node_preserving_control_flow(node)?;

    debug!(node = %node, bridged = consumers.len(), "bridged and removed node");
    Ok(consumers.len())
}
