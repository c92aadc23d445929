//! Slice-info attributes on graph nodes

use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::graph::{AttrValue, InPort, NodeId};
use crate::traits::GraphAccessor;

use super::codec::{AxisSplitMap, SliceInfo};
use super::propagate::{output_axes, MemberSplit, SplitInfoPropagator};

/// Per-node slice info, published by the operator's kernel
pub const ATTR_OP_SLICE_INFO: &str = "_op_slice_info";

/// Slice info of a fused group, stamped on each member
pub const ATTR_FUSION_OP_SLICE_INFO: &str = "_fusion_op_slice_info";

/// Slice info of `node`
///
/// # Returns
/// * `Ok(None)` if the attribute is absent or empty
/// * `Err` if it is not a string or does not parse
pub fn read_slice_info<G: GraphAccessor + ?Sized>(
    graph: &G,
    node: NodeId,
) -> FusionResult<Option<SliceInfo>> {
    let value = match graph.attr(node, ATTR_OP_SLICE_INFO) {
        Some(value) => value,
        None => return Ok(None),
    };
    let json = value.as_str().ok_or_else(|| {
        FusionError::UnsupportedConfiguration(format!(
            "{} on node {} is not a string",
            ATTR_OP_SLICE_INFO, node
        ))
    })?;
    if json.trim().is_empty() {
        return Ok(None);
    }
    SliceInfo::from_json(json).map(Some)
}

/// Split description of a fused member
///
/// Inputs fed by a node in `fused` are internal. A member whose slice info
/// is missing or unreadable contributes no maps.
pub fn member_from_graph<G: GraphAccessor + ?Sized>(
    graph: &G,
    node: NodeId,
    fused: &[NodeId],
) -> MemberSplit {
    let maps = match read_slice_info(graph, node) {
        Ok(Some(info)) => info.split_maps,
        Ok(None) => {
            debug!(node = %node, "member has no slice info");
            Vec::new()
        }
        Err(e) => {
            debug!(node = %node, error = %e, "member slice info unreadable");
            Vec::new()
        }
    };

    let input_count = graph.input_count(node);
    let mut member = MemberSplit::new(maps, input_count);
    for i in 0..input_count {
        let internal = graph
            .in_data_peer(InPort::new(node, i))
            .map_or(false, |src| fused.contains(&src.node));
        if internal {
            member = member.with_ignored_input(i);
        }
    }
    member
}

/// Stamp `maps` on every node of `group` under `_fusion_op_slice_info`
///
/// L1 settings are taken from `template`, usually the anchor's slice info.
pub fn write_fused_slice_info<G: GraphAccessor + ?Sized>(
    graph: &mut G,
    group: &[NodeId],
    maps: Vec<AxisSplitMap>,
    template: &SliceInfo,
) -> FusionResult<()> {
    let fused = SliceInfo {
        split_maps: maps,
        reduce_maps: Vec::new(),
        l1_fusion_enable: template.l1_fusion_enable,
        min_tbe_l1_space: template.min_tbe_l1_space,
    };
    let json = fused.to_json()?;
    for &n in group {
        graph.set_attr(n, ATTR_FUSION_OP_SLICE_INFO, AttrValue::Str(json.clone()))?;
    }
    Ok(())
}

/// Intersect the slice info of `group` (anchor first) and stamp the result
///
/// # Returns
/// * `Some(maps)` that were written
/// * `None` if the anchor has no usable slice info; nothing is written
pub fn propagate_for_group<G: GraphAccessor + ?Sized>(
    graph: &mut G,
    group: &[NodeId],
) -> FusionResult<Option<Vec<AxisSplitMap>>> {
    let anchor = match group.first() {
        Some(&n) => n,
        None => return Ok(None),
    };
    let info = match read_slice_info(graph, anchor) {
        Ok(Some(info)) if !info.split_maps.is_empty() => info,
        Ok(_) => {
            debug!(anchor = %anchor, "anchor has no split maps, skipping split info");
            return Ok(None);
        }
        Err(e) => {
            debug!(anchor = %anchor, error = %e, "anchor slice info unreadable, skipping split info");
            return Ok(None);
        }
    };

    let mut propagator =
        SplitInfoPropagator::new(info.split_maps.clone(), graph.input_count(anchor));
    for (i, &n) in group.iter().enumerate().skip(1) {
        propagator.push_member(member_from_graph(graph, n, &group[..i]));
    }
    let maps = propagator.propagate();

    debug!(
        anchor = %anchor,
        members = group.len(),
        maps = maps.len(),
        axes = ?output_axes(&maps),
        "propagated split info"
    );
    write_fused_slice_info(graph, group, maps.clone(), &info)?;
    Ok(Some(maps))
}
