//! Fused-group commit
//!
//! Fusion does not merge nodes: it stamps every member of a group with the
//! same scope id and the name of the pass that fused it. The downstream
//! kernel builder turns each scope into one kernel.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::graph::{AttrValue, NodeId};
use crate::pattern::traversal::group_creates_cycle;
use crate::traits::GraphAccessor;

/// Attribute holding the fusion scope id of a fused node
pub const ATTR_FUSION_SCOPE: &str = "fusion_scope";

/// Attribute holding the name of the pass that fused a node
pub const ATTR_FUSION_PASS: &str = "fusion_pass";

/// Result of a committed fusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedGroup {
    /// Scope id stamped on every member
    pub scope_id: i64,
    /// Members in commit order
    pub nodes: Vec<NodeId>,
}

/// Reason a group cannot be fused, or `None` if it can
///
/// Checks: non-empty, no duplicate member, every member live and not fused
/// yet, and (with `check_cycles`) no path leaving the group and re-entering.
pub fn check_fusible<G: GraphAccessor + ?Sized>(
    graph: &G,
    group: &[NodeId],
    check_cycles: bool,
) -> Option<String> {
    if group.is_empty() {
        return Some("empty group".to_string());
    }

    let mut seen = FxHashSet::default();
    for &n in group {
        if !seen.insert(n) {
            return Some(format!("node {} listed twice", n));
        }
        if !graph.contains(n) {
            return Some(format!("node {} was removed", n));
        }
        if graph.attr(n, ATTR_FUSION_SCOPE).is_some() {
            return Some(format!("node {} is already fused", n));
        }
    }

    if check_cycles && group.len() > 1 && group_creates_cycle(graph, group) {
        return Some("fusion would create a cycle".to_string());
    }

    None
}

/// Stamp `group` as one fusion scope
///
/// Fails without touching the graph when [`check_fusible`] rejects the group.
pub fn commit_fusion<G: GraphAccessor + ?Sized>(
    graph: &mut G,
    group: &[NodeId],
    scope_id: i64,
    pass_name: &str,
    check_cycles: bool,
) -> FusionResult<CommittedGroup> {
    if let Some(reason) = check_fusible(graph, group, check_cycles) {
        return Err(FusionError::Rewrite(format!(
            "cannot fuse group for pass '{}': {}",
            pass_name, reason
        )));
    }

    for &n in group {
        graph.set_attr(n, ATTR_FUSION_SCOPE, AttrValue::Int(scope_id))?;
        graph.set_attr(n, ATTR_FUSION_PASS, AttrValue::Str(pass_name.to_string()))?;
    }

    debug!(pass = pass_name, scope = scope_id, nodes = group.len(), "committed fusion");
    Ok(CommittedGroup {
        scope_id,
        nodes: group.to_vec(),
    })
}

/// Fusion scope of a node, if it was fused
pub fn scope_of<G: GraphAccessor + ?Sized>(graph: &G, node: NodeId) -> Option<i64> {
    graph.attr_int(node, ATTR_FUSION_SCOPE)
}

/// Every fusion scope in the graph with its members, in graph order
pub fn fused_groups<G: GraphAccessor + ?Sized>(graph: &G) -> IndexMap<i64, Vec<NodeId>> {
    let mut groups: IndexMap<i64, Vec<NodeId>> = IndexMap::new();
    for n in graph.node_ids() {
        if let Some(scope) = scope_of(graph, n) {
            groups.entry(scope).or_default().push(n);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComputeGraph, OpSpec};
    use crate::tensor::TensorDesc;

    /// conv -> relu -> add, conv -> add
    fn make_fusible_graph() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let d = TensorDesc::nd(&[4, 4]);
        let mut g = ComputeGraph::new("fusible");
        let conv = g.add(OpSpec::new("conv", "Conv2D").input(d.clone()).output(d.clone()));
        let relu = g.add(OpSpec::new("relu", "Relu").input(d.clone()).output(d.clone()));
        let add = g.add(OpSpec::new("add", "Add").inputs(2, &d).output(d));
        g.connect(conv, 0, relu, 0).unwrap();
        g.connect(relu, 0, add, 0).unwrap();
        g.connect(conv, 0, add, 1).unwrap();
        (g, conv, relu, add)
    }

    #[test]
    fn test_commit_fusion() {
        let (mut g, conv, relu, add) = make_fusible_graph();
        let committed = commit_fusion(&mut g, &[conv, relu, add], 7, "ConvElemwise", true).unwrap();
        assert_eq!(committed.scope_id, 7);
        for n in [conv, relu, add] {
            assert_eq!(scope_of(&g, n), Some(7));
            assert_eq!(g.attr_str(n, ATTR_FUSION_PASS), Some("ConvElemwise"));
        }
        assert_eq!(fused_groups(&g).get(&7), Some(&vec![conv, relu, add]));
    }

    #[test]
    fn test_commit_rejects_cycle() {
        let (mut g, conv, _, add) = make_fusible_graph();
        let before = g.clone();
        let err = commit_fusion(&mut g, &[conv, add], 1, "p", true).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert_eq!(g, before);

        // Without the cycle check the group is accepted
        assert!(commit_fusion(&mut g, &[conv, add], 1, "p", false).is_ok());
    }

    #[test]
    fn test_commit_rejects_refusion() {
        let (mut g, conv, relu, add) = make_fusible_graph();
        commit_fusion(&mut g, &[relu, add], 1, "p", true).unwrap();
        assert!(check_fusible(&g, &[conv, relu], true)
            .unwrap()
            .contains("already fused"));
        assert!(check_fusible(&g, &[], true).is_some());
        assert!(check_fusible(&g, &[conv, conv], true).is_some());
        assert!(check_fusible(&g, &[NodeId(40)], true).is_some());
    }
}
