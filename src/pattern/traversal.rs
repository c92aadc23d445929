//! Graph reachability
//!
//! Forward reachability over data and control edges, used to reject fusions
//! that would form a cycle.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::graph::NodeId;
use crate::traits::GraphAccessor;

/// Consumers of `node` over data edges, then control edges
fn successors<G: GraphAccessor + ?Sized>(graph: &G, node: NodeId) -> Vec<NodeId> {
    let mut out = graph.out_data_nodes(node);
    for n in graph.out_control_peers(node) {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// True if collapsing `group` into one node would form a cycle
///
/// That is the case when some path over data or control edges leaves the
/// group and re-enters it.
pub fn group_creates_cycle<G: GraphAccessor + ?Sized>(graph: &G, group: &[NodeId]) -> bool {
    let members: FxHashSet<NodeId> = group.iter().copied().collect();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut visited = FxHashSet::default();

    for &m in group {
        for n in successors(graph, m) {
            if !members.contains(&n) && visited.insert(n) {
                queue.push_back(n);
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        for n in successors(graph, current) {
            if members.contains(&n) {
                return true;
            }
            if visited.insert(n) {
                queue.push_back(n);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComputeGraph, OpSpec};
    use crate::tensor::TensorDesc;

    /// a -> b -> c, a -> c
    fn make_diamond_graph() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let mut g = ComputeGraph::new("diamond");
        let d = TensorDesc::nd(&[4]);
        let a = g.add(OpSpec::new("a", "Relu").input(d.clone()).output(d.clone()));
        let b = g.add(OpSpec::new("b", "Relu").input(d.clone()).output(d.clone()));
        let c = g.add(OpSpec::new("c", "Add").inputs(2, &d).output(d));
        g.connect(a, 0, b, 0).unwrap();
        g.connect(b, 0, c, 0).unwrap();
        g.connect(a, 0, c, 1).unwrap();
        (g, a, b, c)
    }

    #[test]
    fn test_group_creates_cycle() {
        let (g, a, b, c) = make_diamond_graph();
        // a and c fused while b sits on a path between them
        assert!(group_creates_cycle(&g, &[a, c]));
        assert!(!group_creates_cycle(&g, &[a, b]));
        assert!(!group_creates_cycle(&g, &[a, b, c]));
    }

    #[test]
    fn test_control_edge_cycle() {
        let mut g = ComputeGraph::new("ctrl");
        let d = TensorDesc::nd(&[4]);
        let a = g.add(OpSpec::new("a", "Relu").input(d.clone()).output(d.clone()));
        let x = g.add(OpSpec::new("x", "Relu").input(d.clone()).output(d.clone()));
        let b = g.add(OpSpec::new("b", "Relu").input(d.clone()).output(d));
        g.connect(a, 0, b, 0).unwrap();
        g.add_control_edge(a, x).unwrap();
        g.add_control_edge(x, b).unwrap();
        assert!(group_creates_cycle(&g, &[a, b]));
    }
}
