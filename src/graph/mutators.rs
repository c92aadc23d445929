//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding and removing nodes and
//! edges. Every method validates first and only then touches the arena, so a
//! failed call leaves the graph unchanged.

use crate::error::{FusionError, FusionResult, PortDirection};

use super::context::ComputeGraph;
use super::maps::{InPort, NodeEntry, NodeId, OpSpec, OutPort};

impl ComputeGraph {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a new unconnected node
    pub fn add(&mut self, spec: OpSpec) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeEntry::new(spec)));
        id
    }

    /// Detach every data and control edge of a node and delete it
    ///
    /// Returns the removed entry with its edge lists cleared.
    pub fn delete_node(&mut self, id: NodeId) -> FusionResult<NodeEntry> {
        let (ins, outs, in_ctrl, out_ctrl) = {
            let e = self.entry(id)?;
            (
                e.in_data.clone(),
                e.out_data.clone(),
                e.in_ctrl.clone(),
                e.out_ctrl.clone(),
            )
        };

        for (index, src) in ins.into_iter().enumerate() {
            if let Some(src) = src {
                self.unlink_data(src, InPort::new(id, index))?;
            }
        }
        for (index, peers) in outs.into_iter().enumerate() {
            for dst in peers {
                self.unlink_data(OutPort::new(id, index), dst)?;
            }
        }
        for src in in_ctrl {
            self.unlink_control(src, id)?;
        }
        for dst in out_ctrl {
            self.unlink_control(id, dst)?;
        }

        self.nodes[id.index()]
            .take()
            .ok_or(FusionError::NodeNotFound(id))
    }

    // ========================================================================
    // Data edges
    // ========================================================================

    /// Connect output `out_idx` of `src` to input `in_idx` of `dst`
    pub fn connect(
        &mut self,
        src: NodeId,
        out_idx: usize,
        dst: NodeId,
        in_idx: usize,
    ) -> FusionResult<()> {
        self.link_data(OutPort::new(src, out_idx), InPort::new(dst, in_idx))
    }

    /// Add a data edge; the destination anchor must be free
    pub fn link_data(&mut self, src: OutPort, dst: InPort) -> FusionResult<()> {
        self.check_out_port(src)?;
        self.check_in_port(dst)?;
        if src.node == dst.node {
            return Err(FusionError::Rewrite(format!(
                "data edge {}:{} -> {}:{} would be a self loop",
                src.node, src.index, dst.node, dst.index
            )));
        }
        if self.entry(dst.node)?.in_data[dst.index].is_some() {
            return Err(FusionError::PortOccupied {
                node: dst.node,
                index: dst.index,
            });
        }

        self.entry_mut(src.node)?.out_data[src.index].push(dst);
        self.entry_mut(dst.node)?.in_data[dst.index] = Some(src);
        Ok(())
    }

    /// Remove an existing data edge
    pub fn unlink_data(&mut self, src: OutPort, dst: InPort) -> FusionResult<()> {
        self.check_out_port(src)?;
        self.check_in_port(dst)?;
        if self.entry(dst.node)?.in_data[dst.index] != Some(src) {
            return Err(FusionError::EdgeNotFound(format!(
                "{}:{} -> {}:{}",
                src.node, src.index, dst.node, dst.index
            )));
        }

        self.entry_mut(src.node)?.out_data[src.index].retain(|p| *p != dst);
        self.entry_mut(dst.node)?.in_data[dst.index] = None;
        Ok(())
    }

    // ========================================================================
    // Control edges
    // ========================================================================

    /// Add a control edge `src -> dst`
    pub fn link_control(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()> {
        self.entry(src)?;
        self.entry(dst)?;
        if src == dst {
            return Err(FusionError::Rewrite(format!(
                "control edge on {} would be a self loop",
                src
            )));
        }
        if self.entry(src)?.out_ctrl.contains(&dst) {
            return Err(FusionError::Rewrite(format!(
                "control edge {} -> {} already exists",
                src, dst
            )));
        }

        self.entry_mut(src)?.out_ctrl.push(dst);
        self.entry_mut(dst)?.in_ctrl.push(src);
        Ok(())
    }

    /// Remove an existing control edge `src -> dst`
    pub fn unlink_control(&mut self, src: NodeId, dst: NodeId) -> FusionResult<()> {
        self.entry(dst)?;
        if !self.entry(src)?.out_ctrl.contains(&dst) {
            return Err(FusionError::EdgeNotFound(format!("ctrl {} -> {}", src, dst)));
        }

        self.entry_mut(src)?.out_ctrl.retain(|n| *n != dst);
        self.entry_mut(dst)?.in_ctrl.retain(|n| *n != src);
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn check_out_port(&self, port: OutPort) -> FusionResult<()> {
        if port.index >= self.entry(port.node)?.outputs.len() {
            return Err(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Output,
            });
        }
        Ok(())
    }

    fn check_in_port(&self, port: InPort) -> FusionResult<()> {
        if port.index >= self.entry(port.node)?.inputs.len() {
            return Err(FusionError::PortOutOfRange {
                node: port.node,
                index: port.index,
                direction: PortDirection::Input,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorDesc;

    fn make_chain() -> (ComputeGraph, NodeId, NodeId, NodeId) {
        let mut g = ComputeGraph::new("chain");
        let d = TensorDesc::nd(&[4]);
        let a = g.add(OpSpec::new("a", "Relu").input(d.clone()).output(d.clone()));
        let b = g.add(OpSpec::new("b", "Relu").input(d.clone()).output(d.clone()));
        let c = g.add(OpSpec::new("c", "Relu").input(d.clone()).output(d));
        g.connect(a, 0, b, 0).unwrap();
        g.connect(b, 0, c, 0).unwrap();
        (g, a, b, c)
    }

    #[test]
    fn test_link_rejects_occupied_port() {
        let (mut g, a, _, c) = make_chain();
        let before = g.clone();
        let err = g.connect(a, 0, c, 0).unwrap_err();
        assert!(matches!(err, FusionError::PortOccupied { index: 0, .. }));
        assert_eq!(g, before);
    }

    #[test]
    fn test_link_rejects_bad_ports() {
        let (mut g, a, b, _) = make_chain();
        assert!(matches!(
            g.connect(a, 1, b, 0),
            Err(FusionError::PortOutOfRange {
                direction: PortDirection::Output,
                ..
            })
        ));
        assert!(matches!(
            g.connect(a, 0, b, 5),
            Err(FusionError::PortOutOfRange {
                direction: PortDirection::Input,
                ..
            })
        ));
        assert!(g.connect(a, 0, a, 0).is_err());
    }

    #[test]
    fn test_unlink_missing_edge() {
        let (mut g, a, _, c) = make_chain();
        assert!(matches!(
            g.unlink_data(OutPort::new(a, 0), InPort::new(c, 0)),
            Err(FusionError::EdgeNotFound(_))
        ));
    }

    #[test]
    fn test_delete_node_detaches_everything() {
        let (mut g, a, b, c) = make_chain();
        g.link_control(a, b).unwrap();
        g.link_control(b, c).unwrap();

        let removed = g.delete_node(b).unwrap();
        assert!(removed.is_isolated());
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.control_edge_count(), 0);
        assert!(g.node(a).unwrap().out_data[0].is_empty());
    }

    #[test]
    fn test_control_edges() {
        let (mut g, a, _, c) = make_chain();
        g.link_control(a, c).unwrap();
        assert!(g.link_control(a, c).is_err());
        assert!(g.link_control(c, c).is_err());
        assert_eq!(g.control_edge_count(), 1);

        g.unlink_control(a, c).unwrap();
        assert!(g.unlink_control(a, c).is_err());
        assert_eq!(g.control_edge_count(), 0);
    }
}
