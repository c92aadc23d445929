use tracing::debug;

use crate::error::FusionResult;
use crate::graph::{AttrValue, OutPort};
use crate::pattern::{BranchMode, BufferFusionMapping, BufferFusionPattern, OpCategory};
use crate::traits::GraphAccessor;
use crate::transform::{bridge_and_remove, FusionContext};

use super::common::{Decision, FusionPass};

const PATTERN_MATMUL: &str = "matmul";
const PATTERN_TRANSDATA: &str = "transdata";

/// Attribute recording the output format a MatMul now writes directly
pub const ATTR_OUTPUT_FORMAT: &str = "output_format";

/// Removes a TransData that follows a MatMul
///
/// Transforms:
///   MatMul -> TransData(FRACTAL_NZ -> ND) -> consumers
/// Into:
///   MatMul(ND) -> consumers
/// The MatMul takes over the TransData's output descriptor.
#[derive(Debug, Default)]
pub struct MatmulTransdataFusion;

impl MatmulTransdataFusion {
    /// Create a new pass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for MatmulTransdataFusion {
    fn name(&self) -> &str {
        "MatmulTransdataFusion"
    }

    fn define_patterns(&self) -> Vec<BufferFusionPattern> {
        vec![BufferFusionPattern::new("MatmulTransdataFusion")
            .add_op_desc(PATTERN_MATMUL, OpCategory::MatMul, 1, 1)
            .add_op_desc(PATTERN_TRANSDATA, OpCategory::TransData, 1, 1)
            .set_head(&[PATTERN_MATMUL])
            .set_outputs(PATTERN_MATMUL, &[PATTERN_TRANSDATA], BranchMode::Single)]
    }

    fn fusion(
        &self,
        graph: &mut dyn GraphAccessor,
        pattern: &BufferFusionPattern,
        mapping: &BufferFusionMapping,
        _ctx: &FusionContext,
    ) -> FusionResult<Decision> {
        let (Some(matmul), Some(transdata)) = (
            mapping.first_by_name(pattern, PATTERN_MATMUL),
            mapping.first_by_name(pattern, PATTERN_TRANSDATA),
        ) else {
            return Ok(Decision::NotApplicable);
        };
        if graph.input_count(transdata) != 1 || graph.output_count(transdata) != 1 {
            return Ok(Decision::NotApplicable);
        }
        let target = match graph.output_desc(OutPort::new(transdata, 0)) {
            Some(desc) => desc.clone(),
            None => return Ok(Decision::NotApplicable),
        };

        let format = target.format;
        graph.set_output_desc(OutPort::new(matmul, 0), target)?;
        graph.set_attr(matmul, ATTR_OUTPUT_FORMAT, AttrValue::Str(format.as_str().to_string()))?;
        let bridged = bridge_and_remove(graph, transdata, 0, 0)?;

        debug!(matmul = %matmul, format = %format, bridged, "removed transdata after matmul");
        Ok(Decision::Rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComputeGraph, InPort, NodeId, OpSpec};
    use crate::tensor::{DataType, Format, TensorDesc};
    use crate::transform::FusionEngine;

    /// (a, b) -> mm -> td -> relu, td -> out
    fn make_matmul_graph() -> (ComputeGraph, [NodeId; 4]) {
        let nd = TensorDesc::new(&[32, 32], Format::Nd, DataType::Float16);
        let nz = TensorDesc::new(&[2, 2, 16, 16], Format::FractalNz, DataType::Float16);
        let mut g = ComputeGraph::new("matmul_transdata");
        let a = g.add(OpSpec::new("a", "Data").output(nd.clone()));
        let b = g.add(OpSpec::new("b", "Data").output(nd.clone()));
        let mm = g.add(OpSpec::new("mm", "MatMul").inputs(2, &nd).output(nz.clone()));
        let td = g.add(OpSpec::new("td", "TransData").input(nz).output(nd.clone()));
        let relu = g.add(OpSpec::new("relu", "Relu").input(nd.clone()).output(nd.clone()));
        let out = g.add(OpSpec::new("out", "NetOutput").input(nd));
        g.connect(a, 0, mm, 0).unwrap();
        g.connect(b, 0, mm, 1).unwrap();
        g.connect(mm, 0, td, 0).unwrap();
        g.connect(td, 0, relu, 0).unwrap();
        g.connect(td, 0, out, 0).unwrap();
        (g, [mm, td, relu, out])
    }

    #[test]
    fn test_transdata_removed() {
        let (mut g, [mm, td, relu, out]) = make_matmul_graph();
        let stats = FusionEngine::new()
            .run_pass(&mut g, &MatmulTransdataFusion::new())
            .unwrap();

        assert_eq!(stats.rewrites_applied, 1);
        assert!(!g.contains(td));
        assert_eq!(g.out_data_nodes(mm), vec![relu, out]);
        assert_eq!(g.attr_str(mm, ATTR_OUTPUT_FORMAT), Some("ND"));
        assert_eq!(
            g.output_desc(OutPort::new(mm, 0)).unwrap().format,
            Format::Nd
        );
        assert_eq!(
            g.input_desc(InPort::new(relu, 0)).unwrap().shape,
            vec![32, 32]
        );
    }

    #[test]
    fn test_control_edges_survive() {
        let (mut g, [mm, td, relu, _]) = make_matmul_graph();
        g.add_control_edge(mm, td).unwrap();
        g.add_control_edge(td, relu).unwrap();
        FusionEngine::new()
            .run_pass(&mut g, &MatmulTransdataFusion::new())
            .unwrap();
        assert!(g.has_control_edge(mm, relu));
    }

    #[test]
    fn test_no_match_leaves_graph() {
        let (mut g, [_, td, ..]) = make_matmul_graph();
        g.remove_node(td).unwrap();
        let before = g.clone();
        let stats = FusionEngine::new()
            .run_pass(&mut g, &MatmulTransdataFusion::new())
            .unwrap();
        assert_eq!(stats.patterns_matched, 0);
        assert_eq!(g, before);
    }
}
