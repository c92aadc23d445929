use tracing::debug;

use crate::error::FusionResult;
use crate::graph::NodeId;
use crate::pattern::{BranchMode, BufferFusionPattern, OpCategory};
use crate::split::{add_elemwise_split_map, read_slice_info, write_fused_slice_info};
use crate::traits::GraphAccessor;

use super::common::{external_inputs, FusionPass};

const PATTERN_BATCH_MATMUL: &str = "batchmatmul";
const PATTERN_DROPOUT: &str = "dropout";

/// Fuses BatchMatMul + DropOutDoMaskV3D
///
/// Matches:
///   BatchMatMul(x, y) -> DropOutDoMaskV3D(mask)
/// The dropout's mask becomes an extra group input, tiled like the
/// BatchMatMul output.
#[derive(Debug, Default)]
pub struct BatchMatmulDropoutFusion;

impl BatchMatmulDropoutFusion {
    /// Create a new pass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for BatchMatmulDropoutFusion {
    fn name(&self) -> &str {
        "BatchMatmulDropOutDoMaskV3DFusion"
    }

    fn define_patterns(&self) -> Vec<BufferFusionPattern> {
        vec![BufferFusionPattern::new("TbeBatchMatmulDropOutDoMaskV3DFusion")
            .add_op_desc(PATTERN_BATCH_MATMUL, OpCategory::BatchMatMul, 1, 1)
            .add_op_desc(PATTERN_DROPOUT, OpCategory::DropOutDoMaskV3D, 1, 1)
            .set_head(&[PATTERN_BATCH_MATMUL])
            .set_outputs(PATTERN_BATCH_MATMUL, &[PATTERN_DROPOUT], BranchMode::Single)]
    }

    fn set_split_info(&self, graph: &mut dyn GraphAccessor, group: &[NodeId]) -> FusionResult<()> {
        let (bm, dropout) = match group {
            [bm, dropout] => (*bm, *dropout),
            _ => return Ok(()),
        };
        let info = match read_slice_info(&*graph, bm)? {
            Some(info) => info,
            None => {
                debug!(node = %bm, "batch matmul has no slice info");
                return Ok(());
            }
        };

        let mut maps = info.split_maps.clone();
        let extra = external_inputs(&*graph, dropout, group).len();
        add_elemwise_split_map(&mut maps, extra, graph.input_count(bm));
        write_fused_slice_info(graph, group, maps, &info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttrValue, ComputeGraph, OpSpec};
    use crate::split::{
        AxisSplitMap, InputSplitInfo, OutputSplitInfo, SliceInfo, ATTR_FUSION_OP_SLICE_INFO,
        ATTR_OP_SLICE_INFO,
    };
    use crate::tensor::{DataType, Format, TensorDesc};
    use crate::transform::{fused_groups, FusionEngine};

    fn make_bm_slice_info() -> String {
        SliceInfo::from_split_maps(vec![AxisSplitMap::new(
            vec![InputSplitInfo::new(0, vec![0]), InputSplitInfo::new(1, vec![0])],
            vec![OutputSplitInfo::new(0, vec![0])],
        )])
        .to_json()
        .unwrap()
    }

    /// (x, y) -> bm -> dropout <- mask
    fn make_bm_dropout_graph() -> (ComputeGraph, NodeId, NodeId) {
        let d = TensorDesc::new(&[8, 64, 64], Format::Nd, DataType::Float16);
        let mask = TensorDesc::new(&[32768], Format::Nd, DataType::UInt8);
        let mut g = ComputeGraph::new("bm_dropout");
        let x = g.add(OpSpec::new("x", "Data").output(d.clone()));
        let y = g.add(OpSpec::new("y", "Data").output(d.clone()));
        let m = g.add(OpSpec::new("mask", "Data").output(mask.clone()));
        let bm = g.add(
            OpSpec::new("bm", "BatchMatMul")
                .inputs(2, &d)
                .output(d.clone())
                .attr(ATTR_OP_SLICE_INFO, AttrValue::Str(make_bm_slice_info())),
        );
        let dropout = g.add(
            OpSpec::new("dropout", "DropOutDoMaskV3D")
                .input(d.clone())
                .input(mask)
                .output(d),
        );
        g.connect(x, 0, bm, 0).unwrap();
        g.connect(y, 0, bm, 1).unwrap();
        g.connect(bm, 0, dropout, 0).unwrap();
        g.connect(m, 0, dropout, 1).unwrap();
        (g, bm, dropout)
    }

    #[test]
    fn test_bm_dropout_fusion() {
        let (mut g, bm, dropout) = make_bm_dropout_graph();
        let stats = FusionEngine::new()
            .run_pass(&mut g, &BatchMatmulDropoutFusion::new())
            .unwrap();

        assert_eq!(stats.fusions_committed, 1);
        assert_eq!(fused_groups(&g).values().next(), Some(&vec![bm, dropout]));

        let json = g.attr_str(dropout, ATTR_FUSION_OP_SLICE_INFO).unwrap();
        assert_eq!(Some(json), g.attr_str(bm, ATTR_FUSION_OP_SLICE_INFO));
        let maps = SliceInfo::from_json(json).unwrap().split_maps;
        assert_eq!(maps[0].inputs.len(), 3);
        assert_eq!(maps[0].inputs[2], InputSplitInfo::new(2, vec![0]));
    }

    #[test]
    fn test_bm_without_slice_info_still_fuses() {
        let (mut g, bm, dropout) = make_bm_dropout_graph();
        g.set_attr(bm, ATTR_OP_SLICE_INFO, AttrValue::Str(String::new()))
            .unwrap();
        let stats = FusionEngine::new()
            .run_pass(&mut g, &BatchMatmulDropoutFusion::new())
            .unwrap();

        assert_eq!(stats.fusions_committed, 1);
        assert!(g.attr(dropout, ATTR_FUSION_OP_SLICE_INFO).is_none());
    }
}
