use tracing::debug;

use crate::error::FusionResult;
use crate::graph::{InPort, NodeId, OutPort};
use crate::pattern::{BranchMode, BufferFusionMapping, BufferFusionPattern, OpCategory};
use crate::split::{
    add_elemwise_split_map, apply_scale_mode, read_slice_info, write_fused_slice_info, ScaleMode,
};
use crate::traits::GraphAccessor;

use super::common::{external_inputs, FusionPass};

const PATTERN_CONV: &str = "conv";
const PATTERN_DEQUANT: &str = "dequant";
const PATTERN_ADD: &str = "add";
const PATTERN_QUANT: &str = "quant";
const PATTERN_OTHER_INPUT: &str = "otherInput";
const PATTERN_OUTPUT1: &str = "OUTPUT1";
const PATTERN_OUTPUT2: &str = "OUTPUT2";

/// Input anchor of the dequant scale
const DEQUANT_SCALE_INPUT: usize = 1;

/// Channel axis assumed when the conv output format has none
const DEFAULT_CHANNEL_AXIS: i64 = 1;

/// Fuses Conv2D + AscendDequant + Add + AscendQuant
///
/// Matches:
///   Conv2D -> AscendDequant -> Add -> {AscendQuant, OUTPUT1, OUTPUT2}
///   otherInput -> Add
/// The output and input sentinels stay outside the group. A scalar dequant
/// scale forbids tiling the channel axis.
#[derive(Debug, Default)]
pub struct ConvDequantAddQuantFusion;

impl ConvDequantAddQuantFusion {
    /// Create a new pass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for ConvDequantAddQuantFusion {
    fn name(&self) -> &str {
        "ConvDequantAddQuantFusion"
    }

    fn define_patterns(&self) -> Vec<BufferFusionPattern> {
        vec![BufferFusionPattern::new("TbeConvDequantAddQuantFusion")
            .add_op_desc(PATTERN_CONV, OpCategory::Convolution, 1, 1)
            .add_op_desc(PATTERN_DEQUANT, OpCategory::Dequant, 1, 1)
            .add_op_desc(PATTERN_ADD, OpCategory::ElemWise, 1, 1)
            .add_op_desc(PATTERN_QUANT, OpCategory::Quant, 1, 1)
            .add_op_desc(PATTERN_OTHER_INPUT, OpCategory::AnyInput, 1, 1)
            .add_op_desc(PATTERN_OUTPUT1, OpCategory::AnyOutput, 0, 1)
            .add_op_desc(PATTERN_OUTPUT2, OpCategory::AnyOutput, 0, 1)
            .set_head(&[PATTERN_CONV])
            .set_outputs(PATTERN_CONV, &[PATTERN_DEQUANT], BranchMode::Single)
            .set_outputs(PATTERN_DEQUANT, &[PATTERN_ADD], BranchMode::Single)
            .set_outputs(
                PATTERN_ADD,
                &[PATTERN_QUANT, PATTERN_OUTPUT1, PATTERN_OUTPUT2],
                BranchMode::Multi,
            )
            .set_outputs(PATTERN_OTHER_INPUT, &[PATTERN_ADD], BranchMode::Default)]
    }

    fn get_fusion_nodes(
        &self,
        graph: &dyn GraphAccessor,
        pattern: &BufferFusionPattern,
        mapping: &BufferFusionMapping,
    ) -> FusionResult<Vec<NodeId>> {
        // A broadcasting add cannot share the conv's tiling
        if let Some(add) = mapping.first_by_name(pattern, PATTERN_ADD) {
            let out = graph.output_desc(OutPort::new(add, 0)).map(|d| d.shape.clone());
            let broadcasting = (0..graph.input_count(add)).any(|i| {
                graph.input_desc(InPort::new(add, i)).map(|d| d.shape.clone()) != out
            });
            if broadcasting {
                debug!(node = %add, "add broadcasts, not fusing");
                return Ok(Vec::new());
            }
        }
        Ok(mapping.fused_node_group(pattern))
    }

    fn set_split_info(&self, graph: &mut dyn GraphAccessor, group: &[NodeId]) -> FusionResult<()> {
        let conv = match group.first() {
            Some(&n) => n,
            None => return Ok(()),
        };
        let info = match read_slice_info(&*graph, conv)? {
            Some(info) => info,
            None => {
                debug!(node = %conv, "conv has no slice info");
                return Ok(());
            }
        };
        let channel_axis = graph
            .output_desc(OutPort::new(conv, 0))
            .and_then(|d| d.format.channel_axis())
            .unwrap_or(DEFAULT_CHANNEL_AXIS);

        let mut maps = info.split_maps.clone();
        maps.retain(|m| m.is_propagatable());
        let mut pre = graph.input_count(conv);

        for (i, &n) in group.iter().enumerate().skip(1) {
            let extra = external_inputs(&*graph, n, &group[..i]);
            let quantizing = matches!(
                graph.op_category(n),
                Some(OpCategory::Dequant | OpCategory::Quant | OpCategory::Requant)
            );
            if quantizing && extra.contains(&DEQUANT_SCALE_INPUT) {
                let mode = scale_mode(&*graph, n);
                maps = apply_scale_mode(&maps, mode, channel_axis, pre);
                pre += extra.len();
            } else {
                pre = add_elemwise_split_map(&mut maps, extra.len(), pre);
            }
        }

        write_fused_slice_info(graph, group, maps, &info)
    }
}

/// Scale mode of a quantization node, scalar when it cannot be told
fn scale_mode(graph: &dyn GraphAccessor, node: NodeId) -> ScaleMode {
    let port = InPort::new(node, DEQUANT_SCALE_INPUT);
    match ScaleMode::from_desc(graph.input_desc(port)) {
        Ok(mode) => mode,
        Err(e) => match graph.constant_input(port) {
            Some(scale) => ScaleMode::from_constant(&scale)
                .unwrap_or_else(|_| ScaleMode::from_shape(&scale.shape)),
            None => {
                debug!(node = %node, error = %e, "scale mode unknown, assuming scalar");
                ScaleMode::Scalar
            }
        },
    }
}
