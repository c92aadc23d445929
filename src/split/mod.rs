//! Split info (axis tiling) for fused operators
//!
//! - [`AxisSplitMap`] and friends: the per-node tiling model and its JSON
//!   wire form (`codec`)
//! - [`SplitInfoPropagator`] and the elementwise helpers: re-express member
//!   split maps in the fused group's index space (`propagate`)
//! - Reading and writing the slice-info attributes on a graph (`annotate`)
//!
//! # Overview
//!
//! A node publishes a list of [`AxisSplitMap`]s. Each says: "if output
//! `idx` is tiled along `axis`, input `idx` must be tiled along its paired
//! axis with the given halo overlap". After fusion, the group publishes the
//! intersection of its members' maps under `_fusion_op_slice_info`.

pub mod annotate;
pub mod codec;
pub mod propagate;

pub use annotate::{
    member_from_graph, propagate_for_group, read_slice_info, write_fused_slice_info,
    ATTR_FUSION_OP_SLICE_INFO, ATTR_OP_SLICE_INFO,
};
pub use codec::{
    AxisReduceMap, AxisSplitMap, InputReduceInfo, InputSplitInfo, OutputReduceInfo,
    OutputSplitInfo, SliceInfo, OVERLAP_UNKNOWN,
};
pub use propagate::{
    add_elemwise_split_map, apply_scale_mode, del_split_info_by_input_axis,
    del_split_info_by_output_axis, intersect_split_maps, MemberSplit, ScaleMode,
    SplitInfoPropagator,
};
