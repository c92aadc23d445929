//! Split map propagation through a fused group
//!
//! # Index space
//!
//! Fused-group inputs are numbered anchor first, then each member's external
//! inputs in member order. A member input fed by an earlier member is
//! internal: it is not a group input and its split entries are dropped.
//!
//! ```text
//! anchor: in 0, 1          -> group 0, 1
//! add:    in 0 (internal)  -> dropped
//!         in 1             -> group 2
//! ```

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{FusionError, FusionResult};
use crate::tensor::{is_scalar_like, ConstTensor, TensorDesc};

use super::codec::{AxisSplitMap, InputSplitInfo};

/// Split maps of one fused member in its own index space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSplit {
    /// The member's own split maps
    pub maps: Vec<AxisSplitMap>,
    /// Total input count of the member
    pub input_count: usize,
    /// Input indices fed by an earlier member of the group
    pub ignored_inputs: Vec<usize>,
}

impl MemberSplit {
    /// Member with no internal input
    pub fn new(maps: Vec<AxisSplitMap>, input_count: usize) -> Self {
        Self {
            maps,
            input_count,
            ignored_inputs: Vec::new(),
        }
    }

    /// Mark an input as internal
    pub fn with_ignored_input(mut self, index: usize) -> Self {
        if !self.ignored_inputs.contains(&index) {
            self.ignored_inputs.push(index);
        }
        self
    }

    /// Number of inputs this member adds to the group
    pub fn external_input_count(&self) -> usize {
        let internal = self
            .ignored_inputs
            .iter()
            .filter(|&&i| i < self.input_count)
            .count();
        self.input_count - internal
    }
}

/// Group index of member input `index`, or `None` if it is internal
fn group_index(index: usize, offset: usize, ignored: &[usize]) -> Option<usize> {
    if ignored.contains(&index) {
        return None;
    }
    let internal_before = ignored.iter().filter(|&&i| i < index).count();
    Some(offset + index - internal_before)
}

/// Join `anchor` maps with one member's maps
///
/// A member map is kept for an anchor map when one of its output entries has
/// the same `(index, axis)` as one of the anchor's output entries. The result
/// carries the anchor's inputs, the member's external inputs re-indexed from
/// `offset`, and the member's outputs. Anchor maps without outputs are
/// skipped.
///
/// Unlike a plain `index + offset`, external indices are compacted past the
/// member's internal inputs, so a member whose internal input precedes an
/// external one cannot collide with the next member's indices.
pub fn intersect_split_maps(
    anchor: &[AxisSplitMap],
    member: &[AxisSplitMap],
    offset: usize,
    ignored_inputs: &[usize],
) -> Vec<AxisSplitMap> {
    let mut merged: Vec<AxisSplitMap> = Vec::new();

    for a in anchor.iter().filter(|m| m.is_propagatable()) {
        for out in &a.outputs {
            for m in member {
                let joined = m
                    .outputs
                    .iter()
                    .any(|o| o.index == out.index && o.axis == out.axis);
                if !joined {
                    continue;
                }

                let mut inputs = a.inputs.clone();
                for input in &m.inputs {
                    if let Some(real) = group_index(input.index, offset, ignored_inputs) {
                        inputs.push(input.reindexed(real));
                    }
                }
                let candidate = AxisSplitMap::new(inputs, m.outputs.clone());
                if !merged.contains(&candidate) {
                    merged.push(candidate);
                }
            }
        }
    }

    trace!(
        anchor = anchor.len(),
        member = member.len(),
        merged = merged.len(),
        offset,
        "intersected split maps"
    );
    merged
}

/// Chains [`intersect_split_maps`] from an anchor through its fused members
///
/// # Example
///
/// ```ignore
/// let maps = SplitInfoPropagator::new(conv_maps, 2)
///     .with_member(MemberSplit::new(relu_maps, 1).with_ignored_input(0))
///     .propagate();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SplitInfoPropagator {
    anchor: Vec<AxisSplitMap>,
    anchor_input_count: usize,
    members: Vec<MemberSplit>,
}

impl SplitInfoPropagator {
    /// Start from the anchor's maps
    pub fn new(anchor: Vec<AxisSplitMap>, anchor_input_count: usize) -> Self {
        Self {
            anchor,
            anchor_input_count,
            members: Vec::new(),
        }
    }

    /// Append the next member
    pub fn with_member(mut self, member: MemberSplit) -> Self {
        self.members.push(member);
        self
    }

    /// Append the next member in place
    pub fn push_member(&mut self, member: MemberSplit) {
        self.members.push(member);
    }

    /// Number of group inputs once every member is counted
    pub fn group_input_count(&self) -> usize {
        self.anchor_input_count
            + self
                .members
                .iter()
                .map(MemberSplit::external_input_count)
                .sum::<usize>()
    }

    /// Merged maps in group index space
    ///
    /// With no member, the anchor's propagatable maps are returned as is.
    pub fn propagate(&self) -> Vec<AxisSplitMap> {
        let mut current: Vec<AxisSplitMap> = self
            .anchor
            .iter()
            .filter(|m| m.is_propagatable())
            .cloned()
            .collect();
        let mut offset = self.anchor_input_count;

        for member in &self.members {
            current = intersect_split_maps(&current, &member.maps, offset, &member.ignored_inputs);
            offset += member.external_input_count();
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

/// Append `extra_inputs` group inputs to every map, tiled like its first output
///
/// Maps without outputs are dropped. New entries take indices `pre..pre +
/// extra_inputs` and unknown overlaps.
///
/// # Returns
/// * The counter after the appended inputs
pub fn add_elemwise_split_map(
    maps: &mut Vec<AxisSplitMap>,
    extra_inputs: usize,
    pre: usize,
) -> usize {
    maps.retain(AxisSplitMap::is_propagatable);
    for map in maps.iter_mut() {
        let axis = map.outputs[0].axis.clone();
        for i in 0..extra_inputs {
            map.inputs.push(InputSplitInfo::new(pre + i, axis.clone()));
        }
    }
    pre + extra_inputs
}

/// Drop every map with an output split along `axis`
pub fn del_split_info_by_output_axis(maps: &[AxisSplitMap], axis: i64) -> Vec<AxisSplitMap> {
    maps.iter()
        .filter(|m| !m.outputs.iter().any(|o| o.axis.contains(&axis)))
        .cloned()
        .collect()
}

/// Drop every map with an input split along `axis`
pub fn del_split_info_by_input_axis(maps: &[AxisSplitMap], axis: i64) -> Vec<AxisSplitMap> {
    maps.iter()
        .filter(|m| !m.inputs.iter().any(|i| i.axis.contains(&axis)))
        .cloned()
        .collect()
}

/// How a quantization scale is shared across channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// One value for every channel
    Scalar,
    /// One value per channel
    PerChannel,
}

impl ScaleMode {
    /// Mode of a scale tensor with this shape
    pub fn from_shape(shape: &[i64]) -> Self {
        if is_scalar_like(shape) {
            Self::Scalar
        } else {
            Self::PerChannel
        }
    }

    /// Mode of a scale tensor descriptor
    ///
    /// Fails when the descriptor is missing or its shape is unknown.
    pub fn from_desc(desc: Option<&TensorDesc>) -> FusionResult<Self> {
        let desc = desc.ok_or_else(|| {
            FusionError::UnsupportedConfiguration("scale tensor has no descriptor".to_string())
        })?;
        if desc.is_dynamic() {
            return Err(FusionError::UnsupportedConfiguration(format!(
                "scale tensor shape {:?} is not static",
                desc.shape
            )));
        }
        Ok(Self::from_shape(&desc.shape))
    }

    /// Mode of a constant scale, decided by its element count
    ///
    /// A `[1, 1, 1]` constant holds a single value and is scalar even though
    /// its shape is not.
    pub fn from_constant(scale: &ConstTensor) -> FusionResult<Self> {
        let count = match scale.to_array_f32() {
            Ok(values) => values.len(),
            Err(_) => scale.to_array_i64()?.len(),
        };
        Ok(if count <= 1 {
            Self::Scalar
        } else {
            Self::PerChannel
        })
    }
}

/// Adjust maps for a quantization scale feeding group input `scale_input_index`
///
/// A scalar scale forbids tiling the channel axis, so those maps are
/// removed. A per-channel scale is tiled with the channels: maps along the
/// channel axis gain an entry splitting the scale on its only axis.
pub fn apply_scale_mode(
    maps: &[AxisSplitMap],
    mode: ScaleMode,
    channel_axis: i64,
    scale_input_index: usize,
) -> Vec<AxisSplitMap> {
    match mode {
        ScaleMode::Scalar => del_split_info_by_output_axis(maps, channel_axis),
        ScaleMode::PerChannel => {
            let mut maps = maps.to_vec();
            for map in maps.iter_mut() {
                let along_channel = map.outputs.iter().any(|o| o.axis.contains(&channel_axis));
                let present = map.inputs.iter().any(|i| i.index == scale_input_index);
                if along_channel && !present {
                    map.inputs.push(InputSplitInfo::new(scale_input_index, vec![0]));
                }
            }
            maps
        }
    }
}

/// Output axes of every map, for logging
pub(crate) fn output_axes(maps: &[AxisSplitMap]) -> SmallVec<[i64; 4]> {
    let mut axes: SmallVec<[i64; 4]> = SmallVec::new();
    for a in maps.iter().flat_map(|m| m.outputs.iter().flat_map(|o| o.axis.iter())) {
        if !axes.contains(a) {
            axes.push(*a);
        }
    }
    axes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::codec::{OutputSplitInfo, OVERLAP_UNKNOWN};
    use crate::tensor::{DataType, Format};

    fn make_map(inputs: &[(usize, i64)], outputs: &[(usize, i64)]) -> AxisSplitMap {
        AxisSplitMap::new(
            inputs
                .iter()
                .map(|&(i, a)| InputSplitInfo::new(i, vec![a]))
                .collect(),
            outputs
                .iter()
                .map(|&(i, a)| OutputSplitInfo::new(i, vec![a]))
                .collect(),
        )
    }

    /// Batch split and channel split of a two-input anchor
    fn make_anchor_maps() -> Vec<AxisSplitMap> {
        vec![
            make_map(&[(0, 0)], &[(0, 0)]),
            make_map(&[(1, 1)], &[(0, 1)]),
        ]
    }

    #[test]
    fn test_intersect_reindexes_member_inputs() {
        // add(x = anchor output, y = external)
        let member = vec![
            make_map(&[(0, 0), (1, 0)], &[(0, 0)]),
            make_map(&[(0, 2), (1, 2)], &[(0, 2)]),
        ];
        let merged = intersect_split_maps(&make_anchor_maps(), &member, 2, &[0]);

        assert_eq!(merged.len(), 1);
        let indices: Vec<usize> = merged[0].inputs.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(merged[0].outputs, vec![OutputSplitInfo::new(0, vec![0])]);
    }

    #[test]
    fn test_intersect_compacts_after_internal_input() {
        // mul(y = external, x = anchor output, z = external)
        let member = vec![make_map(&[(0, 0), (1, 0), (2, 0)], &[(0, 0)])];
        let merged = intersect_split_maps(&make_anchor_maps(), &member, 2, &[1]);
        let indices: Vec<usize> = merged[0].inputs.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
    }

    #[test]
    fn test_intersect_skips_maps_without_outputs() {
        let anchor = vec![make_map(&[(0, 0)], &[])];
        let member = vec![make_map(&[(0, 0)], &[(0, 0)])];
        assert!(intersect_split_maps(&anchor, &member, 1, &[]).is_empty());
    }

    #[test]
    fn test_propagate_chains_members() {
        let relu = MemberSplit::new(
            vec![
                make_map(&[(0, 0)], &[(0, 0)]),
                make_map(&[(0, 1)], &[(0, 1)]),
            ],
            1,
        )
        .with_ignored_input(0);
        let add = MemberSplit::new(vec![make_map(&[(0, 1), (1, 1)], &[(0, 1)])], 2)
            .with_ignored_input(0);

        let propagator = SplitInfoPropagator::new(make_anchor_maps(), 2)
            .with_member(relu)
            .with_member(add);
        let merged = propagator.propagate();

        assert_eq!(propagator.group_input_count(), 3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].inputs, vec![
            InputSplitInfo::new(1, vec![1]),
            InputSplitInfo::new(2, vec![1]),
        ]);
        assert_eq!(output_axes(&merged).as_slice(), &[1]);
    }

    #[test]
    fn test_propagate_member_without_maps() {
        let merged = SplitInfoPropagator::new(make_anchor_maps(), 2)
            .with_member(MemberSplit::new(Vec::new(), 1).with_ignored_input(0))
            .propagate();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_propagate_without_members() {
        let mut anchor = make_anchor_maps();
        anchor.push(make_map(&[(0, 3)], &[]));
        let merged = SplitInfoPropagator::new(anchor, 2).propagate();
        assert_eq!(merged, make_anchor_maps());
    }

    #[test]
    fn test_add_elemwise_split_map() {
        let mut maps = vec![make_map(&[(0, 0)], &[(0, 0)])];
        let pre = add_elemwise_split_map(&mut maps, 1, 1);

        assert_eq!(pre, 2);
        let added = &maps[0].inputs[1];
        assert_eq!(added.index, 1);
        assert_eq!(added.axis, vec![0]);
        assert_eq!(added.head_overlap, OVERLAP_UNKNOWN.to_vec());
        assert_eq!(added.tail_overlap, OVERLAP_UNKNOWN.to_vec());
    }

    #[test]
    fn test_add_elemwise_drops_maps_without_outputs() {
        let mut maps = vec![make_map(&[(0, 0)], &[]), make_map(&[(0, 1)], &[(0, 1)])];
        add_elemwise_split_map(&mut maps, 2, 3);
        assert_eq!(maps.len(), 1);
        let indices: Vec<usize> = maps[0].inputs.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 3, 4]);
    }

    #[test]
    fn test_del_split_info_by_axis() {
        let maps = make_anchor_maps();
        assert_eq!(del_split_info_by_output_axis(&maps, 1), vec![maps[0].clone()]);
        assert_eq!(del_split_info_by_input_axis(&maps, 0), vec![maps[1].clone()]);
        assert_eq!(del_split_info_by_output_axis(&maps, 3), maps);
    }

    #[test]
    fn test_scale_mode() {
        assert_eq!(ScaleMode::from_shape(&[1]), ScaleMode::Scalar);
        assert_eq!(ScaleMode::from_shape(&[]), ScaleMode::Scalar);
        assert_eq!(ScaleMode::from_shape(&[16]), ScaleMode::PerChannel);

        let tensor = TensorDesc::new(&[16], Format::Nd, DataType::Float16);
        assert_eq!(ScaleMode::from_desc(Some(&tensor)).unwrap(), ScaleMode::PerChannel);
        assert!(ScaleMode::from_desc(None).is_err());
        assert!(ScaleMode::from_desc(Some(&TensorDesc::nd(&[-1]))).is_err());
    }

    #[test]
    fn test_scale_mode_from_constant() {
        let single = ConstTensor::from_f32(&[1, 1, 1, 1], &[0.25]);
        assert_eq!(ScaleMode::from_constant(&single).unwrap(), ScaleMode::Scalar);

        let channels = ConstTensor::from_i64(&[4], &[1, 2, 3, 4]);
        assert_eq!(ScaleMode::from_constant(&channels).unwrap(), ScaleMode::PerChannel);

        let packed = ConstTensor {
            dtype: DataType::UInt64,
            shape: vec![4],
            bytes: vec![0; 32],
        };
        assert!(ScaleMode::from_constant(&packed).is_err());
    }

    #[test]
    fn test_apply_scale_mode() {
        let maps = make_anchor_maps();

        let scalar = apply_scale_mode(&maps, ScaleMode::Scalar, 1, 2);
        assert_eq!(scalar, vec![maps[0].clone()]);

        let per_channel = apply_scale_mode(&maps, ScaleMode::PerChannel, 1, 2);
        assert_eq!(per_channel.len(), 2);
        assert_eq!(per_channel[0], maps[0]);
        assert_eq!(per_channel[1].inputs[1], InputSplitInfo::new(2, vec![0]));
    }
}
