//! Split map model and slice-info JSON codec
//!
//! The wire form is the scheduler's slice-info document:
//!
//! ```json
//! {"_op_slice_info": {
//!     "splitMaps": [{"inputList": [{"idx": 0, "axis": [0], "headOverLap": [-1], "tailOverLap": [-1]}],
//!                    "outputList": [{"idx": 0, "axis": [0]}]}],
//!     "reduceMaps": [],
//!     "l1FusionEnable": 0,
//!     "minTbeL1Space": 0}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FusionResult;

/// Halo overlap of an input whose overlap is not known
pub const OVERLAP_UNKNOWN: [i64; 1] = [-1];

/// How one input must be tiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSplitInfo {
    /// Input index
    #[serde(rename = "idx")]
    pub index: usize,
    /// Axes the input is split along
    pub axis: Vec<i64>,
    /// Overlap before each tile
    #[serde(rename = "headOverLap", default = "unknown_overlap")]
    pub head_overlap: Vec<i64>,
    /// Overlap after each tile
    #[serde(rename = "tailOverLap", default = "unknown_overlap")]
    pub tail_overlap: Vec<i64>,
}

fn unknown_overlap() -> Vec<i64> {
    OVERLAP_UNKNOWN.to_vec()
}

impl InputSplitInfo {
    /// Entry with unknown overlaps
    pub fn new(index: usize, axis: Vec<i64>) -> Self {
        Self {
            index,
            axis,
            head_overlap: unknown_overlap(),
            tail_overlap: unknown_overlap(),
        }
    }

    /// Same entry at another index
    pub fn reindexed(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }
}

/// How one output is tiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSplitInfo {
    /// Output index
    #[serde(rename = "idx")]
    pub index: usize,
    /// Axes the output is split along
    pub axis: Vec<i64>,
}

impl OutputSplitInfo {
    /// Output `index` split along `axis`
    pub fn new(index: usize, axis: Vec<i64>) -> Self {
        Self { index, axis }
    }
}

/// One independently tileable axis group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisSplitMap {
    /// Input entries
    #[serde(rename = "inputList", default)]
    pub inputs: Vec<InputSplitInfo>,
    /// Output entries
    #[serde(rename = "outputList", default)]
    pub outputs: Vec<OutputSplitInfo>,
}

impl AxisSplitMap {
    /// Map from entry lists
    pub fn new(inputs: Vec<InputSplitInfo>, outputs: Vec<OutputSplitInfo>) -> Self {
        Self { inputs, outputs }
    }

    /// A map with no output entry cannot be joined with a consumer
    pub fn is_propagatable(&self) -> bool {
        !self.outputs.is_empty()
    }
}

/// Reduced input of a reduce map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReduceInfo {
    /// Input index
    #[serde(rename = "idx")]
    pub index: usize,
    /// Reduced axes
    pub axis: Vec<i64>,
}

/// Output of a reduce map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputReduceInfo {
    /// Output index
    #[serde(rename = "idx")]
    pub index: usize,
    /// Reduction kind
    #[serde(rename = "reduceType", default)]
    pub reduce_type: i64,
    /// Whether partial results are combined atomically
    #[serde(rename = "isAtomic", default)]
    pub is_atomic: bool,
}

/// Reduction tiling entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisReduceMap {
    /// Input entries
    #[serde(rename = "inputList", default)]
    pub inputs: Vec<InputReduceInfo>,
    /// Output entries
    #[serde(rename = "outputList", default)]
    pub outputs: Vec<OutputReduceInfo>,
}

/// Slice info of a node or fused group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceInfo {
    /// Split maps
    #[serde(rename = "splitMaps", default)]
    pub split_maps: Vec<AxisSplitMap>,
    /// Reduce maps
    #[serde(rename = "reduceMaps", default)]
    pub reduce_maps: Vec<AxisReduceMap>,
    /// L1 fusion mode
    #[serde(rename = "l1FusionEnable", default)]
    pub l1_fusion_enable: i64,
    /// Minimum L1 space the kernel needs
    #[serde(rename = "minTbeL1Space", default)]
    pub min_tbe_l1_space: i64,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "_op_slice_info")]
    op_slice_info: SliceInfo,
}

impl SliceInfo {
    /// Slice info holding only split maps
    pub fn from_split_maps(split_maps: Vec<AxisSplitMap>) -> Self {
        Self {
            split_maps,
            ..Default::default()
        }
    }

    /// Parse the wire form
    pub fn from_json(json: &str) -> FusionResult<Self> {
        let envelope: Envelope = serde_json::from_str(json)?;
        Ok(envelope.op_slice_info)
    }

    /// Encode to the wire form
    pub fn to_json(&self) -> FusionResult<String> {
        let envelope = Envelope {
            op_slice_info: self.clone(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FusionError;

    const CONV_SLICE_INFO: &str = r#"{"_op_slice_info": {
        "splitMaps": [
            {"inputList": [{"idx": 0, "axis": [0], "headOverLap": [-1], "tailOverLap": [-1]}],
             "outputList": [{"idx": 0, "axis": [0]}]},
            {"inputList": [{"idx": 1, "axis": [1], "headOverLap": [0], "tailOverLap": [0]}],
             "outputList": [{"idx": 0, "axis": [1]}]}
        ],
        "reduceMaps": [
            {"inputList": [{"idx": 0, "axis": [1]}],
             "outputList": [{"idx": 0, "reduceType": 1, "isAtomic": true}]}
        ],
        "l1FusionEnable": 2,
        "minTbeL1Space": 1024}}"#;

    #[test]
    fn test_parse_slice_info() {
        let info = SliceInfo::from_json(CONV_SLICE_INFO).unwrap();
        assert_eq!(info.split_maps.len(), 2);
        assert_eq!(info.split_maps[1].inputs[0].index, 1);
        assert_eq!(info.split_maps[1].inputs[0].head_overlap, vec![0]);
        assert_eq!(info.split_maps[0].outputs[0], OutputSplitInfo::new(0, vec![0]));
        assert!(info.reduce_maps[0].outputs[0].is_atomic);
        assert_eq!(info.l1_fusion_enable, 2);
        assert_eq!(info.min_tbe_l1_space, 1024);
    }

    #[test]
    fn test_missing_fields_default() {
        let info = SliceInfo::from_json(
            r#"{"_op_slice_info": {"splitMaps": [{"inputList": [{"idx": 0, "axis": [2]}]}]}}"#,
        )
        .unwrap();
        let map = &info.split_maps[0];
        assert_eq!(map.inputs[0].head_overlap, OVERLAP_UNKNOWN.to_vec());
        assert!(map.outputs.is_empty());
        assert!(!map.is_propagatable());
        assert!(info.reduce_maps.is_empty());
    }

    #[test]
    fn test_wire_keys() {
        let info = SliceInfo::from_split_maps(vec![AxisSplitMap::new(
            vec![InputSplitInfo::new(0, vec![0])],
            vec![OutputSplitInfo::new(0, vec![0])],
        )]);
        let json = info.to_json().unwrap();
        for key in [
            "_op_slice_info",
            "splitMaps",
            "inputList",
            "outputList",
            "headOverLap",
            "tailOverLap",
            "\"idx\"",
            "l1FusionEnable",
            "minTbeL1Space",
        ] {
            assert!(json.contains(key), "missing {} in {}", key, json);
        }
        assert_eq!(SliceInfo::from_json(&json).unwrap(), info);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SliceInfo::from_json("{not json"),
            Err(FusionError::SliceInfo(_))
        ));
        assert!(SliceInfo::from_json(r#"{"other": {}}"#).is_err());
    }
}
