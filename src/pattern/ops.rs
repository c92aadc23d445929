//! Op-pattern categories and accepted-type sets
//!
//! Every node carries an [`OpCategory`] derived from its op type. A pattern
//! slot accepts a node when the node's category or literal op type is in the
//! slot's [`TypeSet`].

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::FusionError;

/// Convolution-like operations
pub const CONV_OPS: &[&str] = &[
    "Conv2D",
    "Conv3D",
    "DepthwiseConv2D",
    "Conv2DTranspose",
    "Conv2DBackpropInputD",
];

/// Matrix multiplication
pub const MATMUL_OPS: &[&str] = &["MatMul", "MatMulV2"];

/// Batched matrix multiplication
pub const BATCH_MATMUL_OPS: &[&str] = &["BatchMatMul", "BatchMatMulV2"];

/// Element-wise operations
pub const ELEMWISE_OPS: &[&str] = &[
    "Relu",
    "Relu6",
    "LeakyRelu",
    "Sigmoid",
    "Tanh",
    "Elu",
    "Gelu",
    "Add",
    "Sub",
    "Mul",
    "Div",
    "Adds",
    "Muls",
    "Exp",
    "Cast",
];

/// Explicit broadcast operations
pub const BROADCAST_OPS: &[&str] = &["BroadcastTo", "Tile"];

/// Dropout masking
pub const DROPOUT_OPS: &[&str] = &["DropOutDoMaskV3D", "DropOutDoMask"];

/// Layout conversion
pub const TRANSDATA_OPS: &[&str] = &["TransData"];

/// Pooling operations
pub const POOL_OPS: &[&str] = &["MaxPool", "AvgPool", "Pooling"];

/// Reduction operations
pub const REDUCE_OPS: &[&str] = &["ReduceSumD", "ReduceMeanD", "ReduceMaxD", "ReduceSum"];

/// Op categories for pattern matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Convolution operations
    Convolution,
    /// Matrix multiplication
    MatMul,
    /// Batched matrix multiplication
    BatchMatMul,
    /// Element-wise operations
    ElemWise,
    /// Explicit broadcast
    Broadcast,
    /// Int8 to float conversion
    Dequant,
    /// Float to int8 conversion
    Quant,
    /// Int32 to int8 requantization
    Requant,
    /// Dropout masking
    DropOutDoMaskV3D,
    /// Layout conversion
    TransData,
    /// Pooling operations
    Pool,
    /// Reduction operations
    CommReduce,
    /// Strided read
    StridedRead,
    /// Strided write
    StridedWrite,
    /// Read select
    ReadSelect,
    /// Write select
    WriteSelect,
    /// Pattern sentinel: any producer outside the fused group
    AnyInput,
    /// Pattern sentinel: any consumer outside the fused group
    AnyOutput,
    /// Unknown/Other
    Opaque,
}

impl OpCategory {
    /// Every category, in declaration order
    pub const ALL: [OpCategory; 19] = [
        OpCategory::Convolution,
        OpCategory::MatMul,
        OpCategory::BatchMatMul,
        OpCategory::ElemWise,
        OpCategory::Broadcast,
        OpCategory::Dequant,
        OpCategory::Quant,
        OpCategory::Requant,
        OpCategory::DropOutDoMaskV3D,
        OpCategory::TransData,
        OpCategory::Pool,
        OpCategory::CommReduce,
        OpCategory::StridedRead,
        OpCategory::StridedWrite,
        OpCategory::ReadSelect,
        OpCategory::WriteSelect,
        OpCategory::AnyInput,
        OpCategory::AnyOutput,
        OpCategory::Opaque,
    ];

    /// Pattern tag string
    pub fn as_str(self) -> &'static str {
        match self {
            OpCategory::Convolution => "Convolution",
            OpCategory::MatMul => "Matmul",
            OpCategory::BatchMatMul => "BatchMatmul",
            OpCategory::ElemWise => "ElemWise",
            OpCategory::Broadcast => "Broadcast",
            OpCategory::Dequant => "dequant",
            OpCategory::Quant => "quant",
            OpCategory::Requant => "requant",
            OpCategory::DropOutDoMaskV3D => "DropOutDoMaskV3D",
            OpCategory::TransData => "TransData",
            OpCategory::Pool => "Pool",
            OpCategory::CommReduce => "CommReduce",
            OpCategory::StridedRead => "strided_read",
            OpCategory::StridedWrite => "strided_write",
            OpCategory::ReadSelect => "read_select",
            OpCategory::WriteSelect => "write_select",
            OpCategory::AnyInput => "InputData",
            OpCategory::AnyOutput => "OutputData",
            OpCategory::Opaque => "opaque",
        }
    }

    /// True for the `AnyInput`/`AnyOutput` pattern sentinels
    pub fn is_sentinel(self) -> bool {
        matches!(self, OpCategory::AnyInput | OpCategory::AnyOutput)
    }
}

impl fmt::Display for OpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpCategory {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| FusionError::Config(format!("unknown op category: {}", s)))
    }
}

/// Categorize an op type
pub fn categorize_op(op_type: &str) -> OpCategory {
    if CONV_OPS.contains(&op_type) {
        OpCategory::Convolution
    } else if MATMUL_OPS.contains(&op_type) {
        OpCategory::MatMul
    } else if BATCH_MATMUL_OPS.contains(&op_type) {
        OpCategory::BatchMatMul
    } else if ELEMWISE_OPS.contains(&op_type) {
        OpCategory::ElemWise
    } else if BROADCAST_OPS.contains(&op_type) {
        OpCategory::Broadcast
    } else if DROPOUT_OPS.contains(&op_type) {
        OpCategory::DropOutDoMaskV3D
    } else if TRANSDATA_OPS.contains(&op_type) {
        OpCategory::TransData
    } else if POOL_OPS.contains(&op_type) {
        OpCategory::Pool
    } else if REDUCE_OPS.contains(&op_type) {
        OpCategory::CommReduce
    } else {
        match op_type {
            "AscendDequant" => OpCategory::Dequant,
            "AscendQuant" => OpCategory::Quant,
            "AscendRequant" => OpCategory::Requant,
            "StridedRead" => OpCategory::StridedRead,
            "StridedWrite" => OpCategory::StridedWrite,
            "ReadSelect" => OpCategory::ReadSelect,
            "WriteSelect" => OpCategory::WriteSelect,
            _ => OpCategory::Opaque,
        }
    }
}

/// One accepted-type tag of a pattern slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpTag {
    /// Any node of this category
    Category(OpCategory),
    /// Nodes with exactly this op type
    OpType(String),
}

impl From<OpCategory> for OpTag {
    fn from(category: OpCategory) -> Self {
        OpTag::Category(category)
    }
}

impl From<&str> for OpTag {
    fn from(op_type: &str) -> Self {
        OpTag::OpType(op_type.to_string())
    }
}

/// Accepted-type set of a pattern slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet {
    tags: SmallVec<[OpTag; 2]>,
}

impl TypeSet {
    /// Empty set (accepts nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding a single category
    pub fn category(category: OpCategory) -> Self {
        Self::new().with(category)
    }

    /// Set holding several categories
    pub fn categories(categories: &[OpCategory]) -> Self {
        categories.iter().fold(Self::new(), |set, &c| set.with(c))
    }

    /// Add a tag
    pub fn with(mut self, tag: impl Into<OpTag>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Tags in insertion order
    pub fn tags(&self) -> &[OpTag] {
        &self.tags
    }

    /// True when no tag is present
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// True when the set holds an `AnyInput`/`AnyOutput` sentinel
    pub fn is_sentinel(&self) -> bool {
        self.tags
            .iter()
            .any(|t| matches!(t, OpTag::Category(c) if c.is_sentinel()))
    }

    /// True if a node of `category` / `op_type` is accepted
    pub fn accepts(&self, category: OpCategory, op_type: &str) -> bool {
        self.tags.iter().any(|tag| match tag {
            OpTag::Category(c) if c.is_sentinel() => true,
            OpTag::Category(c) => *c == category,
            OpTag::OpType(t) => t == op_type,
        })
    }
}

impl From<OpCategory> for TypeSet {
    fn from(category: OpCategory) -> Self {
        TypeSet::category(category)
    }
}

impl From<&[OpCategory]> for TypeSet {
    fn from(categories: &[OpCategory]) -> Self {
        TypeSet::categories(categories)
    }
}

impl<const N: usize> From<[OpCategory; N]> for TypeSet {
    fn from(categories: [OpCategory; N]) -> Self {
        TypeSet::categories(&categories)
    }
}

impl From<&str> for TypeSet {
    fn from(op_type: &str) -> Self {
        TypeSet::new().with(op_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_op() {
        assert_eq!(categorize_op("Conv2D"), OpCategory::Convolution);
        assert_eq!(categorize_op("MatMulV2"), OpCategory::MatMul);
        assert_eq!(categorize_op("BatchMatMul"), OpCategory::BatchMatMul);
        assert_eq!(categorize_op("Relu"), OpCategory::ElemWise);
        assert_eq!(categorize_op("AscendDequant"), OpCategory::Dequant);
        assert_eq!(categorize_op("AscendQuant"), OpCategory::Quant);
        assert_eq!(categorize_op("DropOutDoMaskV3D"), OpCategory::DropOutDoMaskV3D);
        assert_eq!(categorize_op("TransData"), OpCategory::TransData);
        assert_eq!(categorize_op("ReduceSumD"), OpCategory::CommReduce);
        assert_eq!(categorize_op("Data"), OpCategory::Opaque);
    }

    #[test]
    fn test_category_string_round_trip() {
        for c in OpCategory::ALL {
            assert_eq!(c.as_str().parse::<OpCategory>().unwrap(), c);
        }
        assert!("NotACategory".parse::<OpCategory>().is_err());
    }

    #[test]
    fn test_type_set_accepts() {
        let set = TypeSet::categories(&[OpCategory::ElemWise, OpCategory::Broadcast]);
        assert!(set.accepts(OpCategory::ElemWise, "Relu"));
        assert!(set.accepts(OpCategory::Broadcast, "Tile"));
        assert!(!set.accepts(OpCategory::Convolution, "Conv2D"));

        let literal = TypeSet::from("Add");
        assert!(literal.accepts(OpCategory::Opaque, "Add"));
        assert!(!literal.accepts(OpCategory::ElemWise, "Mul"));
    }

    #[test]
    fn test_sentinel_accepts_everything() {
        let set = TypeSet::category(OpCategory::AnyInput);
        assert!(set.is_sentinel());
        assert!(set.accepts(OpCategory::Opaque, "Data"));
        assert!(set.accepts(OpCategory::Convolution, "Conv2D"));
        assert!(!TypeSet::category(OpCategory::Quant).is_sentinel());
    }

    #[test]
    fn test_type_set_dedup() {
        let set = TypeSet::new()
            .with(OpCategory::Quant)
            .with(OpCategory::Quant)
            .with("AscendQuant");
        assert_eq!(set.tags().len(), 2);
    }
}
