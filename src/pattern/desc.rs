//! Pattern graph definition
//!
//! A [`BufferFusionPattern`] is a small directed graph of named slots
//! ([`PatternDesc`]). Each slot accepts a set of op categories or op types and
//! binds between `min` and `max` real nodes. Patterns are built once per pass
//! with a fluent builder:
//!
//! ```ignore
//! let pattern = BufferFusionPattern::new("ConvDequantFusion")
//!     .add_op_desc("conv", OpCategory::Convolution, 1, 1)
//!     .add_op_desc("dequant", OpCategory::Dequant, 1, 1)
//!     .set_head(&["conv"])
//!     .set_outputs("conv", &["dequant"], BranchMode::Single);
//! ```
//!
//! Builder mistakes never panic. They are recorded on the pattern and
//! surface through [`BufferFusionPattern::validate`]; the matcher treats an
//! invalid pattern as one that never matches.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::error::{FusionError, FusionResult};

use super::ops::TypeSet;

/// Index of a slot within its pattern, in declaration order
pub type DescId = usize;

/// Slot may bind no node
pub const REPEAT_NONE: usize = 0;

/// Default multiplicity
pub const REPEAT_DEFAULT: usize = 1;

/// Unbounded multiplicity
pub const REPEAT_MAX: usize = usize::MAX;

/// Slot belongs to no group
pub const GROUP_ID_INVALID: i64 = -1;

/// Static/dynamic shape constraint of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeTypeRule {
    /// Node must be static iff the head node is static
    #[default]
    MatchHead,
    /// Any shape type
    Ignore,
    /// Only nodes with fully known shapes
    StaticOnly,
    /// Only nodes with unknown dimensions
    DynamicOnly,
}

impl ShapeTypeRule {
    /// Check a candidate's dynamic-ness against the rule
    pub fn admits(self, candidate_dynamic: bool, head_dynamic: bool) -> bool {
        match self {
            ShapeTypeRule::MatchHead => candidate_dynamic == head_dynamic,
            ShapeTypeRule::Ignore => true,
            ShapeTypeRule::StaticOnly => !candidate_dynamic,
            ShapeTypeRule::DynamicOnly => candidate_dynamic,
        }
    }
}

/// Fan-out rule on a producer slot's outgoing pattern edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchMode {
    /// Multiple consumer slots allowed
    #[default]
    Default,
    /// One consumer slot, and every real producer has exactly one data consumer
    Single,
    /// Multiple consumer slots allowed
    Multi,
}

/// One named slot of a pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDesc {
    /// Declaration index
    pub id: DescId,
    /// Unique name within the pattern
    pub name: String,
    /// Accepted categories / op types
    pub types: TypeSet,
    /// Minimum number of bound nodes
    pub min: usize,
    /// Maximum number of bound nodes
    pub max: usize,
    /// Group tag for passes that address several slots together
    pub group_id: i64,
    /// Shape-type constraint
    pub shape_rule: ShapeTypeRule,
    /// Consumer slots, in edge order
    pub outputs: Vec<DescId>,
    /// Fan-out rule for `outputs`
    pub branch: BranchMode,
}

impl PatternDesc {
    /// True for an `AnyInput`/`AnyOutput` sentinel slot
    pub fn is_sentinel(&self) -> bool {
        self.types.is_sentinel()
    }

    /// True if the slot may stay empty
    pub fn is_optional(&self) -> bool {
        self.min == REPEAT_NONE
    }
}

/// Directed graph of pattern slots
#[derive(Debug, Clone, PartialEq)]
pub struct BufferFusionPattern {
    name: String,
    descs: Vec<PatternDesc>,
    by_name: IndexMap<String, DescId>,
    heads: Vec<DescId>,
    errors: Vec<String>,
}

impl BufferFusionPattern {
    /// Create an empty pattern
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descs: Vec::new(),
            by_name: IndexMap::new(),
            heads: Vec::new(),
            errors: Vec::new(),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    /// Declare a slot
    ///
    /// Sentinel slots ignore shape type; every other slot must match the
    /// head's static/dynamic shape.
    pub fn add_op_desc(self, name: &str, types: impl Into<TypeSet>, min: usize, max: usize) -> Self {
        let types = types.into();
        let rule = if types.is_sentinel() {
            ShapeTypeRule::Ignore
        } else {
            ShapeTypeRule::MatchHead
        };
        self.add_op_desc_with(name, types, min, max, GROUP_ID_INVALID, rule)
    }

    /// Declare a slot with an explicit group id and shape rule
    pub fn add_op_desc_with(
        mut self,
        name: &str,
        types: impl Into<TypeSet>,
        min: usize,
        max: usize,
        group_id: i64,
        shape_rule: ShapeTypeRule,
    ) -> Self {
        let types = types.into();
        if self.by_name.contains_key(name) {
            self.errors.push(format!("duplicate descriptor name '{}'", name));
            return self;
        }
        if types.is_empty() {
            self.errors
                .push(format!("descriptor '{}' accepts no op type", name));
        }
        if max < 1 {
            self.errors
                .push(format!("descriptor '{}' has max count 0", name));
        }
        if min > max {
            self.errors.push(format!(
                "descriptor '{}' has min count {} above max count {}",
                name, min, max
            ));
        }

        let id = self.descs.len();
        self.by_name.insert(name.to_string(), id);
        self.descs.push(PatternDesc {
            id,
            name: name.to_string(),
            types,
            min,
            max,
            group_id,
            shape_rule,
            outputs: Vec::new(),
            branch: BranchMode::Default,
        });
        self
    }

    /// Designate the head slot(s) matching starts from
    pub fn set_head(mut self, names: &[&str]) -> Self {
        for name in names {
            match self.by_name.get(*name) {
                Some(&id) if !self.heads.contains(&id) => self.heads.push(id),
                Some(_) => {}
                None => self
                    .errors
                    .push(format!("head '{}' is not a declared descriptor", name)),
            }
        }
        self
    }

    /// Add pattern edges from `name` to each of `outputs`
    ///
    /// Repeated calls for the same producer append edges; the last mode wins.
    pub fn set_outputs(mut self, name: &str, outputs: &[&str], mode: BranchMode) -> Self {
        let Some(&producer) = self.by_name.get(name) else {
            self.errors
                .push(format!("producer '{}' is not a declared descriptor", name));
            return self;
        };

        for output in outputs {
            let Some(&consumer) = self.by_name.get(*output) else {
                self.errors
                    .push(format!("output '{}' is not a declared descriptor", output));
                continue;
            };
            if consumer == producer {
                self.errors
                    .push(format!("descriptor '{}' is its own output", name));
                continue;
            }
            if self.descs[producer].outputs.contains(&consumer) {
                self.errors
                    .push(format!("duplicate edge '{}' -> '{}'", name, output));
                continue;
            }
            self.descs[producer].outputs.push(consumer);
        }
        self.descs[producer].branch = mode;
        self
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slots in declaration order
    pub fn descs(&self) -> &[PatternDesc] {
        &self.descs
    }

    /// Slot by id
    pub fn desc(&self, id: DescId) -> Option<&PatternDesc> {
        self.descs.get(id)
    }

    /// Slot id by name
    pub fn id_of(&self, name: &str) -> Option<DescId> {
        self.by_name.get(name).copied()
    }

    /// Slot by name
    pub fn desc_by_name(&self, name: &str) -> Option<&PatternDesc> {
        self.id_of(name).and_then(|id| self.desc(id))
    }

    /// Head slots in the order they were set
    pub fn heads(&self) -> &[DescId] {
        &self.heads
    }

    /// True if `id` is a head slot
    pub fn is_head(&self, id: DescId) -> bool {
        self.heads.contains(&id)
    }

    /// Producer slots of `id`, in declaration order
    pub fn inputs_of(&self, id: DescId) -> Vec<DescId> {
        self.descs
            .iter()
            .filter(|d| d.outputs.contains(&id))
            .map(|d| d.id)
            .collect()
    }

    /// Every pattern edge as `(producer, consumer)`
    pub fn edges(&self) -> impl Iterator<Item = (DescId, DescId)> + '_ {
        self.descs
            .iter()
            .flat_map(|d| d.outputs.iter().map(move |&c| (d.id, c)))
    }

    /// Slots reachable from `id` over one pattern edge, either direction
    pub fn neighbours(&self, id: DescId) -> Vec<DescId> {
        let mut out = self.inputs_of(id);
        if let Some(desc) = self.desc(id) {
            for &c in &desc.outputs {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
        }
        out
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// True if the pattern satisfies all its invariants
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check the pattern invariants
    ///
    /// Reports the first builder error, then structural problems: missing
    /// heads, head multiplicity, single-branch fan-out and unreachable slots.
    pub fn validate(&self) -> FusionResult<()> {
        if let Some(reason) = self.errors.first() {
            return Err(FusionError::malformed(&self.name, reason.clone()));
        }
        if self.descs.is_empty() {
            return Err(FusionError::malformed(&self.name, "pattern has no descriptor"));
        }
        if self.heads.is_empty() {
            return Err(FusionError::malformed(&self.name, "pattern has no head"));
        }

        if let Some(&h) = self.heads.iter().find(|&&h| self.descs[h].max > 1) {
            return Err(FusionError::malformed(
                &self.name,
                format!("head '{}' has max count above 1", self.descs[h].name),
            ));
        }
        let head_min = self
            .heads
            .iter()
            .fold(0usize, |acc, &h| acc.saturating_add(self.descs[h].min));
        if head_min < 1 {
            return Err(FusionError::malformed(
                &self.name,
                "sum of head min counts is 0",
            ));
        }

        for desc in &self.descs {
            if desc.branch == BranchMode::Single && desc.outputs.len() > 1 {
                return Err(FusionError::malformed(
                    &self.name,
                    format!(
                        "descriptor '{}' is single-branch with {} outputs",
                        desc.name,
                        desc.outputs.len()
                    ),
                ));
            }
        }

        let mut seen: FxHashSet<DescId> = self.heads.iter().copied().collect();
        let mut stack: Vec<DescId> = self.heads.clone();
        while let Some(id) = stack.pop() {
            for n in self.neighbours(id) {
                if seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        if let Some(desc) = self.descs.iter().find(|d| !seen.contains(&d.id)) {
            return Err(FusionError::malformed(
                &self.name,
                format!("descriptor '{}' is not connected to a head", desc.name),
            ));
        }

        Ok(())
    }
}
