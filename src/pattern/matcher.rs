//! Subgraph matching engine
//!
//! Binds the slots of a [`BufferFusionPattern`] to real nodes of a
//! [`GraphAccessor`]. Matching is seeded from every node a head slot accepts
//! and then expands slot by slot along the pattern edges:
//!
//! 1. Seed: bind the head slot to the seed node.
//! 2. Expand: pick the next unresolved slot adjacent to a resolved one (see
//!    [`SlotTieBreak`]) and bind every unbound real neighbour it accepts,
//!    truncated to the slot's `max` in discovery order. An optional slot that
//!    bound nothing is looked through to the slots beyond it.
//! 3. Check: every slot within `[min, max]`, single-branch producers have one
//!    consumer, and every bound pattern edge is backed by real edges.
//!
//! A real node binds to at most one slot, so the slot resolved first claims a
//! node two slots could both accept.

use std::collections::VecDeque;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::graph::NodeId;
use crate::traits::GraphAccessor;
use crate::transform::fuse::ATTR_FUSION_SCOPE;

use super::desc::{BranchMode, BufferFusionPattern, DescId, PatternDesc};

/// Order in which unresolved slots are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotTieBreak {
    /// Lowest declaration index among slots adjacent to a resolved slot
    #[default]
    FirstDeclared,
    /// Breadth-first from the head, in pattern edge order
    FirstDiscovered,
}

/// Binding of pattern slots to real nodes
///
/// Only slots with at least one bound node are present; slot order follows
/// declaration order, and each list keeps discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferFusionMapping {
    slots: IndexMap<DescId, Vec<NodeId>>,
}

impl BufferFusionMapping {
    /// Empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `nodes` to a slot, replacing any previous binding
    pub fn bind(&mut self, desc: DescId, nodes: Vec<NodeId>) {
        if nodes.is_empty() {
            self.slots.shift_remove(&desc);
        } else {
            self.slots.insert(desc, nodes);
        }
    }

    /// Nodes bound to a slot
    pub fn nodes(&self, desc: DescId) -> &[NodeId] {
        self.slots.get(&desc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes bound to the slot called `name`
    pub fn nodes_by_name(&self, pattern: &BufferFusionPattern, name: &str) -> &[NodeId] {
        pattern.id_of(name).map(|id| self.nodes(id)).unwrap_or(&[])
    }

    /// Representative (first) node of a slot
    pub fn first(&self, desc: DescId) -> Option<NodeId> {
        self.nodes(desc).first().copied()
    }

    /// Representative node of the slot called `name`
    pub fn first_by_name(&self, pattern: &BufferFusionPattern, name: &str) -> Option<NodeId> {
        self.nodes_by_name(pattern, name).first().copied()
    }

    /// Remove a node from whichever slot holds it
    ///
    /// Returns `true` if the node was bound. A slot left empty disappears.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(desc) = self
            .slots
            .iter()
            .find(|(_, nodes)| nodes.contains(&node))
            .map(|(&d, _)| d)
        else {
            return false;
        };
        if let Some(nodes) = self.slots.get_mut(&desc) {
            nodes.retain(|n| *n != node);
            if nodes.is_empty() {
                self.slots.shift_remove(&desc);
            }
        }
        true
    }

    /// Slot of a bound node
    pub fn slot_of(&self, node: NodeId) -> Option<DescId> {
        self.slots
            .iter()
            .find(|(_, nodes)| nodes.contains(&node))
            .map(|(&d, _)| d)
    }

    /// True if `node` is bound to any slot
    pub fn contains(&self, node: NodeId) -> bool {
        self.slot_of(node).is_some()
    }

    /// Bound slots and their nodes
    pub fn iter(&self) -> impl Iterator<Item = (DescId, &[NodeId])> + '_ {
        self.slots.iter().map(|(&d, n)| (d, n.as_slice()))
    }

    /// Every bound node, slot by slot
    pub fn all_nodes(&self) -> Vec<NodeId> {
        self.slots.values().flatten().copied().collect()
    }

    /// Nodes of every slot tagged with `group_id`
    pub fn nodes_in_group(&self, pattern: &BufferFusionPattern, group_id: i64) -> Vec<NodeId> {
        self.slots
            .iter()
            .filter(|(d, _)| pattern.desc(**d).map(|p| p.group_id == group_id).unwrap_or(false))
            .flat_map(|(_, n)| n.iter().copied())
            .collect()
    }

    /// Nodes to fuse: every bound node except those in sentinel slots
    pub fn fused_node_group(&self, pattern: &BufferFusionPattern) -> Vec<NodeId> {
        self.slots
            .iter()
            .filter(|(d, _)| pattern.desc(**d).map(|p| !p.is_sentinel()).unwrap_or(false))
            .flat_map(|(_, n)| n.iter().copied())
            .collect()
    }

    /// Number of bound slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Order-insensitive key used to drop duplicate matches
    fn canonical_key(&self) -> Vec<(DescId, Vec<NodeId>)> {
        let mut key: Vec<_> = self
            .slots
            .iter()
            .map(|(&d, n)| {
                let mut n = n.clone();
                n.sort_unstable();
                (d, n)
            })
            .collect();
        key.sort_unstable_by_key(|(d, _)| *d);
        key
    }
}

/// In-progress binding of one seed
struct Binding {
    slots: Vec<Vec<NodeId>>,
    resolved: Vec<bool>,
    owner: FxHashMap<NodeId, DescId>,
    head_dynamic: bool,
}

impl Binding {
    fn new(slot_count: usize, head_dynamic: bool) -> Self {
        Self {
            slots: vec![Vec::new(); slot_count],
            resolved: vec![false; slot_count],
            owner: FxHashMap::default(),
            head_dynamic,
        }
    }

    fn bind(&mut self, desc: DescId, nodes: Vec<NodeId>) {
        for &n in &nodes {
            self.owner.insert(n, desc);
        }
        self.slots[desc] = nodes;
        self.resolved[desc] = true;
    }
}

/// Pattern matcher over a host graph
pub struct SubgraphMatcher<'a, G: GraphAccessor + ?Sized> {
    pattern: &'a BufferFusionPattern,
    graph: &'a G,
    tie_break: SlotTieBreak,
    limit: Option<usize>,
}

impl<'a, G: GraphAccessor + ?Sized> SubgraphMatcher<'a, G> {
    /// Create a new matcher
    pub fn new(pattern: &'a BufferFusionPattern, graph: &'a G) -> Self {
        Self {
            pattern,
            graph,
            tie_break: SlotTieBreak::default(),
            limit: None,
        }
    }

    /// Set the slot resolution order
    pub fn with_tie_break(mut self, tie_break: SlotTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Stop after `limit` matches
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Find all distinct matches, seeded in graph order
    ///
    /// A malformed pattern yields no match.
    pub fn find_all(&self) -> Vec<BufferFusionMapping> {
        if let Err(e) = self.pattern.validate() {
            warn!(pattern = self.pattern.name(), error = %e, "skipping malformed pattern");
            return Vec::new();
        }

        let mut results = Vec::new();
        let mut seen = FxHashSet::default();

        for node in self.graph.node_ids() {
            for &head in self.pattern.heads() {
                if self.limit.map(|l| results.len() >= l).unwrap_or(false) {
                    return results;
                }
                if let Some(mapping) = self.expand(node, head) {
                    if seen.insert(mapping.canonical_key()) {
                        results.push(mapping);
                    }
                }
            }
        }

        debug!(
            pattern = self.pattern.name(),
            matches = results.len(),
            "pattern matching finished"
        );
        results
    }

    /// First match in graph order
    pub fn find_first(&self) -> Option<BufferFusionMapping> {
        SubgraphMatcher {
            limit: Some(1),
            ..*self
        }
        .find_all()
        .into_iter()
        .next()
    }

    /// Try to match with `head` bound to `node`
    pub fn match_from(&self, node: NodeId, head: DescId) -> Option<BufferFusionMapping> {
        if let Err(e) = self.pattern.validate() {
            warn!(pattern = self.pattern.name(), error = %e, "skipping malformed pattern");
            return None;
        }
        if !self.pattern.is_head(head) {
            return None;
        }
        self.expand(node, head)
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    fn expand(&self, seed: NodeId, head: DescId) -> Option<BufferFusionMapping> {
        let head_desc = self.pattern.desc(head)?;
        let head_dynamic = self.graph.is_dynamic_shape(seed);
        let mut binding = Binding::new(self.pattern.descs().len(), head_dynamic);

        if !self.accepts(head_desc, seed, &binding) {
            return None;
        }
        binding.bind(head, vec![seed]);
        trace!(pattern = self.pattern.name(), node = %seed, "seeded head");

        match self.tie_break {
            SlotTieBreak::FirstDeclared => {
                while let Some(next) = self.next_declared(&binding) {
                    self.resolve(next, &mut binding);
                }
            }
            SlotTieBreak::FirstDiscovered => {
                let mut queue = VecDeque::from([head]);
                while let Some(current) = queue.pop_front() {
                    for n in self.pattern.neighbours(current) {
                        if !binding.resolved[n] {
                            self.resolve(n, &mut binding);
                            queue.push_back(n);
                        }
                    }
                }
            }
        }

        if !self.check(&binding) {
            return None;
        }

        let mut mapping = BufferFusionMapping::new();
        for (id, nodes) in binding.slots.into_iter().enumerate() {
            mapping.bind(id, nodes);
        }
        debug!(
            pattern = self.pattern.name(),
            head = %seed,
            nodes = mapping.all_nodes().len(),
            "pattern matched"
        );
        Some(mapping)
    }

    /// Lowest unresolved slot adjacent to a resolved one
    fn next_declared(&self, binding: &Binding) -> Option<DescId> {
        (0..binding.resolved.len()).find(|&id| {
            !binding.resolved[id]
                && self
                    .pattern
                    .neighbours(id)
                    .iter()
                    .any(|&n| binding.resolved[n])
        })
    }

    /// Bind every acceptable real neighbour of the resolved adjacent slots
    fn resolve(&self, id: DescId, binding: &mut Binding) {
        let Some(desc) = self.pattern.desc(id) else {
            return;
        };

        let mut candidates: Vec<NodeId> = Vec::new();
        for producer in self.bound_across_empty(id, binding, |d| self.pattern.inputs_of(d)) {
            for &n in &binding.slots[producer] {
                candidates.extend(self.graph.out_data_nodes(n));
            }
        }
        for consumer in self.bound_across_empty(id, binding, |d| self.consumer_slots(d)) {
            for &n in &binding.slots[consumer] {
                candidates.extend(self.graph.in_data_nodes(n));
            }
        }

        let mut seen = FxHashSet::default();
        let bound: Vec<NodeId> = candidates
            .into_iter()
            .filter(|n| seen.insert(*n))
            .filter(|&n| self.accepts(desc, n, binding))
            .take(desc.max)
            .collect();

        trace!(
            pattern = self.pattern.name(),
            slot = desc.name.as_str(),
            bound = bound.len(),
            "resolved slot"
        );
        binding.bind(id, bound);
    }

    fn consumer_slots(&self, id: DescId) -> Vec<DescId> {
        self.pattern
            .desc(id)
            .map(|d| d.outputs.clone())
            .unwrap_or_default()
    }

    /// Non-empty resolved slots one step from `id` along `step`
    ///
    /// A resolved slot that bound nothing is walked through, so an absent
    /// optional slot does not cut its neighbours off from each other.
    fn bound_across_empty(
        &self,
        id: DescId,
        binding: &Binding,
        step: impl Fn(DescId) -> Vec<DescId>,
    ) -> Vec<DescId> {
        let mut found = Vec::new();
        let mut visited = FxHashSet::default();
        visited.insert(id);
        let mut stack = step(id);
        while let Some(slot) = stack.pop() {
            if !binding.resolved[slot] || !visited.insert(slot) {
                continue;
            }
            if binding.slots[slot].is_empty() {
                stack.extend(step(slot));
            } else if !found.contains(&slot) {
                found.push(slot);
            }
        }
        found
    }

    /// Per-candidate constraints
    fn accepts(&self, desc: &PatternDesc, node: NodeId, binding: &Binding) -> bool {
        if binding.owner.contains_key(&node) {
            return false;
        }
        let (Some(category), Some(op_type)) =
            (self.graph.op_category(node), self.graph.op_type(node))
        else {
            return false;
        };
        if !desc.types.accepts(category, op_type) {
            return false;
        }
        if desc.is_sentinel() {
            return true;
        }
        if self.graph.attr(node, ATTR_FUSION_SCOPE).is_some() {
            trace!(slot = desc.name.as_str(), node = %node, "node already fused");
            return false;
        }
        if !desc
            .shape_rule
            .admits(self.graph.is_dynamic_shape(node), binding.head_dynamic)
        {
            trace!(slot = desc.name.as_str(), node = %node, "shape type mismatch");
            return false;
        }
        true
    }

    /// Whole-binding constraints
    fn check(&self, binding: &Binding) -> bool {
        for desc in self.pattern.descs() {
            let count = binding.slots[desc.id].len();
            if count < desc.min || count > desc.max {
                trace!(
                    pattern = self.pattern.name(),
                    slot = desc.name.as_str(),
                    count,
                    "multiplicity out of range"
                );
                return false;
            }
            if desc.branch == BranchMode::Single
                && binding.slots[desc.id]
                    .iter()
                    .any(|&n| self.graph.data_consumer_count(n) != 1)
            {
                trace!(
                    pattern = self.pattern.name(),
                    slot = desc.name.as_str(),
                    "single-branch producer has extra consumers"
                );
                return false;
            }
        }

        // Slots joined through absent optional slots are checked like edges
        let mut edges: Vec<(DescId, DescId)> = self.pattern.edges().collect();
        for desc in self.pattern.descs() {
            if binding.slots[desc.id].is_empty() {
                continue;
            }
            for c in self.bound_across_empty(desc.id, binding, |d| self.consumer_slots(d)) {
                if !edges.contains(&(desc.id, c)) {
                    edges.push((desc.id, c));
                }
            }
        }

        for (p, c) in edges {
            let producers = &binding.slots[p];
            let consumers = &binding.slots[c];
            if producers.is_empty() || consumers.is_empty() {
                continue;
            }
            let fed = consumers.iter().all(|&n| {
                self.graph
                    .in_data_nodes(n)
                    .iter()
                    .any(|src| producers.contains(src))
            });
            let feeds = producers.iter().all(|&n| {
                self.graph
                    .out_data_nodes(n)
                    .iter()
                    .any(|dst| consumers.contains(dst))
            });
            if !fed || !feeds {
                trace!(pattern = self.pattern.name(), "pattern edge not backed by graph");
                return false;
            }
        }

        true
    }
}

impl<'a, G: GraphAccessor + ?Sized> Clone for SubgraphMatcher<'a, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, G: GraphAccessor + ?Sized> Copy for SubgraphMatcher<'a, G> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttrValue, ComputeGraph, OpSpec};
    use crate::pattern::desc::{REPEAT_MAX, REPEAT_NONE};
    use crate::pattern::ops::OpCategory;
    use crate::tensor::TensorDesc;

    fn d() -> TensorDesc {
        TensorDesc::nd(&[1, 16, 8, 8])
    }

    /// data -> conv -> relu -> out
    fn make_conv_relu_graph() -> (ComputeGraph, NodeId, NodeId) {
        let mut g = ComputeGraph::new("conv_relu");
        let x = g.add(OpSpec::new("x", "Data").output(d()));
        let conv = g.add(OpSpec::new("conv", "Conv2D").inputs(2, &d()).output(d()));
        let relu = g.add(OpSpec::new("relu", "Relu").input(d()).output(d()));
        let out = g.add(OpSpec::new("out", "NetOutput").input(d()));
        g.connect(x, 0, conv, 0).unwrap();
        g.connect(conv, 0, relu, 0).unwrap();
        g.connect(relu, 0, out, 0).unwrap();
        (g, conv, relu)
    }

    fn make_conv_relu_pattern() -> BufferFusionPattern {
        BufferFusionPattern::new("ConvRelu")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("relu", OpCategory::ElemWise, 1, 1)
            .set_head(&["conv"])
            .set_outputs("conv", &["relu"], BranchMode::Single)
    }

    #[test]
    fn test_simple_match() {
        let (g, conv, relu) = make_conv_relu_graph();
        let p = make_conv_relu_pattern();
        let matches = SubgraphMatcher::new(&p, &g).find_all();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].nodes_by_name(&p, "conv"), &[conv]);
        assert_eq!(matches[0].nodes_by_name(&p, "relu"), &[relu]);
        assert_eq!(matches[0].fused_node_group(&p), vec![conv, relu]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let (g, _, _) = make_conv_relu_graph();
        let p = BufferFusionPattern::new("MatmulOnly")
            .add_op_desc("mm", OpCategory::MatMul, 1, 1)
            .set_head(&["mm"]);
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        let (g, _, _) = make_conv_relu_graph();
        let p = BufferFusionPattern::new("Bad")
            .add_op_desc("conv", OpCategory::Convolution, 1, 2)
            .set_head(&["conv"]);
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());
        assert!(SubgraphMatcher::new(&p, &g).match_from(NodeId(1), 0).is_none());
    }

    #[test]
    fn test_single_branch_rejects_fanout() {
        let (mut g, conv, _) = make_conv_relu_graph();
        let extra = g.add(OpSpec::new("extra", "Sigmoid").input(d()).output(d()));
        g.connect(conv, 0, extra, 0).unwrap();

        let p = make_conv_relu_pattern();
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());
    }

    #[test]
    fn test_optional_slot_and_multiplicity() {
        let (mut g, conv, relu) = make_conv_relu_graph();
        let sig = g.add(OpSpec::new("sig", "Sigmoid").input(d()).output(d()));
        g.connect(conv, 0, sig, 0).unwrap();

        let p = BufferFusionPattern::new("ConvElem")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("elem", OpCategory::ElemWise, REPEAT_NONE, REPEAT_MAX)
            .add_op_desc("pool", OpCategory::Pool, REPEAT_NONE, 1)
            .set_head(&["conv"])
            .set_outputs("conv", &["elem"], BranchMode::Default)
            .set_outputs("elem", &["pool"], BranchMode::Default);
        let m = SubgraphMatcher::new(&p, &g).find_first().unwrap();
        assert_eq!(m.nodes_by_name(&p, "elem"), &[relu, sig]);
        assert!(m.nodes_by_name(&p, "pool").is_empty());
        assert_eq!(m.len(), 2);
    }

    fn make_conv_elem_quant_pattern() -> BufferFusionPattern {
        BufferFusionPattern::new("ConvElemQuant")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("elem", OpCategory::ElemWise, REPEAT_NONE, 1)
            .add_op_desc("quant", OpCategory::Quant, 1, 1)
            .set_head(&["conv"])
            .set_outputs("conv", &["elem"], BranchMode::Default)
            .set_outputs("elem", &["quant"], BranchMode::Default)
    }

    #[test]
    fn test_absent_optional_slot_is_looked_through() {
        let mut g = ComputeGraph::new("conv_quant");
        let conv = g.add(OpSpec::new("conv", "Conv2D").input(d()).output(d()));
        let quant = g.add(OpSpec::new("quant", "AscendQuant").input(d()).output(d()));
        g.connect(conv, 0, quant, 0).unwrap();

        let p = make_conv_elem_quant_pattern();
        for tie_break in [SlotTieBreak::FirstDeclared, SlotTieBreak::FirstDiscovered] {
            let matches = SubgraphMatcher::new(&p, &g).with_tie_break(tie_break).find_all();
            assert_eq!(matches.len(), 1, "{:?}", tie_break);
            assert!(matches[0].nodes_by_name(&p, "elem").is_empty());
            assert_eq!(matches[0].nodes_by_name(&p, "quant"), &[quant]);
            assert_eq!(matches[0].fused_node_group(&p), vec![conv, quant]);
        }
    }

    #[test]
    fn test_present_optional_slot_is_bound() {
        let (mut g, conv, relu) = make_conv_relu_graph();
        let quant = g.add(OpSpec::new("quant", "AscendQuant").input(d()).output(d()));
        g.connect(relu, 0, quant, 0).unwrap();

        let p = make_conv_elem_quant_pattern();
        let m = SubgraphMatcher::new(&p, &g).find_first().unwrap();
        assert_eq!(m.nodes_by_name(&p, "elem"), &[relu]);
        assert_eq!(m.fused_node_group(&p), vec![conv, relu, quant]);
    }

    #[test]
    fn test_looked_through_slot_needs_real_edge() {
        // conv -> pool -> quant: pool fits no slot, so quant is out of reach
        let mut g = ComputeGraph::new("conv_pool_quant");
        let conv = g.add(OpSpec::new("conv", "Conv2D").input(d()).output(d()));
        let pool = g.add(OpSpec::new("pool", "MaxPool").input(d()).output(d()));
        let quant = g.add(OpSpec::new("quant", "AscendQuant").input(d()).output(d()));
        g.connect(conv, 0, pool, 0).unwrap();
        g.connect(pool, 0, quant, 0).unwrap();

        let p = make_conv_elem_quant_pattern();
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());
    }

    #[test]
    fn test_max_truncates_in_discovery_order() {
        let (mut g, conv, relu) = make_conv_relu_graph();
        let sig = g.add(OpSpec::new("sig", "Sigmoid").input(d()).output(d()));
        g.connect(conv, 0, sig, 0).unwrap();

        let p = BufferFusionPattern::new("ConvElem")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("elem", OpCategory::ElemWise, 1, 1)
            .set_head(&["conv"])
            .set_outputs("conv", &["elem"], BranchMode::Default);
        let m = SubgraphMatcher::new(&p, &g).find_first().unwrap();
        // conv feeds both relu and sig, but only relu is bound
        assert_eq!(m.nodes_by_name(&p, "elem"), &[relu]);
        assert!(!m.contains(sig));
    }

    #[test]
    fn test_fused_nodes_are_skipped() {
        let (mut g, _, relu) = make_conv_relu_graph();
        g.set_attr(relu, ATTR_FUSION_SCOPE, AttrValue::Int(3)).unwrap();
        let p = make_conv_relu_pattern();
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());
    }

    #[test]
    fn test_shape_type_must_match_head() {
        let mut g = ComputeGraph::new("dyn");
        let dyn_desc = TensorDesc::nd(&[-1, 16]);
        let conv = g.add(OpSpec::new("conv", "Conv2D").input(d()).output(d()));
        let relu = g.add(OpSpec::new("relu", "Relu").input(dyn_desc.clone()).output(dyn_desc));
        g.connect(conv, 0, relu, 0).unwrap();

        let p = make_conv_relu_pattern();
        assert!(SubgraphMatcher::new(&p, &g).find_all().is_empty());

        let relaxed = BufferFusionPattern::new("ConvReluAnyShape")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc_with(
                "relu",
                OpCategory::ElemWise,
                1,
                1,
                -1,
                crate::pattern::desc::ShapeTypeRule::Ignore,
            )
            .set_head(&["conv"])
            .set_outputs("conv", &["relu"], BranchMode::Single);
        assert_eq!(SubgraphMatcher::new(&relaxed, &g).find_all().len(), 1);
    }

    #[test]
    fn test_duplicate_seeds_deduplicated() {
        let (g, conv, relu) = make_conv_relu_graph();
        // Two heads reach the same binding from different seeds
        let p = BufferFusionPattern::new("TwoHeads")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("relu", OpCategory::ElemWise, 0, 1)
            .set_head(&["conv", "relu"])
            .set_outputs("conv", &["relu"], BranchMode::Default);
        let matches = SubgraphMatcher::new(&p, &g).find_all();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].all_nodes(), vec![conv, relu]);
    }

    #[test]
    fn test_limit() {
        let mut g = ComputeGraph::new("many");
        for i in 0..4 {
            g.add(OpSpec::new(&format!("relu{}", i), "Relu").output(d()));
        }
        let p = BufferFusionPattern::new("Relu")
            .add_op_desc("relu", OpCategory::ElemWise, 1, 1)
            .set_head(&["relu"]);
        assert_eq!(SubgraphMatcher::new(&p, &g).find_all().len(), 4);
        assert_eq!(
            SubgraphMatcher::new(&p, &g).with_limit(Some(2)).find_all().len(),
            2
        );
    }

    /// head -> r, with the head's outputs declared as [B, A] and A declared
    /// first; both slots accept r
    fn make_tie_break_case() -> (ComputeGraph, BufferFusionPattern, NodeId) {
        let (g, _, relu) = make_conv_relu_graph();
        let p = BufferFusionPattern::new("Ambiguous")
            .add_op_desc("conv", OpCategory::Convolution, 1, 1)
            .add_op_desc("a", OpCategory::ElemWise, REPEAT_NONE, 1)
            .add_op_desc("b", OpCategory::ElemWise, REPEAT_NONE, 1)
            .set_head(&["conv"])
            .set_outputs("conv", &["b", "a"], BranchMode::Multi);
        (g, p, relu)
    }

    #[test]
    fn test_tie_break_first_declared() {
        let (g, p, relu) = make_tie_break_case();
        let m = SubgraphMatcher::new(&p, &g)
            .with_tie_break(SlotTieBreak::FirstDeclared)
            .find_first()
            .unwrap();
        assert_eq!(m.nodes_by_name(&p, "a"), &[relu]);
        assert!(m.nodes_by_name(&p, "b").is_empty());
    }

    #[test]
    fn test_tie_break_first_discovered() {
        let (g, p, relu) = make_tie_break_case();
        let m = SubgraphMatcher::new(&p, &g)
            .with_tie_break(SlotTieBreak::FirstDiscovered)
            .find_first()
            .unwrap();
        assert_eq!(m.nodes_by_name(&p, "b"), &[relu]);
        assert!(m.nodes_by_name(&p, "a").is_empty());
    }

    #[test]
    fn test_mapping_remove_node() {
        let (g, conv, relu) = make_conv_relu_graph();
        let p = make_conv_relu_pattern();
        let mut m = SubgraphMatcher::new(&p, &g).find_first().unwrap();
        assert!(m.remove_node(relu));
        assert!(!m.remove_node(relu));
        assert_eq!(m.all_nodes(), vec![conv]);
        assert_eq!(m.slot_of(conv), Some(0));
        assert_eq!(m.first_by_name(&p, "relu"), None);
    }

    #[test]
    fn test_nodes_in_group() {
        let (g, conv, relu) = make_conv_relu_graph();
        let p = BufferFusionPattern::new("Grouped")
            .add_op_desc_with(
                "conv",
                OpCategory::Convolution,
                1,
                1,
                0,
                crate::pattern::desc::ShapeTypeRule::MatchHead,
            )
            .add_op_desc_with(
                "relu",
                OpCategory::ElemWise,
                1,
                1,
                1,
                crate::pattern::desc::ShapeTypeRule::MatchHead,
            )
            .set_head(&["conv"])
            .set_outputs("conv", &["relu"], BranchMode::Single);
        let m = SubgraphMatcher::new(&p, &g).find_first().unwrap();
        assert_eq!(m.nodes_in_group(&p, 0), vec![conv]);
        assert_eq!(m.nodes_in_group(&p, 1), vec![relu]);
    }
}
