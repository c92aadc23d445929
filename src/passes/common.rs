//! Common pass interface
//!
//! Shared trait, decision type and helpers used across the fusion passes.

use crate::error::FusionResult;
use crate::graph::{InPort, NodeId};
use crate::pattern::{BufferFusionMapping, BufferFusionPattern};
use crate::split::propagate_for_group;
use crate::traits::GraphAccessor;
use crate::transform::FusionContext;

/// What a pass decided for one mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the mapping alone
    NotApplicable,
    /// Fuse these nodes into one scope, anchor first
    Fuse(Vec<NodeId>),
    /// The pass rewrote the graph itself
    Rewritten,
}

/// Trait for fusion passes
///
/// A pass only declares patterns and decides; the engine matches, commits
/// and stamps split info. Passes keep no state between invocations.
pub trait FusionPass {
    /// Name of the pass, stamped on fused nodes
    fn name(&self) -> &str;

    /// Patterns to match, tried in order
    fn define_patterns(&self) -> Vec<BufferFusionPattern>;

    /// Nodes to fuse for a mapping, anchor first
    fn get_fusion_nodes(
        &self,
        _graph: &dyn GraphAccessor,
        pattern: &BufferFusionPattern,
        mapping: &BufferFusionMapping,
    ) -> FusionResult<Vec<NodeId>> {
        Ok(mapping.fused_node_group(pattern))
    }

    /// Stamp fused split info on a committed group
    fn set_split_info(&self, graph: &mut dyn GraphAccessor, group: &[NodeId]) -> FusionResult<()> {
        propagate_for_group(graph, group).map(|_| ())
    }

    /// Decide what to do with a mapping
    fn fusion(
        &self,
        graph: &mut dyn GraphAccessor,
        pattern: &BufferFusionPattern,
        mapping: &BufferFusionMapping,
        _ctx: &FusionContext,
    ) -> FusionResult<Decision> {
        let group = self.get_fusion_nodes(&*graph, pattern, mapping)?;
        if group.is_empty() {
            return Ok(Decision::NotApplicable);
        }
        Ok(Decision::Fuse(group))
    }
}

/// Inputs of `node` not fed by a member of `group`
pub fn external_inputs<G: GraphAccessor + ?Sized>(
    graph: &G,
    node: NodeId,
    group: &[NodeId],
) -> Vec<usize> {
    (0..graph.input_count(node))
        .filter(|&i| {
            graph
                .in_data_peer(InPort::new(node, i))
                .map_or(true, |src| !group.contains(&src.node))
        })
        .collect()
}

/// Ordered list of passes
#[derive(Default)]
pub struct PassRegistry {
    passes: Vec<Box<dyn FusionPass>>,
}

impl PassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass
    pub fn with_pass<P: FusionPass + 'static>(mut self, pass: P) -> Self {
        self.register(Box::new(pass));
        self
    }

    /// Append a boxed pass
    pub fn register(&mut self, pass: Box<dyn FusionPass>) {
        self.passes.push(pass);
    }

    /// Passes in run order
    pub fn iter(&self) -> impl Iterator<Item = &dyn FusionPass> + '_ {
        self.passes.iter().map(|p| p.as_ref())
    }

    /// Pass by name
    pub fn get(&self, name: &str) -> Option<&dyn FusionPass> {
        self.iter().find(|p| p.name() == name)
    }

    /// Pass names in run order
    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl std::fmt::Debug for PassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRegistry")
            .field("passes", &self.names())
            .finish()
    }
}
