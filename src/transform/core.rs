//! Core fusion loop
//!
//! Runs fusion passes over a host graph: every pattern of a pass is
//! validated and matched, each mapping is handed to the pass, and the
//! pass's [`Decision`] is committed.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FusionError, FusionResult};
use crate::graph::NodeId;
use crate::passes::{Decision, FusionPass, PassRegistry};
use crate::pattern::{BufferFusionMapping, BufferFusionPattern, SlotTieBreak, SubgraphMatcher};
use crate::traits::GraphAccessor;

use super::fuse::{check_fusible, commit_fusion, CommittedGroup, ATTR_FUSION_SCOPE};

/// Fusion engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Order in which the matcher resolves slots
    pub tie_break: SlotTieBreak,
    /// Upper bound on mappings per pattern
    pub max_matches_per_pattern: Option<usize>,
    /// Stop a pattern after its first applied mapping
    pub first_match_only: bool,
    /// Whether to continue on rewrite failures
    pub continue_on_error: bool,
    /// Whether to stamp fused split info
    pub enable_split_info: bool,
    /// Whether to reject groups whose fusion would create a cycle
    pub check_cycles: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            tie_break: SlotTieBreak::default(),
            max_matches_per_pattern: None,
            first_match_only: false,
            continue_on_error: false,
            enable_split_info: true,
            check_cycles: true,
        }
    }
}

impl FusionConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> FusionResult<Self> {
        serde_json::from_str(json).map_err(|e| FusionError::Config(e.to_string()))
    }

    /// Set the slot tie-break policy
    pub fn with_tie_break(mut self, tie_break: SlotTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Bound the number of mappings per pattern
    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches_per_pattern = Some(max);
        self
    }

    /// Stop each pattern after its first applied mapping
    pub fn with_first_match_only(mut self, first_only: bool) -> Self {
        self.first_match_only = first_only;
        self
    }

    /// Keep going after a rewrite failure
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Enable or disable split info
    pub fn with_split_info(mut self, enable: bool) -> Self {
        self.enable_split_info = enable;
        self
    }

    /// Enable or disable the cycle check on commit
    pub fn with_cycle_check(mut self, check: bool) -> Self {
        self.check_cycles = check;
        self
    }
}

/// Statistics from a pass run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    /// Number of mappings found
    pub patterns_matched: usize,
    /// Number of groups fused
    pub fusions_committed: usize,
    /// Number of graph rewrites applied
    pub rewrites_applied: usize,
    /// Number of mappings the pass declined or the commit rejected
    pub not_applicable: usize,
    /// Number of patterns rejected by validation
    pub malformed_patterns: usize,
    /// Number of errors recovered from
    pub errors: usize,
}

impl PassStats {
    /// Merge another stats into this one
    pub fn merge(&mut self, other: &PassStats) {
        self.patterns_matched += other.patterns_matched;
        self.fusions_committed += other.fusions_committed;
        self.rewrites_applied += other.rewrites_applied;
        self.not_applicable += other.not_applicable;
        self.malformed_patterns += other.malformed_patterns;
        self.errors += other.errors;
    }

    /// True if the pass changed the graph
    pub fn changed(&self) -> bool {
        self.fusions_committed > 0 || self.rewrites_applied > 0
    }
}

/// State of one pass invocation
///
/// Created fresh for every run; passes never keep state between runs.
#[derive(Debug, Clone)]
pub struct FusionContext {
    pass_name: String,
    next_scope: i64,
    fused: FxHashSet<NodeId>,
    stats: PassStats,
}

impl FusionContext {
    /// Context for `pass_name`, allocating scope ids above every scope
    /// already in the graph
    pub fn new<G: GraphAccessor + ?Sized>(graph: &G, pass_name: &str) -> Self {
        let next_scope = graph
            .node_ids()
            .into_iter()
            .filter_map(|n| graph.attr_int(n, ATTR_FUSION_SCOPE))
            .max()
            .map_or(0, |s| s + 1);
        Self {
            pass_name: pass_name.to_string(),
            next_scope,
            fused: FxHashSet::default(),
            stats: PassStats::default(),
        }
    }

    /// Name of the running pass
    pub fn pass_name(&self) -> &str {
        &self.pass_name
    }

    /// True if `node` was fused during this run
    pub fn is_fused(&self, node: NodeId) -> bool {
        self.fused.contains(&node)
    }

    /// Statistics so far
    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    fn allocate_scope(&mut self) -> i64 {
        let scope = self.next_scope;
        self.next_scope += 1;
        scope
    }

    /// A mapping is stale once one of its nodes was removed or one of its
    /// member nodes was fused
    ///
    /// Sentinel slots may bind fused nodes, so only the fused node group is
    /// checked against this run's fusions.
    fn is_stale<G: GraphAccessor + ?Sized>(
        &self,
        graph: &G,
        pattern: &BufferFusionPattern,
        mapping: &BufferFusionMapping,
    ) -> bool {
        mapping.all_nodes().into_iter().any(|n| !graph.contains(n))
            || mapping
                .fused_node_group(pattern)
                .into_iter()
                .any(|n| self.is_fused(n))
    }
}

/// Main fusion engine
///
/// # Example
///
/// ```ignore
/// let engine = FusionEngine::new().with_config(FusionConfig::default().with_cycle_check(true));
/// let stats = engine.run_pass(&mut graph, &ConvElemwiseFusion::new())?;
/// assert!(stats.changed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the engine
    pub fn with_config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    // ========================================================================
    // Running passes
    // ========================================================================

    /// Run one pass over the graph
    ///
    /// # Returns
    /// * Statistics of the run
    /// * `Err` on a rewrite failure, unless `continue_on_error` is set
    pub fn run_pass(
        &self,
        graph: &mut dyn GraphAccessor,
        pass: &dyn FusionPass,
    ) -> FusionResult<PassStats> {
        let mut ctx = FusionContext::new(&*graph, pass.name());

        for pattern in pass.define_patterns() {
            if let Err(e) = pattern.validate() {
                warn!(pass = pass.name(), error = %e, "skipping malformed pattern");
                ctx.stats.malformed_patterns += 1;
                continue;
            }
            self.apply_pattern(graph, pass, &pattern, &mut ctx)?;
        }

        debug!(
            pass = pass.name(),
            matched = ctx.stats.patterns_matched,
            fused = ctx.stats.fusions_committed,
            rewritten = ctx.stats.rewrites_applied,
            "pass finished"
        );
        Ok(ctx.stats)
    }

    /// Run every pass of the registry in order
    pub fn run_passes(
        &self,
        graph: &mut dyn GraphAccessor,
        registry: &PassRegistry,
    ) -> FusionResult<PassStats> {
        let mut total = PassStats::default();
        for pass in registry.iter() {
            let stats = self.run_pass(graph, pass)?;
            total.merge(&stats);
        }
        info!(
            passes = registry.len(),
            fused = total.fusions_committed,
            rewritten = total.rewrites_applied,
            "fusion passes finished"
        );
        Ok(total)
    }

    // ========================================================================
    // Per pattern
    // ========================================================================

    fn apply_pattern(
        &self,
        graph: &mut dyn GraphAccessor,
        pass: &dyn FusionPass,
        pattern: &BufferFusionPattern,
        ctx: &mut FusionContext,
    ) -> FusionResult<()> {
        // Collect mappings first; they hold node ids only
        let mappings = SubgraphMatcher::new(pattern, &*graph)
            .with_tie_break(self.config.tie_break)
            .with_limit(self.config.max_matches_per_pattern)
            .find_all();
        ctx.stats.patterns_matched += mappings.len();

        for mapping in mappings {
            if ctx.is_stale(&*graph, pattern, &mapping) {
                debug!(pattern = pattern.name(), "skipping stale mapping");
                continue;
            }

            let applied = match pass.fusion(graph, pattern, &mapping, ctx) {
                Ok(decision) => self.apply_decision(graph, pass, decision, ctx)?,
                Err(e) => {
                    self.recover(pass, e, ctx)?;
                    false
                }
            };

            if applied && self.config.first_match_only {
                break;
            }
        }
        Ok(())
    }

    fn apply_decision(
        &self,
        graph: &mut dyn GraphAccessor,
        pass: &dyn FusionPass,
        decision: Decision,
        ctx: &mut FusionContext,
    ) -> FusionResult<bool> {
        match decision {
            Decision::NotApplicable => {
                ctx.stats.not_applicable += 1;
                Ok(false)
            }
            Decision::Rewritten => {
                ctx.stats.rewrites_applied += 1;
                Ok(true)
            }
            Decision::Fuse(group) => match self.commit(graph, pass, &group, ctx) {
                Ok(Some(_)) => Ok(true),
                Ok(None) => Ok(false),
                Err(e) => {
                    self.recover(pass, e, ctx)?;
                    Ok(false)
                }
            },
        }
    }

    /// Commit `group` as one fusion scope and stamp its split info
    ///
    /// # Returns
    /// * `Some(group)` once committed
    /// * `None` if the group is not fusible; the graph is untouched
    pub fn commit(
        &self,
        graph: &mut dyn GraphAccessor,
        pass: &dyn FusionPass,
        group: &[NodeId],
        ctx: &mut FusionContext,
    ) -> FusionResult<Option<CommittedGroup>> {
        if let Some(reason) = check_fusible(&*graph, group, self.config.check_cycles) {
            debug!(pass = pass.name(), reason = reason.as_str(), "group not fusible");
            ctx.stats.not_applicable += 1;
            return Ok(None);
        }

        let scope = ctx.allocate_scope();
        let committed = commit_fusion(graph, group, scope, pass.name(), self.config.check_cycles)?;
        ctx.fused.extend(group.iter().copied());
        ctx.stats.fusions_committed += 1;

        if self.config.enable_split_info {
            if let Err(e) = pass.set_split_info(graph, group) {
                if e.is_rewrite_failure() {
                    return Err(e);
                }
                debug!(pass = pass.name(), error = %e, "split info degraded");
            }
        }
        Ok(Some(committed))
    }

    /// Count a failure; rewrite failures abort unless `continue_on_error`
    fn recover(&self, pass: &dyn FusionPass, e: FusionError, ctx: &mut FusionContext) -> FusionResult<()> {
        if e.is_rewrite_failure() && !self.config.continue_on_error {
            return Err(e);
        }
        warn!(pass = pass.name(), error = %e, "fusion failed, continuing");
        ctx.stats.errors += 1;
        Ok(())
    }
}
