use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    node::{NodeId, PlanStep},
    variable::GroundPointId,
};

/// Outcome class of a search run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    /// A success node was reached.
    Success,
    /// The frontier emptied without success.
    Infeasible,
    /// A time limit or expansion budget stopped the loop first.
    Incomplete,
}

/// Which limit ended an incomplete run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchLimit {
    /// Wall-clock limit elapsed.
    TimeLimit,
    /// Expansion budget spent.
    ExpansionBudget,
}

/// Counters collected while solving.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes in the arena, root included.
    pub nodes_created: usize,
    /// Calls to `expand`.
    pub expansions: usize,
    /// Children spawned.
    pub children: usize,
    /// Children rejected by a global constraint.
    pub failed: usize,
    /// Nodes marked exhausted.
    pub exhausted: usize,
    /// Variables evicted from any node.
    pub dropped_variables: usize,
    /// Commands removed by propagators.
    pub pruned_choices: usize,
    /// Commands removed for non-positive ranked reward.
    pub pruned_non_positive: usize,
    /// Wall-clock time of `solve_it`.
    pub elapsed_ms: u64,
}

/// Result of [`crate::Planit::solve_it`].
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Outcome class.
    pub status: SearchStatus,
    /// Success node, or the best node by plan reward for incomplete runs.
    pub node: Option<NodeId>,
    /// Commitments from the root to `node`.
    pub plan: Vec<PlanStep>,
    /// Plan reward of `node`.
    pub plan_reward: f64,
    /// Distinct ground points observed by the plan.
    pub observed: BTreeSet<GroundPointId>,
    /// Limit that stopped an incomplete run.
    pub limit: Option<SearchLimit>,
    /// Run counters.
    pub stats: SearchStats,
}

impl SearchReport {
    pub(crate) fn new(
        status: SearchStatus,
        node: Option<NodeId>,
        plan: Vec<PlanStep>,
        plan_reward: f64,
        limit: Option<SearchLimit>,
        stats: SearchStats,
    ) -> Self {
        let observed = plan
            .iter()
            .filter_map(|step| step.variable.assignment())
            .flat_map(|assignment| assignment.ground_points.iter().copied())
            .collect();
        Self {
            status,
            node,
            plan,
            plan_reward,
            observed,
            limit,
            stats,
        }
    }

    /// Whether a success node was found.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SearchStatus::Success
    }

    /// Compact JSON used for telemetry payloads.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "status": self.status,
            "node": self.node,
            "plan_len": self.plan.len(),
            "plan_reward": self.plan_reward,
            "observed": self.observed.len(),
            "limit": self.limit,
            "stats": self.stats,
        })
    }
}
