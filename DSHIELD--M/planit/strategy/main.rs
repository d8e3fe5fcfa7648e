//! Pluggable decision points of the search engine.
//!
//! The engine holds each strategy as a trait object; the defaults in [`ordering`]
//! give a generic depth-first or beam search with declared-order value ranking.

/// Default node, variable and value orderings.
pub mod ordering;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::PlanitError,
    node::{Arena, Node, NodeId},
    variable::{GroundPointId, Variable},
};

/// Scalar reward of committing `command` on `variable`.
pub trait RewardModel: Send + Sync {
    /// Evaluates the reward of observing `ground_points` with `command`.
    fn command_reward(
        &self,
        variable: &Variable,
        command: &str,
        ground_points: &[GroundPointId],
    ) -> f64;
}

impl<T: RewardModel + ?Sized> RewardModel for Arc<T> {
    fn command_reward(
        &self,
        variable: &Variable,
        command: &str,
        ground_points: &[GroundPointId],
    ) -> f64 {
        (**self).command_reward(variable, command, ground_points)
    }
}

/// Orders the open frontier; the engine expands the first `node_beam_width` ids.
pub trait NodeRanker: Send + Sync {
    /// Returns `open` in expansion order. Must be a total order.
    fn rank(&self, arena: &Arena, open: &[NodeId]) -> Vec<NodeId>;
}

/// Picks the variable a node branches on.
pub trait VariableSelector: Send + Sync {
    /// Index into `node.unassigned()`, or `None` when nothing is selectable.
    fn select(&self, node: &Node) -> Option<usize>;
}

/// One candidate command with the reward used for pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChoice {
    /// Command label.
    pub command: String,
    /// Ground points the command observes.
    pub ground_points: Vec<GroundPointId>,
    /// Estimated reward; non-positive choices are never branched on.
    pub reward: f64,
}

/// Orders the current choices of a variable.
pub trait ValueRanker: Send + Sync {
    /// Returns the choices of `variable` best first. `seats` is the choice beam
    /// width (`None` = unbounded); rankers may use it to decide how many choices
    /// deserve the front of the list but must still return every candidate.
    fn rank(
        &self,
        node: &Node,
        variable: &Variable,
        seats: Option<usize>,
    ) -> Result<Vec<RankedChoice>, PlanitError>;
}

/// Pruning counts of one propagation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Commands deleted from unassigned variables.
    pub removed_choices: usize,
    /// Variables evicted because their choice set emptied.
    pub removed_variables: usize,
}

impl PropagationReport {
    /// Adds another pass's counts.
    pub fn absorb(&mut self, other: Self) {
        self.removed_choices += other.removed_choices;
        self.removed_variables += other.removed_variables;
    }
}

/// Prunes a child's unassigned variables after its commitment.
pub trait ChoicePropagator: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &str;

    /// Applies the consequences of `committed` to `node`. Implementations must go
    /// through [`Node::variable_mut`] so sibling nodes are never affected.
    fn propagate(&self, node: &mut Node, committed: &Variable)
        -> Result<PropagationReport, PlanitError>;
}

/// Sets `choice_reward` and `plan_reward` on a freshly committed child.
pub trait RewardAccumulator: Send + Sync {
    /// Updates the rewards of `node`, whose parent had `parent_plan_reward`.
    fn accumulate(&self, parent_plan_reward: f64, node: &mut Node);
}

/// Global constraint evaluated on every new child; a violation fails the child.
pub trait Constraint: Send + Sync {
    /// Name reported as the failed node's status message.
    fn name(&self) -> &str;

    /// Whether `node` satisfies the constraint.
    fn check(&self, node: &Node) -> bool;
}

/// Closure-backed [`Constraint`].
pub struct FnConstraint<F> {
    name: String,
    check: F,
}

impl<F> FnConstraint<F>
where
    F: Fn(&Node) -> bool + Send + Sync,
{
    /// Wraps `check` under `name`.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for FnConstraint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConstraint")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Constraint for FnConstraint<F>
where
    F: Fn(&Node) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, node: &Node) -> bool {
        (self.check)(node)
    }
}

/// Goal test applied to each new child that passed its constraints.
pub trait SuccessTest: Send + Sync {
    /// Whether `node` is a solution.
    fn is_success(&self, node: &Node) -> bool;
}

impl<F> SuccessTest for F
where
    F: Fn(&Node) -> bool + Send + Sync,
{
    fn is_success(&self, node: &Node) -> bool {
        self(node)
    }
}
