//! Partial-plan snapshots and the arena that owns them.

/// Append-only node storage and the open frontier.
pub mod arena;

pub use arena::Arena;

use std::{fmt, ops::Range, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::variable::{SatelliteId, Tick, Variable};

/// Arena key; assigned monotonically, never reused.
pub type NodeId = u64;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Eligible for expansion.
    Open,
    /// Cannot expand further along this path; not an error.
    Exhausted,
    /// Goal reached.
    Success,
    /// A global constraint rejected the node.
    Failed,
}

impl NodeStatus {
    /// Success and failed nodes never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Exhausted => "exhausted",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One commitment on the path from the root: the parent it branched from and the
/// variable decided by the child.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// Node the commitment branched from.
    pub parent: NodeId,
    /// Node created by the commitment.
    pub node: NodeId,
    /// The committed variable.
    pub variable: Arc<Variable>,
}

/// Partial-plan snapshot.
///
/// `unassigned` holds shared handles: a child starts with the same `Arc`s as its
/// parent and only clones a variable when it mutates it (see [`Node::variable_mut`]),
/// so a mutation is never visible to more than one node.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    status: NodeStatus,
    status_message: Option<String>,
    committed: Option<Arc<Variable>>,
    unassigned: Vec<Arc<Variable>>,
    choice_reward: f64,
    plan_reward: f64,
    plan_trace: Vec<PlanStep>,
    depth: usize,
}

impl Node {
    pub(crate) fn root(id: NodeId, mut variables: Vec<Variable>) -> Self {
        variables.sort_by_key(Variable::order_key);
        Self {
            id,
            parent: None,
            children: Vec::new(),
            status: NodeStatus::Open,
            status_message: None,
            committed: None,
            unassigned: variables.into_iter().map(Arc::new).collect(),
            choice_reward: 0.0,
            plan_reward: 0.0,
            plan_trace: Vec::new(),
            depth: 0,
        }
    }

    /// Structural copy used at branch time; the commitment is applied afterwards.
    pub(crate) fn branch(&self, id: NodeId, keep_trace: bool) -> Self {
        Self {
            id,
            parent: Some(self.id),
            children: Vec::new(),
            status: NodeStatus::Open,
            status_message: None,
            committed: None,
            unassigned: self.unassigned.clone(),
            choice_reward: 0.0,
            plan_reward: self.plan_reward,
            plan_trace: if keep_trace {
                self.plan_trace.clone()
            } else {
                Vec::new()
            },
            depth: self.depth + 1,
        }
    }

    /// Arena key.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Parent key; `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in creation order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> NodeStatus {
        self.status
    }

    /// Reason attached to the last status change, if any.
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Variable decided when this node was created.
    #[must_use]
    pub const fn committed(&self) -> Option<&Arc<Variable>> {
        self.committed.as_ref()
    }

    /// Remaining variables, sorted by tick then satellite.
    #[must_use]
    pub fn unassigned(&self) -> &[Arc<Variable>] {
        &self.unassigned
    }

    /// Reward of this node's own commitment.
    #[must_use]
    pub const fn choice_reward(&self) -> f64 {
        self.choice_reward
    }

    /// Cumulative reward from the root.
    #[must_use]
    pub const fn plan_reward(&self) -> f64 {
        self.plan_reward
    }

    /// Commitments from the root, when traces are stored.
    #[must_use]
    pub fn plan_trace(&self) -> &[PlanStep] {
        &self.plan_trace
    }

    /// Number of commitments between the root and this node.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Sets the reward of this node's commitment.
    pub fn set_choice_reward(&mut self, reward: f64) {
        self.choice_reward = reward;
    }

    /// Sets the cumulative reward.
    pub fn set_plan_reward(&mut self, reward: f64) {
        self.plan_reward = reward;
    }

    /// Index range of the unassigned variables scheduled at `tick`.
    #[must_use]
    pub fn tick_range(&self, tick: Tick) -> Range<usize> {
        let start = self.unassigned.partition_point(|var| var.tick() < tick);
        let end = self.unassigned.partition_point(|var| var.tick() <= tick);
        start..end
    }

    /// Position of the variable `(satellite, tick)`, if still unassigned.
    #[must_use]
    pub fn position_of(&self, satellite: SatelliteId, tick: Tick) -> Option<usize> {
        self.unassigned
            .binary_search_by_key(&(tick, satellite), |var| var.order_key())
            .ok()
    }

    /// Mutable access to an unassigned variable.
    ///
    /// The first call for a variable still shared with another node clones it and
    /// writes the clone back at the same position; later calls mutate that private copy.
    pub fn variable_mut(&mut self, index: usize) -> &mut Variable {
        Arc::make_mut(&mut self.unassigned[index])
    }

    /// Removes and returns the variable at `index`.
    pub fn remove_variable(&mut self, index: usize) -> Arc<Variable> {
        self.unassigned.remove(index)
    }

    /// Drops every variable whose choice set became empty. Returns how many.
    pub fn evict_empty(&mut self) -> usize {
        let before = self.unassigned.len();
        self.unassigned.retain(|var| !var.is_empty());
        before - self.unassigned.len()
    }

    pub(crate) fn set_committed(&mut self, variable: Arc<Variable>, keep_trace: bool) {
        if keep_trace {
            if let Some(parent) = self.parent {
                self.plan_trace.push(PlanStep {
                    parent,
                    node: self.id,
                    variable: Arc::clone(&variable),
                });
            }
        }
        self.committed = Some(variable);
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus, message: Option<String>) {
        self.status = status;
        if message.is_some() {
            self.status_message = message;
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} ", self.id)?;
        match &self.committed {
            Some(var) => write!(f, "{var}")?,
            None => f.write_str("root")?,
        }
        write!(
            f,
            ", plan reward: {:.3}, depth: {}, vars: {}, {}",
            self.plan_reward,
            self.depth,
            self.unassigned.len(),
            self.status
        )?;
        if let Some(message) = &self.status_message {
            write!(f, " {message}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Node {
        Node::root(
            0,
            vec![
                Variable::new(2, 20, [("L.30", vec![1])]),
                Variable::new(1, 20, [("L.30", vec![2])]),
                Variable::new(1, 10, [("L.30", vec![3]), ("P.30", vec![3, 4])]),
            ],
        )
    }

    #[test]
    fn root_sorts_by_tick_then_satellite() {
        let node = root();
        let keys: Vec<_> = node.unassigned().iter().map(|v| v.order_key()).collect();
        assert_eq!(keys, vec![(10, 1), (20, 1), (20, 2)]);
        assert_eq!(node.tick_range(20), 1..3);
        assert!(node.tick_range(15).is_empty());
        assert_eq!(node.position_of(2, 20), Some(2));
        assert_eq!(node.position_of(3, 20), None);
    }

    #[test]
    fn child_mutation_is_copy_on_write() {
        let parent = root();
        let mut child = parent.branch(1, true);
        assert!(Arc::ptr_eq(&parent.unassigned()[0], &child.unassigned()[0]));
        child.variable_mut(0).remove_choice("P.30");
        child.variable_mut(0).remove_choice("L.30");
        assert!(!Arc::ptr_eq(&parent.unassigned()[0], &child.unassigned()[0]));
        assert_eq!(parent.unassigned()[0].choices().len(), 2);
        assert_eq!(child.evict_empty(), 1);
        assert_eq!(parent.unassigned().len(), 3);
        assert_eq!(child.unassigned().len(), 2);
        assert_eq!(child.depth(), 1);
        assert_eq!(child.parent(), Some(0));
    }
}
