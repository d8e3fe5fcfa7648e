use indexmap::IndexSet;

use super::{Node, NodeId, NodeStatus, PlanStep};
use crate::{error::PlanitError, variable::Variable};

/// Owns every node created during a search. Nodes are addressed by id and are
/// never removed, so parent links stay valid for plan reconstruction.
#[derive(Debug, Clone)]
pub struct Arena {
    nodes: Vec<Node>,
    open: IndexSet<NodeId>,
    successes: Vec<NodeId>,
}

impl Arena {
    /// Creates an arena whose root (id 0) holds `variables` and is open.
    #[must_use]
    pub fn new(variables: Vec<Variable>) -> Self {
        let root = Node::root(0, variables);
        let mut open = IndexSet::new();
        open.insert(0);
        Self {
            nodes: vec![root],
            open,
            successes: Vec::new(),
        }
    }

    /// Root node id.
    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        0
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Mutable root; used to prune the search space before solving.
    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.nodes[0]
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        usize::try_from(id).ok().and_then(|idx| self.nodes.get(idx))
    }

    /// Looks up a node mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        usize::try_from(id).ok().and_then(|idx| self.nodes.get_mut(idx))
    }

    /// Like [`Arena::get`] but reports a missing id as an error.
    pub fn node(&self, id: NodeId) -> Result<&Node, PlanitError> {
        self.get(id).ok_or(PlanitError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, PlanitError> {
        self.get_mut(id).ok_or(PlanitError::UnknownNode(id))
    }

    /// Id the next inserted node will receive.
    #[must_use]
    pub fn next_id(&self) -> NodeId {
        self.nodes.len() as NodeId
    }

    /// Number of nodes ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true; the root always exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Open frontier in insertion order.
    #[must_use]
    pub const fn open(&self) -> &IndexSet<NodeId> {
        &self.open
    }

    /// Success nodes in the order they were reached.
    #[must_use]
    pub fn successes(&self) -> &[NodeId] {
        &self.successes
    }

    /// Stores a freshly built child and links it to its parent.
    pub(crate) fn insert(&mut self, node: Node) -> Result<NodeId, PlanitError> {
        let id = node.id();
        debug_assert_eq!(id, self.next_id());
        if let Some(parent) = node.parent() {
            self.node_mut(parent)?.push_child(id);
        }
        match node.status() {
            NodeStatus::Open => {
                self.open.insert(id);
            }
            NodeStatus::Success => self.successes.push(id),
            NodeStatus::Exhausted | NodeStatus::Failed => {}
        }
        self.nodes.push(node);
        Ok(id)
    }

    /// Changes a node's status and keeps the frontier and success list in step.
    /// Success and failed nodes keep their status.
    pub(crate) fn set_status(
        &mut self,
        id: NodeId,
        status: NodeStatus,
        message: Option<String>,
    ) -> Result<(), PlanitError> {
        let node = self.node_mut(id)?;
        if node.status().is_terminal() {
            return Ok(());
        }
        node.set_status(status, message);
        if status != NodeStatus::Open {
            self.open.shift_remove(&id);
        }
        if status == NodeStatus::Success && !self.successes.contains(&id) {
            self.successes.push(id);
        }
        Ok(())
    }

    /// Rebuilds the commitments leading to `id` by following parent links.
    /// Works whether or not the nodes stored their own plan traces.
    pub fn collect_plan(&self, id: NodeId) -> Result<Vec<PlanStep>, PlanitError> {
        let mut steps = Vec::new();
        let mut cursor = self.node(id)?;
        while let Some(parent) = cursor.parent() {
            if let Some(variable) = cursor.committed() {
                steps.push(PlanStep {
                    parent,
                    node: cursor.id(),
                    variable: variable.clone(),
                });
            }
            cursor = self.node(parent)?;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Node with the highest plan reward; ties go to the lowest id.
    #[must_use]
    pub fn best_by_reward(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.status() != NodeStatus::Failed)
            .max_by(|a, b| {
                a.plan_reward()
                    .total_cmp(&b.plan_reward())
                    .then_with(|| b.id().cmp(&a.id()))
            })
            .map(Node::id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::strategy::RewardModel;

    struct Flat;

    impl RewardModel for Flat {
        fn command_reward(&self, _: &Variable, _: &str, points: &[u64]) -> f64 {
            points.len() as f64
        }
    }

    fn committed_child(arena: &Arena, parent: NodeId) -> Node {
        let parent_node = arena.node(parent).unwrap();
        let mut child = parent_node.branch(arena.next_id(), false);
        let mut var = (*child.remove_variable(0)).clone();
        let command = var.choices().keys().next().unwrap().clone();
        var.commit(&command, &Flat).unwrap();
        child.set_committed(Arc::new(var), false);
        child
    }

    #[test]
    fn collect_plan_follows_parent_links() {
        let mut arena = Arena::new(vec![
            Variable::new(1, 10, [("L.30", vec![1])]),
            Variable::new(1, 20, [("L.30", vec![2])]),
        ]);
        let first = committed_child(&arena, 0);
        let first = arena.insert(first).unwrap();
        let second = committed_child(&arena, first);
        let second = arena.insert(second).unwrap();

        let plan = arena.collect_plan(second).unwrap();
        let ticks: Vec<_> = plan.iter().map(|s| s.variable.tick()).collect();
        assert_eq!(ticks, vec![10, 20]);
        assert_eq!(plan[0].parent, 0);
        assert_eq!(arena.root().children(), &[first]);
        assert!(arena.node(second).unwrap().plan_trace().is_empty());
    }

    #[test]
    fn status_changes_maintain_frontier() {
        let mut arena = Arena::new(vec![Variable::new(1, 10, [("L.30", vec![1])])]);
        assert!(arena.open().contains(&0));
        arena
            .set_status(0, NodeStatus::Exhausted, Some("no choices".into()))
            .unwrap();
        assert!(arena.open().is_empty());
        assert_eq!(arena.root().status_message(), Some("no choices"));
        assert_eq!(arena.node(9).unwrap_err(), PlanitError::UnknownNode(9));
    }

    #[test]
    fn terminal_status_is_final() {
        let mut arena = Arena::new(vec![Variable::new(1, 10, [("L.30", vec![1])])]);
        arena.set_status(0, NodeStatus::Success, None).unwrap();
        arena
            .set_status(0, NodeStatus::Exhausted, Some("late".into()))
            .unwrap();
        assert_eq!(arena.root().status(), NodeStatus::Success);
        assert_eq!(arena.root().status_message(), None);
        assert_eq!(arena.successes(), &[0]);
        assert!(arena.open().is_empty());
    }

    #[test]
    fn best_by_reward_skips_failed_nodes() {
        let mut arena = Arena::new(vec![Variable::new(1, 10, [("L.30", vec![1])])]);
        let mut child = arena.root().branch(arena.next_id(), true);
        child.set_plan_reward(4.0);
        child.set_status(NodeStatus::Failed, Some("cap".into()));
        arena.insert(child).unwrap();
        assert_eq!(arena.best_by_reward(), Some(0));
    }
}
