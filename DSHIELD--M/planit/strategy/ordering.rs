use std::cmp::Ordering;

use super::{
    NodeRanker, RankedChoice, RewardAccumulator, RewardModel, SuccessTest, ValueRanker,
    VariableSelector,
};
use crate::{
    error::PlanitError,
    node::{Arena, Node, NodeId},
    variable::Variable,
};

/// Most recently created node first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirst;

impl NodeRanker for DepthFirst {
    fn rank(&self, _arena: &Arena, open: &[NodeId]) -> Vec<NodeId> {
        let mut ranked = open.to_vec();
        ranked.sort_unstable_by(|a, b| b.cmp(a));
        ranked
    }
}

/// Highest plan reward first, ties by ascending id.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeamByReward;

impl NodeRanker for BeamByReward {
    fn rank(&self, arena: &Arena, open: &[NodeId]) -> Vec<NodeId> {
        let reward = |id: NodeId| arena.get(id).map_or(f64::NEG_INFINITY, Node::plan_reward);
        let mut ranked = open.to_vec();
        ranked.sort_by(|a, b| {
            reward(*b)
                .total_cmp(&reward(*a))
                .then_with(|| a.cmp(b))
        });
        ranked
    }
}

/// First unassigned variable in tick/satellite order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstVariable;

impl VariableSelector for FirstVariable {
    fn select(&self, node: &Node) -> Option<usize> {
        (!node.unassigned().is_empty()).then_some(0)
    }
}

/// Keeps the declaration order of the choices and scores them with a reward model.
pub struct DeclaredOrder<R> {
    reward: R,
}

impl<R: RewardModel> DeclaredOrder<R> {
    /// Ranks with rewards from `reward`.
    pub const fn new(reward: R) -> Self {
        Self { reward }
    }
}

impl<R: RewardModel> ValueRanker for DeclaredOrder<R> {
    fn rank(
        &self,
        _node: &Node,
        variable: &Variable,
        _seats: Option<usize>,
    ) -> Result<Vec<RankedChoice>, PlanitError> {
        Ok(variable
            .choices()
            .iter()
            .map(|(command, ground_points)| RankedChoice {
                command: command.clone(),
                ground_points: ground_points.clone(),
                reward: self.reward.command_reward(variable, command, ground_points),
            })
            .collect())
    }
}

/// Sorts choices by descending reward, then by the supplied tie-breaker.
pub fn sort_by_reward(
    choices: &mut [RankedChoice],
    mut tie_break: impl FnMut(&RankedChoice, &RankedChoice) -> Ordering,
) {
    choices.sort_by(|a, b| {
        b.reward
            .total_cmp(&a.reward)
            .then_with(|| tie_break(a, b))
            .then_with(|| a.command.cmp(&b.command))
    });
}

/// `plan_reward = parent plan reward + committed reward`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveReward;

impl RewardAccumulator for AdditiveReward {
    fn accumulate(&self, parent_plan_reward: f64, node: &mut Node) {
        let choice = node
            .committed()
            .and_then(|var| var.assignment())
            .map_or(0.0, |assignment| assignment.reward);
        node.set_choice_reward(choice);
        node.set_plan_reward(parent_plan_reward + choice);
    }
}

/// Succeeds once nothing is left to decide.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUnassigned;

impl SuccessTest for NoUnassigned {
    fn is_success(&self, node: &Node) -> bool {
        node.unassigned().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Count;

    impl RewardModel for Count {
        fn command_reward(&self, _: &Variable, _: &str, points: &[u64]) -> f64 {
            points.len() as f64
        }
    }

    #[test]
    fn depth_first_prefers_newest() {
        let arena = Arena::new(Vec::new());
        assert_eq!(DepthFirst.rank(&arena, &[3, 7, 5]), vec![7, 5, 3]);
    }

    #[test]
    fn beam_breaks_reward_ties_by_id() {
        let arena = Arena::new(Vec::new());
        // unknown ids rank last, among themselves by id
        assert_eq!(BeamByReward.rank(&arena, &[4, 0, 2]), vec![0, 2, 4]);
    }

    #[test]
    fn sort_by_reward_is_total() {
        let var = Variable::new(1, 5, [("B", vec![1]), ("A", vec![2]), ("C", vec![1, 2])]);
        let ranker = DeclaredOrder::new(Count);
        let node = Arena::new(vec![var.clone()]).root().clone();
        let mut first = ranker.rank(&node, &var, None).unwrap();
        let mut second = first.clone();
        second.reverse();
        sort_by_reward(&mut first, |_, _| Ordering::Equal);
        sort_by_reward(&mut second, |_, _| Ordering::Equal);
        assert_eq!(first, second);
        let order: Vec<_> = first.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }
}
