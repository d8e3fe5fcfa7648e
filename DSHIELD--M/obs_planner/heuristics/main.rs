//! Value-ranking heuristics for observation commands.

/// Ranked-choice voting among the ground points of a tick.
pub mod voting;

pub use voting::RankedChoiceVoting;

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::{bail, Error};
use planit::{sort_by_reward, Node, PlanitError, RankedChoice, ValueRanker, Variable};
use serde::{Deserialize, Serialize};

use crate::ground::reward::ErrorReductionReward;

/// Selectable value-ranking heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueRanking {
    /// Highest summed error reduction first.
    MaxErrorReduction,
    /// Most ground points first.
    MaxCount,
    /// Ground points elect the commands.
    RankedChoiceVoting,
}

impl ValueRanking {
    /// Builds the ranker backed by `reward`.
    #[must_use]
    pub fn ranker(self, reward: Arc<ErrorReductionReward>) -> Arc<dyn ValueRanker> {
        match self {
            Self::MaxErrorReduction => Arc::new(MaxErrorReduction::new(reward)),
            Self::MaxCount => Arc::new(MaxGroundPointCount::new(reward)),
            Self::RankedChoiceVoting => Arc::new(RankedChoiceVoting::new(reward)),
        }
    }
}

impl fmt::Display for ValueRanking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxErrorReduction => "max-error-reduction",
            Self::MaxCount => "max-count",
            Self::RankedChoiceVoting => "ranked-choice-voting",
        })
    }
}

impl FromStr for ValueRanking {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max-error-reduction" | "maxerrreduction" => Ok(Self::MaxErrorReduction),
            "max-count" | "maxgpcount" => Ok(Self::MaxCount),
            "ranked-choice-voting" | "gprankedchoice" => Ok(Self::RankedChoiceVoting),
            other => bail!("unknown value ranking `{other}`"),
        }
    }
}

fn observations(reward: &ErrorReductionReward, label: &str) -> usize {
    reward
        .command(label)
        .map_or(usize::MAX, |command| command.observation_count())
}

/// Every current choice of `variable` scored by error reduction, best first; ties
/// go to fewer simultaneous observations, then to the label.
pub(crate) fn rank_by_reward(
    reward: &ErrorReductionReward,
    variable: &Variable,
) -> Vec<RankedChoice> {
    let mut choices: Vec<RankedChoice> = variable
        .choices()
        .iter()
        .map(|(command, ground_points)| RankedChoice {
            command: command.clone(),
            ground_points: ground_points.clone(),
            reward: reward.error_reduction(variable.tick(), command, ground_points),
        })
        .collect();
    sort_by_reward(&mut choices, |a, b| {
        observations(reward, &a.command).cmp(&observations(reward, &b.command))
    });
    choices
}

/// Highest error reduction first; ties go to fewer simultaneous observations.
#[derive(Debug, Clone)]
pub struct MaxErrorReduction {
    reward: Arc<ErrorReductionReward>,
}

impl MaxErrorReduction {
    /// Ranks with `reward`.
    #[must_use]
    pub const fn new(reward: Arc<ErrorReductionReward>) -> Self {
        Self { reward }
    }
}

impl ValueRanker for MaxErrorReduction {
    fn rank(
        &self,
        _node: &Node,
        variable: &Variable,
        _seats: Option<usize>,
    ) -> Result<Vec<RankedChoice>, PlanitError> {
        Ok(rank_by_reward(&self.reward, variable))
    }
}

/// Most ground points first; ties by error reduction, then fewer observations.
#[derive(Debug, Clone)]
pub struct MaxGroundPointCount {
    reward: Arc<ErrorReductionReward>,
}

impl MaxGroundPointCount {
    /// Ranks with `reward` as the reported reward.
    #[must_use]
    pub const fn new(reward: Arc<ErrorReductionReward>) -> Self {
        Self { reward }
    }
}

impl ValueRanker for MaxGroundPointCount {
    fn rank(
        &self,
        _node: &Node,
        variable: &Variable,
        _seats: Option<usize>,
    ) -> Result<Vec<RankedChoice>, PlanitError> {
        let mut choices = rank_by_reward(&self.reward, variable);
        // stable: equal counts keep the reward order
        choices.sort_by(|a, b| b.ground_points.len().cmp(&a.ground_points.len()));
        Ok(choices)
    }
}


#[cfg(test)]
mod tests {
    use planit::Arena;

    use super::*;

    fn labels(choices: &[RankedChoice]) -> Vec<&str> {
        choices.iter().map(|c| c.command.as_str()).collect()
    }

    #[test]
    fn error_reduction_prefers_single_observations_on_ties() {
        let reward = fixtures::reward(&[1, 2], &["L.30", "P.30", "L.24", "L.30.P.30"]);
        let var = Variable::new(
            1,
            10,
            [
                ("L.30.P.30", vec![1]),
                ("L.24", vec![1, 2]),
                ("P.30", vec![2]),
                ("L.30", vec![1]),
            ],
        );
        let node = Arena::new(vec![var.clone()]).root().clone();
        let ranker = MaxErrorReduction::new(reward);
        let ranked = ranker.rank(&node, &var, Some(1)).unwrap();
        // 2 * 0.03 > 0.045 > 0.04 == 0.04
        assert_eq!(labels(&ranked), vec!["L.24", "L.30.P.30", "L.30", "P.30"]);
        assert_eq!(ranked, ranker.rank(&node, &var, Some(1)).unwrap());
    }

    #[test]
    fn max_count_orders_by_ground_points() {
        let reward = fixtures::reward(&[1, 2, 3], &["L.30", "L.20"]);
        let var = Variable::new(1, 10, [("L.30", vec![1]), ("L.20", vec![1, 2, 3])]);
        let node = Arena::new(vec![var.clone()]).root().clone();
        let ranked = MaxGroundPointCount::new(reward).rank(&node, &var, None).unwrap();
        assert_eq!(labels(&ranked), vec!["L.20", "L.30"]);
        assert!((ranked[0].reward - 0.06).abs() < 1e-12);
    }

    #[test]
    fn parses_ranking_names() {
        assert_eq!(
            "ranked-choice-voting".parse::<ValueRanking>().unwrap(),
            ValueRanking::RankedChoiceVoting
        );
        assert_eq!("maxGpCount".parse::<ValueRanking>().unwrap(), ValueRanking::MaxCount);
        assert!("best".parse::<ValueRanking>().is_err());
        assert_eq!(ValueRanking::MaxErrorReduction.to_string(), "max-error-reduction");
    }
}
