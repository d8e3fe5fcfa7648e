use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use planit::{GroundPointId, Node, PlanitError, RankedChoice, ValueRanker, Variable};

use super::rank_by_reward;
use crate::ground::reward::ErrorReductionReward;

/// Preferential block voting.
///
/// Commands are grouped into candidate classes by payload and error code. Every
/// ground point observable at the tick is a voter; it ranks the classes that would
/// improve it by ascending measurement error. Each round, voters not yet satisfied
/// vote for their favourite unelected class; a class holding a strict majority of the
/// votes cast is elected and its voters abstain afterwards. Voting stops once the
/// elected commands fill the seats or no class reaches a majority.
///
/// The ranking lists the elected commands first, in election order, then every
/// other command by error reduction. Rewards are the real error reductions.
#[derive(Debug, Clone)]
pub struct RankedChoiceVoting {
    reward: Arc<ErrorReductionReward>,
}

/// Result of one election.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Elected classes in election order.
    pub elected: Vec<String>,
    /// Rounds held.
    pub rounds: usize,
    /// Ballots cast per voter across all rounds.
    pub votes_cast: BTreeMap<GroundPointId, usize>,
}

struct Ballot {
    /// Class key with its commands in declaration order.
    classes: Vec<(String, Vec<String>)>,
    /// Class indices per voter, most preferred first.
    preferences: BTreeMap<GroundPointId, Vec<usize>>,
}

impl Ballot {
    fn new(reward: &ErrorReductionReward, variable: &Variable) -> Self {
        let mut classes: Vec<(String, Vec<String>)> = Vec::new();
        let mut best: BTreeMap<GroundPointId, BTreeMap<usize, f64>> = BTreeMap::new();
        for (label, ground_points) in variable.choices() {
            let Some(command) = reward.command(label) else {
                continue;
            };
            let key = command.error_class();
            let class = match classes.iter().position(|(existing, _)| *existing == key) {
                Some(index) => index,
                None => {
                    classes.push((key, Vec::new()));
                    classes.len() - 1
                }
            };
            classes[class].1.push(label.clone());
            for &voter in ground_points {
                let (Some(error), Some(prior)) = (
                    reward.measurement_error(voter, &command),
                    reward.prior_error(voter, variable.tick()),
                ) else {
                    continue;
                };
                if error >= prior {
                    continue;
                }
                let slot = best.entry(voter).or_default().entry(class).or_insert(error);
                *slot = slot.min(error);
            }
        }
        let preferences = best
            .into_iter()
            .map(|(voter, errors)| {
                let mut ranked: Vec<(usize, f64)> = errors.into_iter().collect();
                ranked.sort_by(|(a, a_err), (b, b_err)| a_err.total_cmp(b_err).then(a.cmp(b)));
                (voter, ranked.into_iter().map(|(class, _)| class).collect())
            })
            .collect();
        Self {
            classes,
            preferences,
        }
    }

    fn run(&self, seats: usize) -> (Vec<usize>, VoteOutcome) {
        let mut elected: Vec<usize> = Vec::new();
        let mut filled = 0;
        let mut satisfied: BTreeSet<GroundPointId> = BTreeSet::new();
        let mut outcome = VoteOutcome::default();

        while filled < seats {
            let mut tally = vec![0_usize; self.classes.len()];
            let mut ballots: Vec<(GroundPointId, usize)> = Vec::new();
            for (voter, ranked) in &self.preferences {
                if satisfied.contains(voter) {
                    continue;
                }
                if let Some(&class) = ranked.iter().find(|class| !elected.contains(class)) {
                    tally[class] += 1;
                    ballots.push((*voter, class));
                    *outcome.votes_cast.entry(*voter).or_insert(0) += 1;
                }
            }
            if ballots.is_empty() {
                break;
            }
            outcome.rounds += 1;
            let Some((winner, votes)) = tally
                .iter()
                .copied()
                .enumerate()
                .max_by(|(a, a_votes), (b, b_votes)| a_votes.cmp(b_votes).then(b.cmp(a)))
            else {
                break;
            };
            if votes * 2 <= ballots.len() {
                break;
            }
            elected.push(winner);
            filled += self.classes[winner].1.len();
            satisfied.extend(
                ballots
                    .iter()
                    .filter(|(_, class)| *class == winner)
                    .map(|(voter, _)| *voter),
            );
        }
        outcome.elected = elected
            .iter()
            .map(|class| self.classes[*class].0.clone())
            .collect();
        (elected, outcome)
    }
}

impl RankedChoiceVoting {
    /// Votes with errors and rewards from `reward`.
    #[must_use]
    pub const fn new(reward: Arc<ErrorReductionReward>) -> Self {
        Self { reward }
    }

    /// Holds the election for `variable` without ranking.
    #[must_use]
    pub fn elect(&self, variable: &Variable, seats: usize) -> VoteOutcome {
        Ballot::new(&self.reward, variable).run(seats).1
    }
}

impl ValueRanker for RankedChoiceVoting {
    fn rank(
        &self,
        _node: &Node,
        variable: &Variable,
        seats: Option<usize>,
    ) -> Result<Vec<RankedChoice>, PlanitError> {
        let scored = rank_by_reward(&self.reward, variable);
        let seats = seats.unwrap_or(scored.len()).min(scored.len());
        let ballot = Ballot::new(&self.reward, variable);
        let (elected, _) = ballot.run(seats);

        let mut ranked: Vec<RankedChoice> = Vec::with_capacity(scored.len());
        for class in elected {
            let members = &ballot.classes[class].1;
            ranked.extend(
                scored
                    .iter()
                    .filter(|choice| members.contains(&choice.command))
                    .cloned(),
            );
        }
        let rest: Vec<RankedChoice> = scored
            .into_iter()
            .filter(|choice| !ranked.iter().any(|r| r.command == choice.command))
            .collect();
        ranked.extend(rest);
        Ok(ranked)
    }
}
