use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{error::PlanitError, strategy::RewardModel};

/// Satellite identifier.
pub type SatelliteId = u32;
/// Discrete time unit of the horizon (seconds in the observation planner).
pub type Tick = u32;
/// Ground point identifier.
pub type GroundPointId = u64;
/// Command label -> ordered ground points the command would observe.
pub type ChoiceSet = IndexMap<String, Vec<GroundPointId>>;

/// Committed decision of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Chosen command label.
    pub command: String,
    /// Ground points observed by the command at commit time.
    pub ground_points: Vec<GroundPointId>,
    /// Reward evaluated by the engine's reward model.
    pub reward: f64,
}

/// One satellite-tick decision point.
///
/// While unassigned the choice set is expected to be non-empty; a variable whose
/// choices run out must be evicted by whoever owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    satellite: SatelliteId,
    tick: Tick,
    choices: ChoiceSet,
    assignment: Option<Assignment>,
}

impl Variable {
    /// Creates an unassigned variable.
    pub fn new<I, S>(satellite: SatelliteId, tick: Tick, choices: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<GroundPointId>)>,
        S: Into<String>,
    {
        Self {
            satellite,
            tick,
            choices: choices
                .into_iter()
                .map(|(command, ground_points)| (command.into(), ground_points))
                .collect(),
            assignment: None,
        }
    }

    /// `s<satellite>.<tick>`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("s{}.{}", self.satellite, self.tick)
    }

    /// Owning satellite.
    #[must_use]
    pub const fn satellite(&self) -> SatelliteId {
        self.satellite
    }

    /// Scheduled tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Sort key used by node variable lists.
    #[must_use]
    pub const fn order_key(&self) -> (Tick, SatelliteId) {
        (self.tick, self.satellite)
    }

    /// Remaining choices in declaration order.
    #[must_use]
    pub const fn choices(&self) -> &ChoiceSet {
        &self.choices
    }

    /// Ground points of a single command.
    #[must_use]
    pub fn ground_points(&self, command: &str) -> Option<&[GroundPointId]> {
        self.choices.get(command).map(Vec::as_slice)
    }

    /// Committed decision, if any.
    #[must_use]
    pub const fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Whether `commit` already ran.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// True once every choice has been removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Whether any remaining command would observe `ground_point`.
    #[must_use]
    pub fn observes(&self, ground_point: GroundPointId) -> bool {
        self.choices
            .values()
            .any(|ground_points| ground_points.contains(&ground_point))
    }

    /// Commits `command`, evaluating its reward through `reward`.
    pub fn commit(
        &mut self,
        command: &str,
        reward: &dyn RewardModel,
    ) -> Result<&Assignment, PlanitError> {
        if self.assignment.is_some() {
            return Err(PlanitError::AlreadyAssigned {
                variable: self.name(),
            });
        }
        let ground_points = self
            .choices
            .get(command)
            .cloned()
            .ok_or_else(|| PlanitError::InvalidChoice {
                variable: self.name(),
                command: command.to_string(),
            })?;
        let value = reward.command_reward(self, command, &ground_points);
        Ok(&*self.assignment.insert(Assignment {
            command: command.to_string(),
            ground_points,
            reward: value,
        }))
    }

    /// Deletes a command. Returns whether it was present; repeated calls are no-ops.
    pub fn remove_choice(&mut self, command: &str) -> bool {
        self.choices.shift_remove(command).is_some()
    }

    /// Removes `ground_point` from every command and drops commands left empty.
    /// Returns the number of dropped commands.
    pub fn remove_ground_point(&mut self, ground_point: GroundPointId) -> usize {
        let before = self.choices.len();
        self.choices.retain(|_, ground_points| {
            ground_points.retain(|gp| *gp != ground_point);
            !ground_points.is_empty()
        });
        before - self.choices.len()
    }

    /// Keeps only the commands accepted by `keep`. Returns the number removed.
    pub fn retain_commands(&mut self, mut keep: impl FnMut(&str, &[GroundPointId]) -> bool) -> usize {
        let before = self.choices.len();
        self.choices
            .retain(|command, ground_points| keep(command, ground_points));
        before - self.choices.len()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assignment {
            Some(assignment) => write!(
                f,
                "{}={} {:?} ({:.5})",
                self.name(),
                assignment.command,
                assignment.ground_points,
                assignment.reward
            ),
            None => write!(
                f,
                "{}: {:?}",
                self.name(),
                self.choices.keys().collect::<Vec<_>>()
            ),
        }
    }
}
