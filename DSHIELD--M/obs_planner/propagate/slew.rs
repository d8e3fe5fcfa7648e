use std::sync::Arc;

use planit::{ChoicePropagator, Node, PlanitError, PropagationReport, Tick, Variable};

use crate::{
    command::{Angle, CommandCatalog},
    slew::{SlewTable, REQUIRED_GAP},
};

/// Removes same-satellite commands whose pointing angle cannot be reached in time
/// from (or before) the committed command.
#[derive(Debug, Clone)]
pub struct SlewFeasibility {
    slew: Arc<SlewTable>,
    catalog: Arc<CommandCatalog>,
}

impl SlewFeasibility {
    /// Uses `slew` for durations and `catalog` for pointing angles.
    #[must_use]
    pub const fn new(slew: Arc<SlewTable>, catalog: Arc<CommandCatalog>) -> Self {
        Self { slew, catalog }
    }

    fn angle(&self, label: &str) -> Result<Angle, PlanitError> {
        self.catalog
            .get(label)
            .map(|command| command.pointing_angle())
            .ok_or_else(|| self.failure(format!("unknown command `{label}`")))
    }

    fn failure(&self, message: String) -> PlanitError {
        PlanitError::Propagation {
            propagator: self.name().to_string(),
            message,
        }
    }

    /// Slew duration between two angles.
    fn slew_time(&self, from: Angle, to: Angle) -> Result<u32, PlanitError> {
        self.slew
            .cost(from, to)
            .map(|cost| cost.time)
            .ok_or_else(|| self.failure(format!("no slew entry {from} -> {to}")))
    }

    /// Drops the commands of `node.unassigned()[index]` rejected by `infeasible`.
    fn prune(
        &self,
        node: &mut Node,
        index: usize,
        infeasible: impl Fn(Angle) -> Result<bool, PlanitError>,
    ) -> Result<usize, PlanitError> {
        let mut doomed = Vec::new();
        for label in node.unassigned()[index].choices().keys() {
            if infeasible(self.angle(label)?)? {
                doomed.push(label.clone());
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }
        let variable = node.variable_mut(index);
        Ok(doomed
            .iter()
            .filter(|label| variable.remove_choice(label))
            .count())
    }
}

impl ChoicePropagator for SlewFeasibility {
    fn name(&self) -> &str {
        "slew-feasibility"
    }

    fn propagate(
        &self,
        node: &mut Node,
        committed: &Variable,
    ) -> Result<PropagationReport, PlanitError> {
        let Some(assignment) = committed.assignment() else {
            return Err(self.failure(format!("{} is not assigned", committed.name())));
        };
        let tick = committed.tick();
        let satellite = committed.satellite();
        let from = self.angle(&assignment.command)?;
        let horizon = u64::from(REQUIRED_GAP) + u64::from(self.slew.max_time());
        let reach = |start: Tick, span: u64| u64::from(start) + span;
        let mut report = PropagationReport::default();

        let split = node.tick_range(tick).start;
        // later commands: start no earlier than tick + gap + slew(from -> to)
        for index in split..node.unassigned().len() {
            let other = &node.unassigned()[index];
            if u64::from(other.tick()) >= reach(tick, horizon) {
                break;
            }
            if other.satellite() != satellite {
                continue;
            }
            let other_tick = other.tick();
            report.removed_choices += self.prune(node, index, |to| {
                let gap = u64::from(REQUIRED_GAP) + u64::from(self.slew_time(from, to)?);
                Ok(to != from && u64::from(other_tick) < reach(tick, gap))
            })?;
        }
        // earlier commands: the committed one must still start after their slew
        for index in (0..split).rev() {
            let other = &node.unassigned()[index];
            if reach(other.tick(), horizon) <= u64::from(tick) {
                break;
            }
            if other.satellite() != satellite {
                continue;
            }
            let other_tick = other.tick();
            report.removed_choices += self.prune(node, index, |to| {
                let gap = u64::from(REQUIRED_GAP) + u64::from(self.slew_time(to, from)?);
                Ok(to != from && u64::from(tick) < reach(other_tick, gap))
            })?;
        }

        report.removed_variables = node.evict_empty();
        Ok(report)
    }
}
