use std::sync::Arc;

use serde_json::json;
use shared_logging::LogLevel;

use super::Planit;
use crate::{
    error::PlanitError,
    node::{NodeId, NodeStatus},
    strategy::{PropagationReport, RankedChoice},
    variable::Variable,
};

impl Planit {
    /// Branches `id` on its selected variable.
    pub(super) fn expand(&mut self, id: NodeId) -> Result<(), PlanitError> {
        self.stats.expansions += 1;
        let node = self.arena.node(id)?;

        if node.unassigned().is_empty() {
            if node.committed().is_some() {
                self.arena.set_status(id, NodeStatus::Success, None)?;
            } else {
                self.exhaust(id, "nothing left to decide")?;
            }
            return Ok(());
        }

        let Some((index, selected)) = self
            .variable_selector
            .select(node)
            .and_then(|index| node.unassigned().get(index).map(|var| (index, Arc::clone(var))))
        else {
            return self.exhaust(id, "no selectable variable");
        };
        let ranked = self
            .value_ranker
            .rank(node, &selected, self.config.choice_beam_width)?;

        if let Some(bad) = ranked.iter().find(|choice| choice.reward < 0.0) {
            return Err(PlanitError::NegativeReward {
                variable: selected.name(),
                command: bad.command.clone(),
                reward: bad.reward,
            });
        }
        let (viable, pruned): (Vec<RankedChoice>, Vec<RankedChoice>) =
            ranked.into_iter().partition(|choice| choice.reward > 0.0);
        self.stats.pruned_non_positive += pruned.len();

        if viable.is_empty() {
            self.arena.node_mut(id)?.remove_variable(index);
            self.stats.dropped_variables += 1;
            self.note(
                LogLevel::Debug,
                "planit.variable.dropped",
                json!({ "node": id, "variable": selected.name(), "pruned": pruned.len() }),
            );
            return Ok(());
        }

        let chosen: Vec<RankedChoice> = match self.config.choice_beam_width {
            Some(width) => viable.into_iter().take(width.max(1)).collect(),
            None => viable,
        };
        for choice in &chosen {
            self.spawn_child(id, &selected, choice)?;
        }

        let parent = self.arena.node_mut(id)?;
        let variable = parent.variable_mut(index);
        variable.retain_commands(|command, _| {
            !chosen.iter().any(|choice| choice.command == command)
                && !pruned.iter().any(|choice| choice.command == command)
        });
        if variable.is_empty() {
            parent.remove_variable(index);
            self.stats.dropped_variables += 1;
        }
        if self.config.choice_beam_width.is_none() {
            self.exhaust(id, "expanded every choice")?;
        }
        Ok(())
    }

    fn spawn_child(
        &mut self,
        parent_id: NodeId,
        selected: &Variable,
        choice: &RankedChoice,
    ) -> Result<NodeId, PlanitError> {
        let keep_trace = self.config.store_plan_traces;
        let parent = self.arena.node(parent_id)?;
        let parent_plan_reward = parent.plan_reward();
        let mut child = parent.branch(self.arena.next_id(), keep_trace);

        let position = child
            .position_of(selected.satellite(), selected.tick())
            .ok_or(PlanitError::MissingVariable {
                node: parent_id,
                satellite: selected.satellite(),
                tick: selected.tick(),
            })?;
        let mut committed = (*child.remove_variable(position)).clone();
        committed.commit(&choice.command, self.reward_model.as_ref())?;
        let committed = Arc::new(committed);
        child.set_committed(Arc::clone(&committed), keep_trace);

        let mut propagated = PropagationReport::default();
        for propagator in &self.propagators {
            propagated.absorb(propagator.propagate(&mut child, &committed)?);
        }
        self.stats.pruned_choices += propagated.removed_choices;
        self.stats.dropped_variables += propagated.removed_variables;
        self.accumulator.accumulate(parent_plan_reward, &mut child);

        if let Some(violated) = self.constraints.iter().find(|c| !c.check(&child)) {
            child.set_status(NodeStatus::Failed, Some(violated.name().to_string()));
            self.stats.failed += 1;
            self.note(
                LogLevel::Debug,
                "planit.node.failed",
                json!({ "node": child.id(), "parent": parent_id, "constraint": violated.name() }),
            );
        } else if self.success_test.is_success(&child) {
            child.set_status(NodeStatus::Success, None);
        }

        self.stats.children += 1;
        self.arena.insert(child)
    }

    fn exhaust(&mut self, id: NodeId, reason: &str) -> Result<(), PlanitError> {
        self.arena
            .set_status(id, NodeStatus::Exhausted, Some(reason.to_string()))?;
        self.stats.exhausted += 1;
        self.note(
            LogLevel::Debug,
            "planit.node.exhausted",
            json!({ "node": id, "reason": reason }),
        );
        Ok(())
    }
}
