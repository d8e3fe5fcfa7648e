use std::sync::Arc;

use planit::{
    ChoicePropagator, GroundPointId, Node, PlanitError, PropagationReport, Tick, Variable,
};

use crate::ground::GroundRegistry;

/// Removes committed ground points from every variable at which they are still
/// accessible, dropping commands and variables left empty.
#[derive(Debug, Clone)]
pub struct DuplicateObservations {
    ground: Arc<GroundRegistry>,
}

impl DuplicateObservations {
    /// Uses the access ticks recorded in `ground`.
    #[must_use]
    pub const fn new(ground: Arc<GroundRegistry>) -> Self {
        Self { ground }
    }

    /// Eliminates `ground_points` from `node`.
    ///
    /// `committed_tick` is the tick of the commitment that observed them, or `None`
    /// for points observed in an earlier horizon. Every access tick is visited,
    /// including the committed one, so other satellites at the same tick lose the
    /// point as well.
    pub fn eliminate(
        &self,
        node: &mut Node,
        ground_points: &[GroundPointId],
        committed_tick: Option<Tick>,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        for &ground_point in ground_points {
            let mut ticks: Vec<Tick> = self.ground.access_ticks(ground_point).collect();
            if let Some(tick) = committed_tick {
                if !ticks.contains(&tick) {
                    ticks.push(tick);
                }
            }
            for tick in ticks {
                for index in node.tick_range(tick) {
                    if node.unassigned()[index].observes(ground_point) {
                        report.removed_choices +=
                            node.variable_mut(index).remove_ground_point(ground_point);
                    }
                }
            }
        }
        report.removed_variables = node.evict_empty();
        report
    }
}

impl ChoicePropagator for DuplicateObservations {
    fn name(&self) -> &str {
        "duplicate-observations"
    }

    fn propagate(
        &self,
        node: &mut Node,
        committed: &Variable,
    ) -> Result<PropagationReport, PlanitError> {
        let Some(assignment) = committed.assignment() else {
            return Err(PlanitError::Propagation {
                propagator: self.name().to_string(),
                message: format!("{} is not assigned", committed.name()),
            });
        };
        Ok(self.eliminate(node, &assignment.ground_points, Some(committed.tick())))
    }
}

#[cfg(test)]
mod tests {
    use planit::{Arena, RewardModel};

    use super::*;
    use crate::ground::GroundPoint;

    struct Table;

    impl RewardModel for Table {
        fn command_reward(&self, variable: &Variable, command: &str, _: &[u64]) -> f64 {
            match (variable.tick(), command) {
                (10, "A") => 0.5,
                (20, "A") => 0.3,
                _ => 0.2,
            }
        }
    }

    fn registry() -> Arc<GroundRegistry> {
        Arc::new(GroundRegistry::new([
            GroundPoint {
                id: 1,
                biome: 1,
                model_error: vec![0.05],
                access_ticks: [10, 20].into_iter().collect(),
            },
            GroundPoint {
                id: 2,
                biome: 1,
                model_error: vec![0.05],
                access_ticks: [20].into_iter().collect(),
            },
        ]))
    }

    #[test]
    fn committed_point_disappears_from_later_ticks() {
        let arena = Arena::new(vec![
            Variable::new(1, 10, [("A", vec![1])]),
            Variable::new(1, 20, [("A", vec![1]), ("B", vec![1])]),
        ]);
        let root = arena.root();
        let mut child = root.clone();
        let mut committed = (*child.remove_variable(0)).clone();
        committed.commit("A", &Table).unwrap();

        let propagator = DuplicateObservations::new(registry());
        let report = propagator.propagate(&mut child, &committed).unwrap();
        assert_eq!(report.removed_choices, 2);
        assert_eq!(report.removed_variables, 1);
        assert!(child.unassigned().is_empty());
        // the parent's copy is untouched
        assert_eq!(root.unassigned()[1].choices().len(), 2);
    }

    #[test]
    fn shared_commands_keep_their_other_points() {
        let arena = Arena::new(vec![
            Variable::new(1, 10, [("A", vec![1])]),
            Variable::new(2, 10, [("C", vec![1, 2])]),
            Variable::new(1, 20, [("A", vec![1, 2])]),
        ]);
        let mut child = arena.root().clone();
        let mut committed = (*child.remove_variable(0)).clone();
        committed.commit("A", &Table).unwrap();

        let report = DuplicateObservations::new(registry())
            .propagate(&mut child, &committed)
            .unwrap();
        assert_eq!(report.removed_choices, 0);
        assert_eq!(report.removed_variables, 0);
        for var in child.unassigned() {
            assert!(!var.observes(1), "{var}");
            assert!(var.observes(2));
        }
        assert!(arena.root().unassigned()[1].observes(1));
    }

    #[test]
    fn prior_observations_need_no_committed_tick() {
        let mut arena = Arena::new(vec![
            Variable::new(1, 10, [("A", vec![1])]),
            Variable::new(1, 20, [("A", vec![2])]),
        ]);
        let report =
            DuplicateObservations::new(registry()).eliminate(arena.root_mut(), &[1], None);
        assert_eq!(report.removed_variables, 1);
        assert_eq!(arena.root().unassigned().len(), 1);
        assert_eq!(arena.root().unassigned()[0].tick(), 20);
    }
}
