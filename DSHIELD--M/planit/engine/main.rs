//! Search loop driving node expansion over the arena.

mod expand;
/// Outcome, limits and counters of a run.
pub mod report;

pub use report::{SearchLimit, SearchReport, SearchStats, SearchStatus};

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    error::PlanitError,
    node::{Arena, NodeId},
    strategy::{
        ordering::{AdditiveReward, BeamByReward, DeclaredOrder, FirstVariable, NoUnassigned},
        ChoicePropagator, Constraint, NodeRanker, RewardAccumulator, RewardModel, SuccessTest,
        ValueRanker, VariableSelector,
    },
    telemetry::SearchTelemetry,
    variable::Variable,
};

/// Breadth and limits of a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Open nodes expanded per iteration.
    pub node_beam_width: usize,
    /// Choices branched on per expansion; `None` expands all and exhausts the parent.
    pub choice_beam_width: Option<usize>,
    /// Wall-clock limit checked once per iteration.
    pub time_limit: Option<Duration>,
    /// Maximum number of expansions.
    pub max_expansions: Option<usize>,
    /// Whether nodes carry their own plan trace.
    pub store_plan_traces: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            node_beam_width: 1,
            choice_beam_width: Some(1),
            time_limit: None,
            max_expansions: None,
            store_plan_traces: true,
        }
    }
}

/// Beam / depth-first planner over an arena of partial plans.
pub struct Planit {
    arena: Arena,
    config: SearchConfig,
    reward_model: Arc<dyn RewardModel>,
    node_ranker: Arc<dyn NodeRanker>,
    variable_selector: Arc<dyn VariableSelector>,
    value_ranker: Arc<dyn ValueRanker>,
    propagators: Vec<Arc<dyn ChoicePropagator>>,
    accumulator: Arc<dyn RewardAccumulator>,
    constraints: Vec<Arc<dyn Constraint>>,
    success_test: Arc<dyn SuccessTest>,
    telemetry: Option<SearchTelemetry>,
    stats: SearchStats,
}

impl fmt::Debug for Planit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planit")
            .field("nodes", &self.arena.len())
            .field("open", &self.arena.open().len())
            .field("config", &self.config)
            .field(
                "propagators",
                &self.propagators.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("constraints", &self.constraints.len())
            .finish_non_exhaustive()
    }
}

impl Planit {
    /// Creates a planner whose root holds `variables`.
    ///
    /// Defaults: beam-by-reward node ranking, first-variable selection, declared-order
    /// value ranking scored by `reward_model`, additive reward, no propagators and
    /// success once no variable remains.
    pub fn new(variables: Vec<Variable>, reward_model: Arc<dyn RewardModel>) -> Self {
        let value_ranker = Arc::new(DeclaredOrder::new(Arc::clone(&reward_model)));
        Self {
            arena: Arena::new(variables),
            config: SearchConfig::default(),
            reward_model,
            node_ranker: Arc::new(BeamByReward),
            variable_selector: Arc::new(FirstVariable),
            value_ranker,
            propagators: Vec::new(),
            accumulator: Arc::new(AdditiveReward),
            constraints: Vec::new(),
            success_test: Arc::new(NoUnassigned),
            telemetry: None,
            stats: SearchStats::default(),
        }
    }

    /// Replaces the search configuration.
    #[must_use]
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the node ranking strategy.
    #[must_use]
    pub fn with_node_ranker(mut self, ranker: Arc<dyn NodeRanker>) -> Self {
        self.node_ranker = ranker;
        self
    }

    /// Sets the variable selection strategy.
    #[must_use]
    pub fn with_variable_selector(mut self, selector: Arc<dyn VariableSelector>) -> Self {
        self.variable_selector = selector;
        self
    }

    /// Sets the value ranking strategy.
    #[must_use]
    pub fn with_value_ranker(mut self, ranker: Arc<dyn ValueRanker>) -> Self {
        self.value_ranker = ranker;
        self
    }

    /// Appends a propagator; propagators run in registration order.
    #[must_use]
    pub fn with_propagator(mut self, propagator: Arc<dyn ChoicePropagator>) -> Self {
        self.propagators.push(propagator);
        self
    }

    /// Sets the reward accumulation hook.
    #[must_use]
    pub fn with_accumulator(mut self, accumulator: Arc<dyn RewardAccumulator>) -> Self {
        self.accumulator = accumulator;
        self
    }

    /// Appends a global constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Arc<dyn Constraint>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Replaces the success test.
    #[must_use]
    pub fn with_success_test(mut self, test: Arc<dyn SuccessTest>) -> Self {
        self.success_test = test;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SearchTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Node storage.
    #[must_use]
    pub const fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Mutable node storage, for pruning the root before solving.
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Counters of the last `solve_it` call.
    #[must_use]
    pub const fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Runs the search until a success node exists, the frontier empties or a
    /// limit is hit.
    pub fn solve_it(&mut self) -> Result<SearchReport, PlanitError> {
        let started = Instant::now();
        self.stats = SearchStats::default();
        self.note(
            LogLevel::Info,
            "planit.solve.started",
            json!({
                "variables": self.arena.root().unassigned().len(),
                "node_beam_width": self.config.node_beam_width,
                "choice_beam_width": self.config.choice_beam_width,
            }),
        );

        let mut limit = None;
        while !self.arena.open().is_empty() && self.arena.successes().is_empty() {
            if self
                .config
                .time_limit
                .is_some_and(|time_limit| started.elapsed() >= time_limit)
            {
                limit = Some(SearchLimit::TimeLimit);
                break;
            }
            if self
                .config
                .max_expansions
                .is_some_and(|budget| self.stats.expansions >= budget)
            {
                limit = Some(SearchLimit::ExpansionBudget);
                break;
            }
            let open: Vec<NodeId> = self.arena.open().iter().copied().collect();
            let selected: Vec<NodeId> = self
                .node_ranker
                .rank(&self.arena, &open)
                .into_iter()
                .take(self.config.node_beam_width.max(1))
                .collect();
            for id in selected {
                if self.arena.open().contains(&id) {
                    self.expand(id)?;
                }
            }
        }

        self.stats.nodes_created = self.arena.len();
        self.stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = self.report(limit)?;
        self.note(LogLevel::Info, "planit.solve.finished", report.summary());
        Ok(report)
    }

    fn report(&self, limit: Option<SearchLimit>) -> Result<SearchReport, PlanitError> {
        let (status, node) = if let Some(&success) = self.arena.successes().first() {
            (SearchStatus::Success, Some(success))
        } else if limit.is_some() {
            (SearchStatus::Incomplete, self.arena.best_by_reward())
        } else {
            (SearchStatus::Infeasible, None)
        };
        let (plan, plan_reward) = match node {
            Some(id) => {
                let node = self.arena.node(id)?;
                let plan = if self.config.store_plan_traces {
                    node.plan_trace().to_vec()
                } else {
                    self.arena.collect_plan(id)?
                };
                (plan, node.plan_reward())
            }
            None => (Vec::new(), 0.0),
        };
        Ok(SearchReport::new(
            status,
            node,
            plan,
            plan_reward,
            limit.filter(|_| status == SearchStatus::Incomplete),
            self.stats,
        ))
    }

    fn note(&self, level: LogLevel, name: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.milestone(level, name, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        node::{Node, NodeStatus},
        strategy::{ordering::DepthFirst, FnConstraint, PropagationReport},
        variable::Tick,
    };

    struct Rewards(HashMap<(Tick, String), f64>);

    impl Rewards {
        fn uniform() -> Arc<Self> {
            Arc::new(Self(HashMap::new()))
        }

        fn with(entries: &[(Tick, &str, f64)]) -> Arc<Self> {
            Arc::new(Self(
                entries
                    .iter()
                    .map(|(tick, cmd, reward)| ((*tick, (*cmd).to_string()), *reward))
                    .collect(),
            ))
        }
    }

    impl RewardModel for Rewards {
        fn command_reward(&self, variable: &Variable, command: &str, _: &[u64]) -> f64 {
            self.0
                .get(&(variable.tick(), command.to_string()))
                .copied()
                .unwrap_or(1.0)
        }
    }

    struct DropObserved;

    impl ChoicePropagator for DropObserved {
        fn name(&self) -> &str {
            "drop-observed"
        }

        fn propagate(
            &self,
            node: &mut Node,
            committed: &Variable,
        ) -> Result<PropagationReport, PlanitError> {
            let observed = committed
                .assignment()
                .map(|a| a.ground_points.clone())
                .unwrap_or_default();
            let mut report = PropagationReport::default();
            for index in 0..node.unassigned().len() {
                if observed.iter().any(|gp| node.unassigned()[index].observes(*gp)) {
                    let var = node.variable_mut(index);
                    for gp in &observed {
                        report.removed_choices += var.remove_ground_point(*gp);
                    }
                }
            }
            report.removed_variables = node.evict_empty();
            Ok(report)
        }
    }

    fn two_satellites() -> Vec<Variable> {
        vec![
            Variable::new(1, 10, [("A", vec![1])]),
            Variable::new(2, 10, [("A", vec![2])]),
        ]
    }

    fn depth_first(variables: Vec<Variable>, reward: Arc<dyn RewardModel>) -> Planit {
        Planit::new(variables, reward).with_node_ranker(Arc::new(DepthFirst))
    }

    #[test]
    fn depth_first_reaches_success_in_two_expansions() {
        let mut planit = depth_first(two_satellites(), Rewards::uniform());
        let report = planit.solve_it().unwrap();
        assert_eq!(report.status, SearchStatus::Success);
        assert_eq!(report.stats.expansions, 2);
        assert_eq!(report.plan.len(), 2);
        assert_eq!(report.observed, BTreeSet::from([1, 2]));
        assert!((report.plan_reward - 2.0).abs() < 1e-9);
    }

    #[test]
    fn lean_nodes_rebuild_the_same_plan() {
        let mut planit = depth_first(two_satellites(), Rewards::uniform()).with_config(
            SearchConfig {
                store_plan_traces: false,
                ..SearchConfig::default()
            },
        );
        let report = planit.solve_it().unwrap();
        let node = planit.arena().node(report.node.unwrap()).unwrap();
        assert!(node.plan_trace().is_empty());
        let order: Vec<_> = report
            .plan
            .iter()
            .map(|step| step.variable.satellite())
            .collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn non_positive_choices_make_the_search_infeasible() {
        let reward = Rewards::with(&[(10, "A", 0.0)]);
        let mut planit = depth_first(two_satellites(), reward);
        let report = planit.solve_it().unwrap();
        assert_eq!(report.status, SearchStatus::Infeasible);
        assert!(report.plan.is_empty());
        assert!(report.observed.is_empty());
        assert_eq!(report.stats.pruned_non_positive, 2);
        assert_eq!(report.stats.dropped_variables, 2);
        assert_eq!(planit.arena().root().status(), NodeStatus::Exhausted);
    }

    #[test]
    fn negative_ranked_reward_is_fatal() {
        let reward = Rewards::with(&[(10, "A", -0.5)]);
        let mut planit = depth_first(two_satellites(), reward);
        assert!(matches!(
            planit.solve_it(),
            Err(PlanitError::NegativeReward { .. })
        ));
    }

    #[test]
    fn violated_constraint_fails_the_child() {
        let shallow = FnConstraint::new("max-depth-1", |node: &Node| node.depth() <= 1);
        let mut planit =
            depth_first(two_satellites(), Rewards::uniform()).with_constraint(Arc::new(shallow));
        let report = planit.solve_it().unwrap();
        assert_eq!(report.stats.failed, 1);
        let failed = planit
            .arena()
            .nodes()
            .find(|node| node.status() == NodeStatus::Failed)
            .unwrap();
        assert_eq!(failed.status_message(), Some("max-depth-1"));
        assert!(!planit.arena().open().contains(&failed.id()));
        // the depth-1 node ran out of variables after its child failed
        assert_eq!(report.status, SearchStatus::Success);
        assert_eq!(report.plan.len(), 1);
    }

    #[test]
    fn unbounded_choice_beam_exhausts_the_parent() {
        let vars = vec![Variable::new(
            1,
            10,
            [("A", vec![1]), ("B", vec![2]), ("C", vec![3])],
        )];
        let mut planit = Planit::new(vars, Rewards::uniform()).with_config(SearchConfig {
            choice_beam_width: None,
            ..SearchConfig::default()
        });
        let report = planit.solve_it().unwrap();
        assert_eq!(report.stats.children, 3);
        assert_eq!(report.stats.exhausted, 1);
        assert_eq!(planit.arena().root().status(), NodeStatus::Exhausted);
        assert_eq!(planit.arena().successes().len(), 3);
        assert_eq!(report.node, Some(1));
    }

    #[test]
    fn limits_report_incomplete_with_best_node() {
        let mut planit = depth_first(two_satellites(), Rewards::uniform()).with_config(
            SearchConfig {
                max_expansions: Some(1),
                ..SearchConfig::default()
            },
        );
        let report = planit.solve_it().unwrap();
        assert_eq!(report.status, SearchStatus::Incomplete);
        assert_eq!(report.limit, Some(SearchLimit::ExpansionBudget));
        assert_eq!(report.node, Some(1));
        assert_eq!(report.plan.len(), 1);

        let mut timed = depth_first(two_satellites(), Rewards::uniform()).with_config(
            SearchConfig {
                time_limit: Some(Duration::ZERO),
                ..SearchConfig::default()
            },
        );
        let report = timed.solve_it().unwrap();
        assert_eq!(report.status, SearchStatus::Incomplete);
        assert_eq!(report.limit, Some(SearchLimit::TimeLimit));
        assert_eq!(report.node, Some(0));
        assert!(report.plan.is_empty());
    }

    #[test]
    fn incomplete_runs_never_report_a_failed_node() {
        let capped = FnConstraint::new("reward-cap", |node: &Node| node.plan_reward() <= 3.0);
        let mut planit = depth_first(two_satellites(), Rewards::with(&[(10, "A", 5.0)]))
            .with_constraint(Arc::new(capped))
            .with_config(SearchConfig {
                max_expansions: Some(1),
                ..SearchConfig::default()
            });
        let report = planit.solve_it().unwrap();
        assert_eq!(report.status, SearchStatus::Incomplete);
        assert_eq!(report.stats.failed, 1);
        let node = planit.arena().node(report.node.unwrap()).unwrap();
        assert_ne!(node.status(), NodeStatus::Failed);
        assert_eq!(report.node, Some(0));
        assert!(report.plan.is_empty());
    }

    #[test]
    fn random_beam_runs_keep_reward_and_uniqueness_invariants() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut vars = Vec::new();
            let mut entries = Vec::new();
            for sat in 1..=3 {
                for tick in (0..50).step_by(10) {
                    let choices: Vec<(String, Vec<u64>)> = (0..rng.gen_range(1..4))
                        .map(|c| {
                            let gps: BTreeSet<u64> =
                                (0..rng.gen_range(1..3)).map(|_| rng.gen_range(0..8)).collect();
                            (format!("C{sat}{c}"), gps.into_iter().collect())
                        })
                        .collect();
                    for (command, _) in &choices {
                        entries.push((tick, command.clone(), rng.gen_range(0.1..2.0)));
                    }
                    vars.push(Variable::new(sat, tick, choices));
                }
            }
            let table: Vec<(Tick, &str, f64)> = entries
                .iter()
                .map(|(tick, command, reward)| (*tick, command.as_str(), *reward))
                .collect();
            let mut planit = Planit::new(vars, Rewards::with(&table))
                .with_propagator(Arc::new(DropObserved))
                .with_config(SearchConfig {
                    node_beam_width: 3,
                    choice_beam_width: Some(2),
                    ..SearchConfig::default()
                });
            let report = planit.solve_it().unwrap();
            assert_eq!(report.status, SearchStatus::Success);

            for node in planit.arena().nodes() {
                if let Some(parent) = node.parent() {
                    let parent = planit.arena().node(parent).unwrap();
                    let expected = parent.plan_reward() + node.choice_reward();
                    assert!((node.plan_reward() - expected).abs() < 1e-9);
                }
            }
            let mut seen = BTreeSet::new();
            for step in &report.plan {
                for gp in &step.variable.assignment().unwrap().ground_points {
                    assert!(seen.insert(*gp), "ground point {gp} observed twice");
                }
            }
            assert_eq!(seen, report.observed);
        }
    }
}
