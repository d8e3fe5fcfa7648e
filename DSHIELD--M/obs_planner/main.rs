use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use planit::{
    BeamByReward, DepthFirst, FirstVariable, GroundPointId, NodeRanker, Planit, SatelliteId,
    SearchTelemetry, Tick, Variable,
};
use serde::Serialize;
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    command::CommandCatalog,
    config::{PlannerDocument, PlannerSettings, Strategy, TelemetrySettings},
    ground::{reward::ErrorReductionReward, GroundRegistry},
    inputs::Scenario,
    propagate::{DuplicateObservations, SlewFeasibility},
    report::{BuildStats, PlanReport},
    slew::SlewTable,
};

/// Module name stamped on planner telemetry.
pub const TELEMETRY_MODULE: &str = "obs_planner";

/// Result of validating inputs without searching.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    /// Configured satellites.
    pub satellites: Vec<SatelliteId>,
    /// Ground points declared by the scenario.
    pub ground_points: usize,
    /// Distinct command labels.
    pub commands: usize,
    /// Distinct pointing angles.
    pub angles: usize,
    /// Entries in the slew table.
    pub slew_entries: usize,
    /// Distinct ground points named by any access event.
    pub referenced_ground_points: usize,
    /// Ground points with no access tick at all.
    pub unreachable_ground_points: usize,
    /// Biome categories with a measurement error table.
    pub error_categories: Vec<u8>,
    /// Variable construction counters.
    pub build: BuildStats,
}

/// Loads inputs, builds the root variables and runs the search.
pub struct ObsPlanner {
    settings: PlannerSettings,
    scenario: Scenario,
    telemetry: Option<SearchTelemetry>,
}

struct PreparedRun {
    ground: Arc<GroundRegistry>,
    catalog: Arc<CommandCatalog>,
    slew: Arc<SlewTable>,
    reward: Arc<ErrorReductionReward>,
    categories: Vec<u8>,
    variables: Vec<Variable>,
    build: BuildStats,
}

impl ObsPlanner {
    /// Creates a planner over an already loaded scenario.
    #[must_use]
    pub const fn new(settings: PlannerSettings, scenario: Scenario) -> Self {
        Self {
            settings,
            scenario,
            telemetry: None,
        }
    }

    /// Loads the TOML document at `path`, its scenario and its telemetry sinks.
    pub fn from_config(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = PlannerDocument::load(path)?;
        let scenario = Scenario::load(&document.scenario)
            .with_context(|| format!("loading scenario for {}", path.display()))?;
        let telemetry = build_telemetry(&document.telemetry)
            .with_context(|| format!("configuring telemetry for {}", path.display()))?;
        Ok(Self {
            settings: document.planner,
            scenario,
            telemetry,
        })
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SearchTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Planner settings.
    #[must_use]
    pub const fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Mutable settings, for command-line overrides.
    pub fn settings_mut(&mut self) -> &mut PlannerSettings {
        &mut self.settings
    }

    /// Loaded scenario.
    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Validates the inputs and builds the variables without searching.
    pub fn check(&self) -> Result<CheckSummary> {
        let run = self.prepare()?;
        Ok(CheckSummary {
            satellites: self.settings.satellites.clone(),
            ground_points: run.ground.len(),
            commands: run.catalog.len(),
            angles: run.catalog.angles().len(),
            slew_entries: run.slew.len(),
            referenced_ground_points: self.scenario.referenced_ground_points().len(),
            unreachable_ground_points: run
                .ground
                .iter()
                .filter(|point| point.access_ticks.is_empty())
                .count(),
            error_categories: run.categories,
            build: run.build,
        })
    }

    /// Runs the search and reports the plan.
    pub fn plan(&self) -> Result<PlanReport> {
        let PreparedRun {
            ground,
            catalog,
            slew,
            reward,
            variables,
            mut build,
            ..
        } = self.prepare()?;

        let node_ranker: Arc<dyn NodeRanker> = match self.settings.strategy {
            Strategy::DepthFirst => Arc::new(DepthFirst),
            Strategy::Beam { .. } => Arc::new(BeamByReward),
        };
        let duplicates = Arc::new(DuplicateObservations::new(Arc::clone(&ground)));
        let mut planit = Planit::new(variables, reward.clone())
            .with_config(self.settings.search_config())
            .with_node_ranker(node_ranker)
            .with_variable_selector(Arc::new(FirstVariable))
            .with_value_ranker(self.settings.value_ranking.ranker(Arc::clone(&reward)))
            .with_propagator(duplicates.clone())
            .with_propagator(Arc::new(SlewFeasibility::new(slew, catalog)));
        if let Some(telemetry) = &self.telemetry {
            planit = planit.with_telemetry(telemetry.clone());
        }

        let prior: Vec<GroundPointId> = self
            .scenario
            .prior_observations
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let removed = duplicates.eliminate(planit.arena_mut().root_mut(), &prior, None);
        build.prior_observations = prior.len();
        build.prior_choices_removed = removed.removed_choices;
        build.prior_variables_removed = removed.removed_variables;
        self.milestone(
            LogLevel::Info,
            "obs_planner.prior.removed",
            json!({
                "ground_points": prior.len(),
                "choices": removed.removed_choices,
                "variables": removed.removed_variables,
            }),
        );

        let search = planit.solve_it().context("searching for an observation plan")?;
        let report = PlanReport::new(&search, &reward, build);
        self.milestone(LogLevel::Info, "obs_planner.plan.ready", report.summary());
        Ok(report)
    }

    fn prepare(&self) -> Result<PreparedRun> {
        let inputs = self.scenario.prepare().context("validating scenario")?;
        let ground = Arc::new(inputs.ground);
        let catalog = Arc::new(inputs.catalog);
        let categories = inputs.tables.categories().collect();
        let reward = Arc::new(ErrorReductionReward::new(
            Arc::clone(&ground),
            inputs.tables,
            Arc::clone(&catalog),
            self.telemetry.clone(),
        ));
        let (variables, build) = self.build_variables(&reward);
        self.milestone(
            LogLevel::Info,
            "obs_planner.variables.built",
            serde_json::to_value(build)?,
        );
        Ok(PreparedRun {
            ground,
            catalog,
            slew: Arc::new(inputs.slew),
            reward,
            categories,
            variables,
            build,
        })
    }

    /// One variable per configured satellite and in-horizon tick, keeping only ground
    /// points with a positive error reduction.
    fn build_variables(&self, reward: &ErrorReductionReward) -> (Vec<Variable>, BuildStats) {
        let mut stats = BuildStats::default();
        let mut merged: BTreeMap<(Tick, SatelliteId), IndexMap<String, Vec<GroundPointId>>> =
            BTreeMap::new();
        for (&satellite, events) in &self.scenario.events {
            if !self.settings.satellites.contains(&satellite) {
                stats.events_unconfigured += events.len();
                continue;
            }
            for event in events {
                stats.events += 1;
                if !self.settings.in_horizon(event.tick) {
                    stats.events_outside_horizon += 1;
                    continue;
                }
                let choices = merged.entry((event.tick, satellite)).or_default();
                for (label, ground_points) in &event.choices {
                    let entry = choices.entry(label.clone()).or_default();
                    for &gp in ground_points {
                        if !entry.contains(&gp) {
                            entry.push(gp);
                        }
                    }
                }
            }
        }

        let mut variables = Vec::with_capacity(merged.len());
        let mut reachable = BTreeSet::new();
        for ((tick, satellite), mut choices) in merged {
            choices.retain(|label, ground_points| {
                let Some(command) = reward.command(label) else {
                    stats.ground_points_filtered += ground_points.len();
                    stats.commands_filtered += 1;
                    return false;
                };
                let before = ground_points.len();
                ground_points.retain(|gp| reward.ground_point_reward(*gp, tick, &command) > 0.0);
                stats.ground_points_filtered += before - ground_points.len();
                if ground_points.is_empty() {
                    stats.commands_filtered += 1;
                    return false;
                }
                true
            });
            if choices.is_empty() {
                stats.ticks_filtered += 1;
                continue;
            }
            reachable.extend(choices.values().flatten().copied());
            variables.push(Variable::new(satellite, tick, choices));
        }
        stats.variables = variables.len();
        stats.horizon_ground_points = reachable.len();
        (variables, stats)
    }

    fn milestone(&self, level: LogLevel, name: &str, payload: serde_json::Value) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.milestone(level, name, payload);
        }
    }
}

/// Builds telemetry from the configured sinks; `None` when no sink is set.
pub fn build_telemetry(settings: &TelemetrySettings) -> Result<Option<SearchTelemetry>> {
    if settings.log_path.is_none() && settings.event_log.is_none() {
        return Ok(None);
    }
    let mut builder = SearchTelemetry::builder(TELEMETRY_MODULE).min_level(settings.min_level);
    if let Some(path) = &settings.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &settings.event_log {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build().map(Some)
}
