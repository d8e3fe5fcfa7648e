use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use planit::{
    GroundPointId, NodeId, SatelliteId, SearchLimit, SearchReport, SearchStats, SearchStatus,
    Tick,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ground::{
    model_hour,
    reward::{AnomalyKind, ErrorReductionReward},
};

/// Counters from turning access events into variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Access events of the configured satellites.
    pub events: usize,
    /// Events outside the horizon or past `max_tick`.
    pub events_outside_horizon: usize,
    /// Events of satellites not in the configuration.
    pub events_unconfigured: usize,
    /// Ground points removed from a command for non-positive reward.
    pub ground_points_filtered: usize,
    /// Commands left without ground points.
    pub commands_filtered: usize,
    /// Ticks left without commands.
    pub ticks_filtered: usize,
    /// Variables handed to the search.
    pub variables: usize,
    /// Distinct ground points reachable by the variables.
    pub horizon_ground_points: usize,
    /// Ground points already observed before this horizon.
    pub prior_observations: usize,
    /// Commands removed from the root for prior observations.
    pub prior_choices_removed: usize,
    /// Root variables evicted for prior observations.
    pub prior_variables_removed: usize,
}

/// One committed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStep {
    /// Node created by the commitment.
    pub node: NodeId,
    /// Node it branched from.
    pub parent: NodeId,
    /// Observing satellite.
    pub satellite: SatelliteId,
    /// Tick of the observation.
    pub tick: Tick,
    /// Model hour whose prior error the observation reduces.
    pub model_hour: u32,
    /// Command label.
    pub command: String,
    /// Ground points observed.
    pub ground_points: Vec<GroundPointId>,
    /// Error reduction of the commitment.
    pub reward: f64,
}

/// Serializable outcome of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Outcome class.
    pub status: SearchStatus,
    /// Limit that stopped an incomplete run.
    pub limit: Option<SearchLimit>,
    /// Committed observations in plan order.
    pub steps: Vec<ReportStep>,
    /// Distinct ground points observed by the plan.
    pub observed: Vec<GroundPointId>,
    /// Summed error reduction.
    pub plan_reward: f64,
    /// Distinct ground points reachable in the horizon.
    pub horizon_ground_points: usize,
    /// Observed share of `horizon_ground_points`, in percent.
    pub coverage_percent: f64,
    /// Mean prior model error of the observed points.
    pub mean_initial_error: Option<f64>,
    /// Mean measurement error of the observed points after the plan.
    pub mean_final_error: Option<f64>,
    /// Variable construction counters.
    pub build: BuildStats,
    /// Search counters.
    pub search: SearchStats,
    /// Reward lookups that fell back or failed.
    pub anomalies: BTreeMap<AnomalyKind, usize>,
}

impl PlanReport {
    /// Builds the report for `search`, scoring observed points with `reward`.
    #[must_use]
    pub fn new(search: &SearchReport, reward: &ErrorReductionReward, build: BuildStats) -> Self {
        let anomalies = reward.anomalies();
        let mut initial = Vec::new();
        let mut measured = Vec::new();
        let steps = search
            .plan
            .iter()
            .filter_map(|step| {
                let assignment = step.variable.assignment()?;
                let tick = step.variable.tick();
                if let Some(command) = reward.command(&assignment.command) {
                    for &gp in &assignment.ground_points {
                        initial.extend(reward.prior_error(gp, tick));
                        measured.extend(reward.measurement_error(gp, &command));
                    }
                }
                Some(ReportStep {
                    node: step.node,
                    parent: step.parent,
                    satellite: step.variable.satellite(),
                    tick,
                    model_hour: model_hour(tick),
                    command: assignment.command.clone(),
                    ground_points: assignment.ground_points.clone(),
                    reward: assignment.reward,
                })
            })
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let coverage_percent = if build.horizon_ground_points == 0 {
            0.0
        } else {
            search.observed.len() as f64 * 100.0 / build.horizon_ground_points as f64
        };
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            status: search.status,
            limit: search.limit,
            steps,
            observed: search.observed.iter().copied().collect(),
            plan_reward: search.plan_reward,
            horizon_ground_points: build.horizon_ground_points,
            coverage_percent,
            mean_initial_error: mean(&initial),
            mean_final_error: mean(&measured),
            build,
            search: search.stats,
            anomalies,
        }
    }

    /// Compact JSON for telemetry and the CLI.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "run_id": self.run_id,
            "status": self.status,
            "limit": self.limit,
            "steps": self.steps.len(),
            "observed": self.observed.len(),
            "plan_reward": self.plan_reward,
            "coverage_percent": self.coverage_percent,
            "mean_initial_error": self.mean_initial_error,
            "mean_final_error": self.mean_final_error,
            "expansions": self.search.expansions,
            "elapsed_ms": self.search.elapsed_ms,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
