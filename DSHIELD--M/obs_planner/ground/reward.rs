use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;
use planit::{GroundPointId, RewardModel, SearchTelemetry, Tick, Variable};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use super::{error_category, error_table::ErrorTables, GroundRegistry, FALLBACK_CATEGORY};
use crate::command::{Command, CommandCatalog};

/// Lookup problems tolerated by the reward model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Biome type without a category; the fallback category was used.
    UnknownBiome,
    /// Category without a loaded table; the fallback category was used.
    MissingCategory,
    /// No error row for the command's code pair; reward 0.
    MissingErrorRow,
    /// No model error for the tick's bucket; reward 0.
    MissingModelError,
    /// Ground point absent from the registry; reward 0.
    UnknownGroundPoint,
    /// Command label absent from the catalog; reward 0.
    UnknownCommand,
}

impl AnomalyKind {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownBiome => "unknown_biome",
            Self::MissingCategory => "missing_category",
            Self::MissingErrorRow => "missing_error_row",
            Self::MissingModelError => "missing_model_error",
            Self::UnknownGroundPoint => "unknown_ground_point",
            Self::UnknownCommand => "unknown_command",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reward = prior model error at the tick's bucket - measurement error of the
/// command, summed over the observed ground points.
pub struct ErrorReductionReward {
    ground: Arc<GroundRegistry>,
    tables: ErrorTables,
    catalog: Arc<CommandCatalog>,
    anomalies: Mutex<BTreeMap<AnomalyKind, usize>>,
    telemetry: Option<SearchTelemetry>,
}

impl fmt::Debug for ErrorReductionReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReductionReward")
            .field("ground_points", &self.ground.len())
            .field("anomalies", &*self.anomalies.lock())
            .finish_non_exhaustive()
    }
}

impl ErrorReductionReward {
    /// Creates the model.
    #[must_use]
    pub fn new(
        ground: Arc<GroundRegistry>,
        tables: ErrorTables,
        catalog: Arc<CommandCatalog>,
        telemetry: Option<SearchTelemetry>,
    ) -> Self {
        Self {
            ground,
            tables,
            catalog,
            anomalies: Mutex::new(BTreeMap::new()),
            telemetry,
        }
    }

    /// Ground points the model evaluates.
    #[must_use]
    pub fn ground(&self) -> &GroundRegistry {
        &self.ground
    }

    /// Parsed command of `label`, recording an anomaly when unknown.
    #[must_use]
    pub fn command(&self, label: &str) -> Option<Command> {
        let command = self.catalog.get(label).copied();
        if command.is_none() {
            self.record(AnomalyKind::UnknownCommand, json!({ "command": label }));
        }
        command
    }

    /// Measurement error of observing `ground_point` with `command`.
    #[must_use]
    pub fn measurement_error(&self, ground_point: GroundPointId, command: &Command) -> Option<f64> {
        let Some(point) = self.ground.get(ground_point) else {
            self.record(
                AnomalyKind::UnknownGroundPoint,
                json!({ "ground_point": ground_point }),
            );
            return None;
        };
        let category = error_category(point.biome).unwrap_or_else(|| {
            self.record(
                AnomalyKind::UnknownBiome,
                json!({ "ground_point": ground_point, "biome": point.biome }),
            );
            FALLBACK_CATEGORY
        });
        let table = match self.tables.category(category) {
            Some(table) => table,
            None => {
                self.record(
                    AnomalyKind::MissingCategory,
                    json!({ "ground_point": ground_point, "category": category }),
                );
                self.tables.category(FALLBACK_CATEGORY)?
            }
        };
        let row = command.error_row();
        let error = table.error(row);
        if error.is_none() {
            self.record(
                AnomalyKind::MissingErrorRow,
                json!({ "category": category, "l_code": row.0, "p_code": row.1 }),
            );
        }
        error
    }

    /// Model error of `ground_point` before observation at `tick`.
    ///
    /// Unknown points yield `None` without an anomaly; the measurement lookup
    /// records those.
    #[must_use]
    pub fn prior_error(&self, ground_point: GroundPointId, tick: Tick) -> Option<f64> {
        let point = self.ground.get(ground_point)?;
        let error = point.prior_error(tick);
        if error.is_none() {
            self.record(
                AnomalyKind::MissingModelError,
                json!({ "ground_point": ground_point, "tick": tick }),
            );
        }
        error
    }

    /// Error reduction of one ground point; 0 when either error is unknown.
    #[must_use]
    pub fn ground_point_reward(
        &self,
        ground_point: GroundPointId,
        tick: Tick,
        command: &Command,
    ) -> f64 {
        match (
            self.prior_error(ground_point, tick),
            self.measurement_error(ground_point, command),
        ) {
            (Some(prior), Some(measured)) => prior - measured,
            _ => 0.0,
        }
    }

    /// Summed error reduction of a command at `tick`.
    #[must_use]
    pub fn error_reduction(&self, tick: Tick, label: &str, ground_points: &[GroundPointId]) -> f64 {
        self.command(label).map_or(0.0, |command| {
            ground_points
                .iter()
                .map(|gp| self.ground_point_reward(*gp, tick, &command))
                .sum()
        })
    }

    /// Anomaly counts so far.
    #[must_use]
    pub fn anomalies(&self) -> BTreeMap<AnomalyKind, usize> {
        self.anomalies.lock().clone()
    }

    fn record(&self, kind: AnomalyKind, detail: serde_json::Value) {
        let first = {
            let mut anomalies = self.anomalies.lock();
            let count = anomalies.entry(kind).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            if let Some(telemetry) = &self.telemetry {
                telemetry.milestone(
                    LogLevel::Warn,
                    "obs_planner.reward.anomaly",
                    json!({ "kind": kind, "detail": detail }),
                );
            }
        }
    }
}

impl RewardModel for ErrorReductionReward {
    fn command_reward(
        &self,
        variable: &Variable,
        command: &str,
        ground_points: &[GroundPointId],
    ) -> f64 {
        self.error_reduction(variable.tick(), command, ground_points)
    }
}
