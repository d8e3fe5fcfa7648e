#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! DSHIELD observation planner: turns satellite access events into a schedule of
//! soil-moisture observations that maximizes model error reduction, on top of the
//! `planit` search engine.

/// Command labels and their catalog.
#[path = "../command.rs"]
pub mod command;

/// TOML planner configuration.
#[path = "../config.rs"]
pub mod config;

/// Ground points and the error-reduction reward model.
#[path = "../ground/main.rs"]
pub mod ground;

/// Value-ranking heuristics.
#[path = "../heuristics/main.rs"]
pub mod heuristics;

/// Scenario loading and validation.
#[path = "../inputs.rs"]
pub mod inputs;

/// Constraint propagators.
#[path = "../propagate/main.rs"]
pub mod propagate;

/// Plan report.
#[path = "../report.rs"]
pub mod report;

/// Slew durations between pointing angles.
#[path = "../slew.rs"]
pub mod slew;

/// Planner entry point wiring inputs, reward, heuristics and propagators.
#[path = "../main.rs"]
pub mod planner;

pub use command::{Angle, Command, CommandCatalog, CommandError, Observation, Payload};
pub use config::{PlannerDocument, PlannerSettings, Strategy, TelemetrySettings};
pub use ground::{
    error_table::{ErrorRow, ErrorTable, ErrorTables},
    reward::{AnomalyKind, ErrorReductionReward},
    GroundPoint, GroundRegistry,
};
pub use heuristics::{MaxErrorReduction, MaxGroundPointCount, RankedChoiceVoting, ValueRanking};
pub use inputs::{AccessEvent, InputError, PreparedInputs, Scenario};
pub use planner::{build_telemetry, CheckSummary, ObsPlanner};
pub use propagate::{DuplicateObservations, SlewFeasibility};
pub use report::{BuildStats, PlanReport, ReportStep};
pub use slew::{SlewCost, SlewRow, SlewTable, REQUIRED_GAP};
