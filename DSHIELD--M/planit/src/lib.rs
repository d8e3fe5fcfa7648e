#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Planit: a bounded beam / depth-first search over an arena of partial plans with
//! pluggable node ranking, variable selection, value ranking, propagation and reward
//! accumulation.

/// Search loop, expansion and run reports.
#[path = "../engine/main.rs"]
pub mod engine;

/// Fatal engine errors.
#[path = "../error.rs"]
pub mod error;

/// Nodes and the arena.
#[path = "../node/main.rs"]
pub mod node;

/// Strategy traits and default orderings.
#[path = "../strategy/main.rs"]
pub mod strategy;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Decision variables.
#[path = "../variable.rs"]
pub mod variable;

pub use engine::{Planit, SearchConfig, SearchLimit, SearchReport, SearchStats, SearchStatus};
pub use error::PlanitError;
pub use node::{Arena, Node, NodeId, NodeStatus, PlanStep};
pub use strategy::{
    ordering::{
        sort_by_reward, AdditiveReward, BeamByReward, DeclaredOrder, DepthFirst, FirstVariable,
        NoUnassigned,
    },
    ChoicePropagator, Constraint, FnConstraint, NodeRanker, PropagationReport, RankedChoice,
    RewardAccumulator, RewardModel, SuccessTest, ValueRanker, VariableSelector,
};
pub use telemetry::{SearchTelemetry, SearchTelemetryBuilder};
pub use variable::{Assignment, ChoiceSet, GroundPointId, SatelliteId, Tick, Variable};
