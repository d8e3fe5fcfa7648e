use thiserror::Error;

use crate::{node::NodeId, variable::Tick};

/// Errors surfaced by the search engine.
///
/// Per-node outcomes (failed, exhausted) are statuses, not errors; everything here
/// aborts the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanitError {
    /// The command is not (or no longer) among the variable's choices.
    #[error("command `{command}` is not a current choice of {variable}")]
    InvalidChoice {
        /// Variable name (`s<sat>.<tick>`).
        variable: String,
        /// Requested command.
        command: String,
    },
    /// A variable may be committed only once.
    #[error("{variable} is already assigned")]
    AlreadyAssigned {
        /// Variable name.
        variable: String,
    },
    /// A ranked choice with negative reward survived upstream filtering.
    #[error("invariant violated: {variable} choice `{command}` has negative reward {reward}")]
    NegativeReward {
        /// Variable name.
        variable: String,
        /// Offending command.
        command: String,
        /// Reward reported by the value ranker.
        reward: f64,
    },
    /// A node id that the arena never allocated.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The selected variable vanished from the child copy.
    #[error("variable s{satellite}.{tick} missing from node {node}")]
    MissingVariable {
        /// Node being expanded.
        node: NodeId,
        /// Satellite of the missing variable.
        satellite: u32,
        /// Tick of the missing variable.
        tick: Tick,
    },
    /// A constraint propagator could not evaluate the commitment.
    #[error("propagator {propagator} failed: {message}")]
    Propagation {
        /// Propagator name.
        propagator: String,
        /// Failure description.
        message: String,
    },
}
