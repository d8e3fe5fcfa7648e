//! Constraint propagators run on every child after its commitment.

/// One observation per ground point per horizon.
pub mod duplicates;
/// Same-satellite slew feasibility.
pub mod slew;

pub use duplicates::DuplicateObservations;
pub use slew::SlewFeasibility;
