pub mod advisor;
pub mod calculations;
pub mod rules;
pub mod suppression;

pub use advisor::{AdvisorService, CycleOutcome};
pub use rules::DecisionEngine;
