//! Signal phase state machine.
//!
//! - [`Phase`] / [`ClearanceStep`]: what the signal shows
//! - [`PhaseMachine`]: deadline-driven transitions and the decision boundary
//! - [`Transition`]: what changed on a step

pub mod machine;
pub mod state;

pub use machine::{ActiveGreen, PhaseMachine, score_target_ms};
pub use state::{ClearanceStep, OfferOutcome, Phase, SimTime, Transition};
