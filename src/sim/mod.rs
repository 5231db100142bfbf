//! Intersection simulation.
//!
//! [`Intersection`] is the synchronous model advanced one tick at a time;
//! [`Simulation`] drives it from a tokio task and exposes a
//! [`SimulationHandle`] for the HTTP layer.

pub mod intersection;
pub mod runner;

pub use intersection::{Intersection, IntersectionSnapshot, TickOutcome};
pub use runner::{Control, Pace, Simulation, SimulationHandle, SimulationOptions};
