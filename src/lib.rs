//! `smartcross` - adaptive traffic-signal phase scheduler
//!
//! A four-approach intersection cycles through green and clearance phases.
//! At every green→clearance boundary a decision (local heuristic or remote
//! service) picks the next green axis and its duration; a failed or late
//! decision is replaced by a load-only fallback so the cycle never stalls.
//! The library also contains the arrival model and simulation loop used to
//! exercise the scheduler, plus the HTTP service that hosts the heuristic.

pub mod api;
pub mod cli;
pub mod config;
pub mod decision;
pub mod error;
pub mod observability;
pub mod phase;
pub mod scenarios;
pub mod sim;
pub mod traffic;
pub mod types;
