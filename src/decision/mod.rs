//! Scheduling decisions: wire types, the pure heuristic, and the sources
//! (local or remote) that produce them.

pub mod heuristic;
pub mod request;
pub mod source;

pub use heuristic::{OutflowFlags, decide, fallback, outflow_flags};
pub use request::{DecisionOrigin, DecisionRequest, DecisionResult};
pub use source::{DecisionSource, LocalSource, RemoteSource, Resolution, resolve_with_fallback};
