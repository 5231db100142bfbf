//! Configuration module
//!
//! Loading and validation of the `smartcross` YAML configuration: heuristic
//! constants, clearance mode, simulation and server settings, and
//! user-defined scenarios.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
