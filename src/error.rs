//! Error types for `smartcross`
//!
//! Domain errors are grouped per subsystem and aggregated into
//! [`SmartcrossError`], which maps every failure onto a process exit code.
//! None of the decision-core paths return these: the heuristic is total and
//! transport failures are absorbed by the local fallback.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `smartcross` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Transport error (bind failed, remote service unreachable)
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Usage error (invalid arguments, unknown scenario)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `smartcross` operations.
#[derive(Debug, Error)]
pub enum SmartcrossError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote decision service error that escaped the fallback path
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// HTTP service error
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SmartcrossError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Decision(_) | Self::Server(_) => ExitCode::TRANSPORT_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },

    /// Scenario id matches neither a built-in nor a configured scenario
    #[error("unknown scenario '{id}'{}", did_you_mean(.suggestion.as_deref()))]
    UnknownScenario {
        id: String,
        /// Closest known id, if any is near enough
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted path to the problematic field (e.g., `"timing.max_green_ms"`)
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the configuration from being used
    Error,
    /// Potential issue that does not prevent loading
    Warning,
}

// ============================================================================
// Decision Source Errors
// ============================================================================

/// Failures reaching or reading a remote decision service.
///
/// Every variant is recoverable: the simulation substitutes the local
/// load-only formula and keeps its phase schedule intact.
#[derive(Debug, Clone, Error)]
pub enum DecisionError {
    /// Connection refused, DNS failure, reset mid-request
    #[error("network error: {0}")]
    Network(String),

    /// Request did not complete within the configured bound
    #[error("decision request timed out after {0} ms")]
    Timeout(u64),

    /// Service answered with a non-2xx status
    #[error("decision service returned HTTP {0}")]
    HttpStatus(u16),

    /// Body could not be decoded as a decision
    #[error("invalid decision response: {0}")]
    InvalidResponse(String),
}

impl DecisionError {
    /// Short, fixed label used for metrics and event logs.
    #[must_use]
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::HttpStatus(_) => "http_status",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

// ============================================================================
// HTTP Service Errors
// ============================================================================

/// Errors starting or running the HTTP service.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("bind failed: {0}")]
    Bind(String),

    /// Address string could not be parsed
    #[error("invalid bind address \"{input}\": {reason}")]
    InvalidAddress {
        /// Raw user input
        input: String,
        /// Parser message
        reason: String,
    },

    /// Server loop exited with an error
    #[error("server error: {0}")]
    Serve(String),

    /// Control command sent after the simulation task ended
    #[error("simulation is not running")]
    SimulationStopped,
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `smartcross` operations.
pub type Result<T> = std::result::Result<T, SmartcrossError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::TRANSPORT_ERROR, 4);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: SmartcrossError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_decision_error_exit_code() {
        let err: SmartcrossError = DecisionError::Timeout(2000).into();
        assert_eq!(err.exit_code(), ExitCode::TRANSPORT_ERROR);
    }

    #[test]
    fn test_server_error_exit_code() {
        let err: SmartcrossError = ServerError::Bind("in use".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::TRANSPORT_ERROR);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = SmartcrossError::Usage("unknown scenario".to_string());
        assert_eq!(err.exit_code(), ExitCode::USAGE_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: SmartcrossError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_decision_error_causes() {
        assert_eq!(DecisionError::Network("x".into()).cause(), "network");
        assert_eq!(DecisionError::Timeout(1).cause(), "timeout");
        assert_eq!(DecisionError::HttpStatus(503).cause(), "http_status");
        assert_eq!(
            DecisionError::InvalidResponse("x".into()).cause(),
            "invalid_response"
        );
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "timing.min_green_ms".to_string(),
            message: "must be positive".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: must be positive at timing.min_green_ms"
        );
    }

    #[test]
    fn test_validation_error_lists_issues() {
        let err = ConfigError::ValidationError {
            path: "cfg.yaml".to_string(),
            errors: vec![ValidationIssue {
                path: "clearance.yellow_ms".to_string(),
                message: "must be positive".to_string(),
                severity: Severity::Error,
            }],
        };
        let text = err.to_string();
        assert!(text.contains("cfg.yaml"));
        assert!(text.contains("clearance.yellow_ms"));
    }

    #[test]
    fn test_unknown_scenario_display() {
        let err = ConfigError::UnknownScenario {
            id: "rsuh".to_string(),
            suggestion: Some("rush".to_string()),
        };
        assert_eq!(err.to_string(), "unknown scenario 'rsuh' (did you mean 'rush'?)");
        let err = ConfigError::UnknownScenario {
            id: "zzz".to_string(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown scenario 'zzz'");
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "DECISION_URL".to_string(),
            location: "decision.url".to_string(),
        };
        assert!(err.to_string().contains("DECISION_URL"));
        assert!(err.to_string().contains("decision.url"));
    }
}
