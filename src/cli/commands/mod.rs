//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler, and holds
//! the configuration plumbing the handlers share.

pub mod decide;
pub mod scenarios;
pub mod serve;
pub mod simulate;
pub mod validate;
pub mod version;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, DecisionArgs, ScenariosSubcommand};
use crate::config::loader::{ConfigLimits, ConfigLoader, LoaderOptions};
use crate::config::schema::SmartcrossConfig;
use crate::config::validation::Validator;
use crate::decision::{DecisionSource, LocalSource, RemoteSource};
use crate::error::{ConfigError, SmartcrossError, ValidationIssue};
use crate::traffic::score::{ScoreCache, ScoreSource, TrafficScoreClient};

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), SmartcrossError> {
    match cli.command {
        Commands::Serve(args) => serve::run(&args, cancel).await,
        Commands::Simulate(args) => simulate::run(&args, cancel).await,
        Commands::Decide(args) => decide::run(&args),
        Commands::Scenarios(cmd) => match cmd.subcommand {
            ScenariosSubcommand::List(args) => scenarios::list(&args),
            ScenariosSubcommand::Show(args) => scenarios::show(&args),
        },
        Commands::Validate(args) => validate::run(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Loads `path`, or the defaults when no file is given.
///
/// Warnings are reported by [`check_effective`] once command-line overrides
/// are applied.
///
/// # Errors
///
/// Returns a config error if loading or validation fails.
pub fn load_config(path: Option<&Path>) -> Result<SmartcrossConfig, SmartcrossError> {
    let Some(path) = path else {
        return Ok(SmartcrossConfig::default());
    };
    tracing::info!(config = %path.display(), "loading configuration");
    let loader = ConfigLoader::new(LoaderOptions::default());
    let load_result = loader.load(path)?;
    Ok(Arc::unwrap_or_clone(load_result.config))
}

/// Validates the configuration after command-line overrides, logging every
/// warning.
///
/// # Errors
///
/// Returns a config error if an override made the configuration invalid.
pub fn check_effective(config: &SmartcrossConfig) -> Result<(), SmartcrossError> {
    for warning in effective_warnings(config)? {
        tracing::warn!(location = %warning.path, "{}", warning.message);
    }
    Ok(())
}

fn effective_warnings(config: &SmartcrossConfig) -> Result<Vec<ValidationIssue>, ConfigError> {
    let result = Validator::new().validate(config, &ConfigLimits::default());
    if result.has_errors() {
        return Err(ConfigError::ValidationError {
            path: "command line".to_string(),
            errors: result.errors,
        });
    }
    Ok(result.warnings)
}

/// Applies decision flags on top of the loaded configuration.
fn apply_decision_args(config: &mut SmartcrossConfig, args: &DecisionArgs) {
    if let Some(url) = &args.decision_url {
        config.decision.url = Some(url.clone());
    }
    if let Some(timeout) = args.decision_timeout {
        config.decision.timeout_ms = duration_ms(timeout);
    }
    if let Some(tie_break) = args.tie_break {
        config.tie_break = tie_break;
    }
}

/// Builds the configured decision source.
///
/// # Errors
///
/// Returns a decision error if the HTTP client cannot be built.
pub fn decision_source(
    config: &SmartcrossConfig,
) -> Result<Arc<dyn DecisionSource>, SmartcrossError> {
    Ok(match &config.decision.url {
        Some(url) => {
            tracing::info!(%url, timeout_ms = config.decision.timeout_ms, "using remote decision service");
            Arc::new(RemoteSource::new(
                url.clone(),
                Duration::from_millis(config.decision.timeout_ms),
            )?)
        }
        None => Arc::new(LocalSource::new(config.timing.clone(), config.tie_break)),
    })
}

/// Builds the congestion score source the simulation reads.
///
/// # Errors
///
/// Returns a decision error if the HTTP client cannot be built.
pub fn score_source(
    config: &SmartcrossConfig,
    cache: &Arc<ScoreCache>,
) -> Result<ScoreSource, SmartcrossError> {
    Ok(match &config.traffic_score.url {
        Some(url) => ScoreSource::Remote(TrafficScoreClient::new(
            url.clone(),
            Duration::from_millis(config.traffic_score.timeout_ms),
        )?),
        None => ScoreSource::Local(Arc::clone(cache)),
    })
}

/// Maps an unknown scenario onto a usage error; other errors pass through.
fn usage_on_unknown_scenario(err: ConfigError) -> SmartcrossError {
    match err {
        e @ ConfigError::UnknownScenario { .. } => {
            let mut message = e.to_string();
            message.push_str("\n\nUse 'smartcross scenarios list' to see available scenarios.");
            SmartcrossError::Usage(message)
        }
        other => other.into(),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
