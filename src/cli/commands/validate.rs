//! `validate` command

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::{ConfigLoader, LoaderOptions};
use crate::error::{ConfigError, Severity, SmartcrossError, ValidationIssue};

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validate configuration files without running anything.
///
/// Every file is checked; the first failure is returned after all reports
/// are printed.
///
/// # Errors
///
/// Returns a config error if any file fails to load or validate, or if
/// `--strict` is set and any file has warnings.
pub fn run(args: &ValidateArgs) -> Result<(), SmartcrossError> {
    let loader = ConfigLoader::new(LoaderOptions::default());
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let file = path.display().to_string();

        let report = match loader.load(path) {
            Ok(result) => {
                let warnings: Vec<String> = result
                    .warnings
                    .iter()
                    .map(|w| match &w.location {
                        Some(loc) => format!("{} at {loc}", w.message),
                        None => w.message.clone(),
                    })
                    .collect();
                let valid = !(args.strict && !warnings.is_empty());
                if !valid && first_error.is_none() {
                    first_error = Some(ConfigError::ValidationError {
                        path: file.clone(),
                        errors: result
                            .warnings
                            .iter()
                            .map(|w| ValidationIssue {
                                path: w.location.clone().unwrap_or_default(),
                                message: w.message.clone(),
                                severity: Severity::Error,
                            })
                            .collect(),
                    });
                }
                FileReport {
                    file,
                    valid,
                    errors: Vec::new(),
                    warnings,
                }
            }
            Err(e) => {
                let errors = match &e {
                    ConfigError::ValidationError { errors, .. } => {
                        errors.iter().map(ToString::to_string).collect()
                    }
                    other => vec![other.to_string()],
                };
                if first_error.is_none() {
                    first_error = Some(e);
                }
                FileReport {
                    file,
                    valid: false,
                    errors,
                    warnings: Vec::new(),
                }
            }
        };
        reports.push(report);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Human => {
            for report in &reports {
                let mark = if report.valid { "ok  " } else { "FAIL" };
                println!("{mark} {}", report.file);
                for e in &report.errors {
                    println!("       {e}");
                }
                for w in &report.warnings {
                    println!("       warning: {w}");
                }
            }
        }
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}
