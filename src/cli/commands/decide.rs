//! `decide` command
//!
//! Runs the heuristic once on a JSON snapshot, the same body `POST
//! /api/decision` accepts, and prints the result.

use std::io::Read;
use std::path::Path;

use super::load_config;
use crate::cli::args::DecideArgs;
use crate::decision::{DecisionRequest, decide};
use crate::error::SmartcrossError;

/// Compute and print one decision.
///
/// # Errors
///
/// Returns an I/O error if the input cannot be read, or a usage error if it
/// is not a JSON object.
pub fn run(args: &DecideArgs) -> Result<(), SmartcrossError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(tie_break) = args.tie_break {
        config.tie_break = tie_break;
    }

    let raw = read_input(args.input.as_deref())?;
    let request: DecisionRequest = serde_json::from_str(&raw)
        .map_err(|e| SmartcrossError::Usage(format!("invalid decision request: {e}")))?;

    let result = decide(&request, &config.timing, config.tie_break);
    tracing::debug!(reason = %result.reason, "computed decision");

    let out = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{out}");
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String, SmartcrossError> {
    match path {
        Some(p) if p != Path::new("-") => {
            if !p.exists() {
                return Err(SmartcrossError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("file not found: {}", p.display()),
                )));
            }
            Ok(std::fs::read_to_string(p)?)
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}
