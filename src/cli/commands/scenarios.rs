//! Scenarios command handlers
//!
//! Implements `scenarios list` and `scenarios show`.

use std::fmt::Write as _;

use crate::cli::args::{OutputFormat, ScenariosListArgs, ScenariosShowArgs};
use crate::error::SmartcrossError;
use crate::scenarios;

/// List available built-in scenarios.
///
/// # Errors
///
/// Returns an error if an embedded scenario fails to parse or output
/// serialization fails.
pub fn list(args: &ScenariosListArgs) -> Result<(), SmartcrossError> {
    let results = scenarios::list_scenarios(args.tag.as_deref());

    match args.format {
        OutputFormat::Json => {
            let mut entries = Vec::with_capacity(results.len());
            for s in &results {
                let def = s.definition()?;
                entries.push(serde_json::json!({
                    "name": s.name,
                    "description": s.description,
                    "tags": s.tags,
                    "congestion": def.congestion,
                    "loop_s": def.loop_s,
                    "segments": def.timeline.len(),
                }));
            }
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Human => {
            if results.is_empty() {
                println!("No scenarios match the given filters.");
                return Ok(());
            }

            println!("Built-in Scenarios ({} available)\n", results.len());
            for s in &results {
                let tags = format!("[{}]", s.tags.join(", "));
                println!("  {:<12}{:<72}{tags}", s.name, s.description);
            }
            println!();
            println!("Run a scenario: smartcross simulate --scenario <name>");
            println!("View YAML:      smartcross scenarios show <name>");
        }
    }

    Ok(())
}

/// Print the YAML of a built-in scenario, suitable for piping into a
/// configuration file.
///
/// # Errors
///
/// Returns a usage error if the scenario name is not found.
pub fn show(args: &ScenariosShowArgs) -> Result<(), SmartcrossError> {
    let scenario = scenarios::find_scenario(&args.name).ok_or_else(|| {
        let mut message = format!("unknown scenario '{}'", args.name);

        if let Some(suggestion) = scenarios::suggest_scenario(&args.name) {
            let _ = write!(message, "\n\nDid you mean '{suggestion}'?");
        }

        message.push_str("\n\nAvailable scenarios:");
        for name in scenarios::list_scenario_names() {
            if let Some(s) = scenarios::find_scenario(name) {
                let _ = write!(message, "\n  {:<12}{}", s.name, s.description);
            }
        }
        SmartcrossError::Usage(message)
    })?;

    print!("{}", scenario.yaml);
    Ok(())
}
