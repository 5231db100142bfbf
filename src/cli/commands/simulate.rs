//! `simulate` command

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    apply_decision_args, check_effective, decision_source, duration_ms, load_config, score_source,
    usage_on_unknown_scenario,
};
use crate::cli::args::{OutputFormat, SimulateArgs};
use crate::error::SmartcrossError;
use crate::observability::events::{EventEmitter, RunSummary};
use crate::scenarios::ScenarioRegistry;
use crate::sim::{Pace, Simulation, SimulationOptions};
use crate::traffic::score::ScoreCache;

/// Run the simulation until `--duration` elapses or the process is
/// interrupted, then print the run summary.
///
/// # Errors
///
/// Returns a config error if the configuration is invalid, a usage error for
/// an unknown scenario, or an I/O error if the events file cannot be created.
pub async fn run(args: &SimulateArgs, cancel: CancellationToken) -> Result<(), SmartcrossError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let mut config = load_config(args.config.as_deref())?;
    apply_decision_args(&mut config, &args.decision);
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(tick) = args.tick {
        config.simulation.tick_ms = duration_ms(tick).max(1);
    }
    if let Some(url) = &args.traffic_url {
        config.traffic_score.url = Some(url.clone());
    }
    check_effective(&config)?;
    let config = Arc::new(config);

    let registry = Arc::new(ScenarioRegistry::with_custom(&config.scenarios)?);
    let cache = Arc::new(ScoreCache::new(
        Duration::from_millis(config.traffic_score.cache_ttl_ms),
        config.simulation.seed,
    ));
    let events = Arc::new(open_events(args.events_file.as_deref())?);

    let options = SimulationOptions {
        scenario: args.scenario.clone(),
        duration: args.duration,
        pace: if args.accelerated {
            Pace::Accelerated
        } else {
            Pace::RealTime
        },
    };
    let (sim, _handle) = Simulation::new(
        Arc::clone(&config),
        registry,
        decision_source(&config)?,
        Arc::new(score_source(&config, &cache)?),
        events,
        options,
    )
    .map_err(usage_on_unknown_scenario)?;

    let summary = sim.run(cancel).await;
    print_summary(&summary, args.format)
}

fn open_events(path: Option<&Path>) -> Result<EventEmitter, SmartcrossError> {
    Ok(match path {
        None => EventEmitter::noop(),
        Some(p) if p == Path::new("-") => EventEmitter::stdout(),
        Some(p) => EventEmitter::from_file(p)?,
    })
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<(), SmartcrossError> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Human => {
            #[allow(clippy::cast_precision_loss)]
            let seconds = summary.sim_time_ms as f64 / 1000.0;
            println!("Simulation {} ({})", summary.run_id, summary.scenario);
            println!("  simulated time   {seconds:.1}s");
            println!("  greens           {}", summary.greens);
            println!(
                "  decisions        {} local, {} remote, {} fallback, {} discarded",
                summary.local_decisions,
                summary.remote_decisions,
                summary.fallback_decisions,
                summary.discarded_decisions
            );
            println!(
                "  vehicles         {} arrived, {} departed",
                summary.arrivals, summary.departures
            );
            let q = &summary.final_queues;
            println!(
                "  final queues     N {} E {} S {} W {}",
                q.north, q.east, q.south, q.west
            );
            if summary.resets > 0 {
                println!("  resets           {}", summary.resets);
            }
        }
    }
    Ok(())
}
