//! `serve` command
//!
//! Runs the HTTP service, optionally with a real-time simulation in the same
//! process.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{apply_decision_args, check_effective, decision_source, load_config, score_source, usage_on_unknown_scenario};
use crate::api::{self, AppState, parse_bind_addr};
use crate::cli::args::ServeArgs;
use crate::error::SmartcrossError;
use crate::observability::events::EventEmitter;
use crate::scenarios::ScenarioRegistry;
use crate::sim::{Pace, Simulation, SimulationOptions};
use crate::traffic::score::ScoreCache;

/// Start the HTTP service.
///
/// # Errors
///
/// Returns a config error if the configuration is invalid, a usage error for
/// an unknown scenario, or a server error if binding or serving fails.
pub async fn run(args: &ServeArgs, cancel: CancellationToken) -> Result<(), SmartcrossError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let mut config = load_config(args.config.as_deref())?;
    apply_decision_args(&mut config, &args.decision);
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(bind) = &args.bind {
        config.server.bind.clone_from(bind);
    }
    check_effective(&config)?;
    let config = Arc::new(config);

    let bind = parse_bind_addr(&config.server.bind)?;
    let registry = Arc::new(ScenarioRegistry::with_custom(&config.scenarios)?);
    let scores = Arc::new(ScoreCache::new(
        Duration::from_millis(config.traffic_score.cache_ttl_ms),
        config.simulation.seed,
    ));

    let sim_cancel = cancel.child_token();
    let (simulation, sim_task) = if args.simulate {
        let events = match &args.events_file {
            Some(path) => EventEmitter::from_file(path)?,
            None => EventEmitter::noop(),
        };
        let (sim, handle) = Simulation::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            decision_source(&config)?,
            Arc::new(score_source(&config, &scores)?),
            Arc::new(events),
            SimulationOptions {
                scenario: args.scenario.clone(),
                duration: None,
                pace: Pace::RealTime,
            },
        )
        .map_err(usage_on_unknown_scenario)?;
        (Some(handle), Some(tokio::spawn(sim.run(sim_cancel.clone()))))
    } else {
        (None, None)
    };

    let (listener, addr) = api::bind(&bind).await?;
    tracing::info!(%addr, simulate = args.simulate, "listening");

    let state = Arc::new(AppState {
        timing: config.timing.clone(),
        tie_break: config.tie_break,
        max_body_bytes: config.server.max_body_bytes,
        registry,
        scores,
        simulation,
    });
    let served = api::serve(listener, state, cancel).await;

    sim_cancel.cancel();
    if let Some(task) = sim_task {
        if let Ok(summary) = task.await {
            tracing::info!(
                greens = summary.greens,
                resets = summary.resets,
                "in-process simulation stopped"
            );
        }
    }
    served?;
    Ok(())
}
