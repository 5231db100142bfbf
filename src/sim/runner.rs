//! Async simulation loop.
//!
//! A single task owns the [`Intersection`] and is its only mutator. Decision
//! calls and score refreshes run on spawned tasks and report back over one
//! channel, tagged with the epoch they were started in; a reset bumps the
//! epoch, so nothing from before the reset can reach the new intersection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::schema::{ScenarioDefinition, SmartcrossConfig};
use crate::decision::{DecisionRequest, DecisionSource, Resolution, resolve_with_fallback};
use crate::error::{ConfigError, ServerError, SmartcrossError};
use crate::observability::events::{Event, EventEmitter, RunSummary, StopReason};
use crate::observability::metrics;
use crate::phase::{Phase, Transition};
use crate::scenarios::ScenarioRegistry;
use crate::traffic::score::ScoreSource;

use super::intersection::{Intersection, IntersectionSnapshot, TickOutcome};

/// Capacity of the snapshot broadcast used by SSE subscribers.
const BROADCAST_CAPACITY: usize = 64;

/// Snapshots are broadcast on every transition and at least this often (ticks).
const BROADCAST_EVERY_TICKS: u64 = 5;

/// In accelerated mode, yield to the runtime this often (ticks).
const YIELD_EVERY_TICKS: u64 = 256;

/// Commands accepted by a running simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Replace the intersection; `None` keeps the current scenario.
    Reset { scenario: Option<String> },
}

/// How simulated time relates to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pace {
    /// One tick per `tick_ms` of wall time; decisions run concurrently.
    #[default]
    RealTime,
    /// Ticks back to back; each decision is awaited at its boundary.
    Accelerated,
}

/// Run parameters not covered by the configuration file.
#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    /// Starting scenario; the configured default when `None`.
    pub scenario: Option<String>,
    /// Stop after this much time (wall time in real time, simulated otherwise).
    pub duration: Option<Duration>,
    pub pace: Pace,
}

/// Cloneable access to a running simulation.
#[derive(Clone)]
pub struct SimulationHandle {
    control: mpsc::Sender<Control>,
    snapshot: watch::Receiver<IntersectionSnapshot>,
    updates: broadcast::Sender<IntersectionSnapshot>,
    registry: Arc<ScenarioRegistry>,
}

impl SimulationHandle {
    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> IntersectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Stream of state updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IntersectionSnapshot> {
        self.updates.subscribe()
    }

    /// Requests a reset, optionally into another scenario.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownScenario` for an unknown id and
    /// `ServerError::SimulationStopped` if the loop has ended.
    pub async fn reset(&self, scenario: Option<String>) -> Result<(), SmartcrossError> {
        if let Some(id) = &scenario {
            self.registry.resolve(id)?;
        }
        self.control
            .send(Control::Reset { scenario })
            .await
            .map_err(|_| ServerError::SimulationStopped)?;
        Ok(())
    }
}

/// Message from a spawned helper task back to the loop.
enum Inbound {
    Decision {
        epoch: u64,
        boundary: u64,
        resolution: Resolution,
    },
    Score {
        epoch: u64,
        score: u8,
    },
}

/// The simulation task.
pub struct Simulation {
    config: Arc<SmartcrossConfig>,
    registry: Arc<ScenarioRegistry>,
    source: Arc<dyn DecisionSource>,
    scores: Arc<ScoreSource>,
    events: Arc<EventEmitter>,
    options: SimulationOptions,

    scenario: ScenarioDefinition,
    intersection: Intersection,
    epoch: u64,
    ticks: u64,
    summary: RunSummary,
    decision_tasks: Vec<JoinHandle<()>>,
    score_task: Option<JoinHandle<()>>,

    control_rx: mpsc::Receiver<Control>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    snapshot_tx: watch::Sender<IntersectionSnapshot>,
    updates_tx: broadcast::Sender<IntersectionSnapshot>,
}

impl Simulation {
    /// Builds the simulation and a handle to control it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownScenario` if the starting scenario is
    /// not registered.
    pub fn new(
        config: Arc<SmartcrossConfig>,
        registry: Arc<ScenarioRegistry>,
        source: Arc<dyn DecisionSource>,
        scores: Arc<ScoreSource>,
        events: Arc<EventEmitter>,
        options: SimulationOptions,
    ) -> Result<(Self, SimulationHandle), ConfigError> {
        let scenario_id = options
            .scenario
            .clone()
            .unwrap_or_else(|| config.simulation.scenario.clone());
        let scenario = registry.resolve(&scenario_id)?.clone();
        let intersection = build_intersection(&config, &scenario);

        let snapshot = intersection.snapshot(0);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (updates_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(16);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let handle = SimulationHandle {
            control: control_tx,
            snapshot: snapshot_rx,
            updates: updates_tx.clone(),
            registry: Arc::clone(&registry),
        };

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            scenario: scenario.id.clone(),
            ..RunSummary::default()
        };

        let sim = Self {
            config,
            registry,
            source,
            scores,
            events,
            options,
            scenario,
            intersection,
            epoch: 0,
            ticks: 0,
            summary,
            decision_tasks: Vec::new(),
            score_task: None,
            control_rx,
            inbound_tx,
            inbound_rx,
            snapshot_tx,
            updates_tx,
        };
        Ok((sim, handle))
    }

    /// Runs until cancelled or until the configured duration elapses.
    pub async fn run(mut self, cancel: CancellationToken) -> RunSummary {
        info!(
            run_id = %self.summary.run_id,
            scenario = %self.scenario.id,
            source = %self.source.origin(),
            pace = ?self.options.pace,
            "simulation started"
        );
        self.events.emit(Event::SimulationStarted {
            timestamp: Utc::now(),
            run_id: self.summary.run_id,
            scenario: self.scenario.id.clone(),
            decision_source: self
                .config
                .decision
                .url
                .clone()
                .unwrap_or_else(|| "local".to_string()),
            seed: self.config.simulation.seed,
        });

        let reason = match self.options.pace {
            Pace::RealTime => self.run_realtime(&cancel).await,
            Pace::Accelerated => self.run_accelerated(&cancel).await,
        };
        self.finish(reason)
    }

    async fn run_realtime(&mut self, cancel: &CancellationToken) -> StopReason {
        let tick_ms = self.config.simulation.tick_ms.max(1);
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = self.options.duration.map(|d| Instant::now() + d);
        self.spawn_score_refresher();

        loop {
            tokio::select! {
                () = cancel.cancelled() => return StopReason::Cancelled,
                () = sleep_until_opt(deadline) => return StopReason::DurationElapsed,
                Some(control) = self.control_rx.recv() => self.handle_control(control),
                Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound),
                _ = interval.tick() => {
                    let outcome = self.tick(tick_ms);
                    for (boundary, request) in outcome.requests {
                        self.spawn_decision(boundary, request);
                    }
                }
            }
        }
    }

    async fn run_accelerated(&mut self, cancel: &CancellationToken) -> StopReason {
        let tick_ms = self.config.simulation.tick_ms.max(1);
        #[allow(clippy::cast_possible_truncation)]
        let limit_ms = self.options.duration.map(|d| d.as_millis() as u64);
        let refresh_ms = self.config.traffic_score.cache_ttl_ms.max(tick_ms);
        let mut next_refresh = 0;
        let timeout = Duration::from_millis(self.config.decision.timeout_ms);

        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            if limit_ms.is_some_and(|limit| self.intersection.now() >= limit) {
                return StopReason::DurationElapsed;
            }
            while let Ok(control) = self.control_rx.try_recv() {
                self.handle_control(control);
                next_refresh = 0;
            }
            if self.intersection.now() >= next_refresh {
                let score = self.scores.score(&self.scenario.id, self.scenario.congestion).await;
                self.intersection.set_congestion_score(score);
                next_refresh = self.intersection.now() + refresh_ms;
            }

            let outcome = self.tick(tick_ms);
            for (boundary, request) in outcome.requests {
                let resolution = resolve_with_fallback(
                    self.source.as_ref(),
                    &request,
                    &self.config.timing,
                    timeout,
                )
                .await;
                self.apply_decision(self.epoch, boundary, resolution);
            }

            if self.ticks % YIELD_EVERY_TICKS == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    fn tick(&mut self, tick_ms: u64) -> TickOutcome {
        let mut from = self.intersection.phase();
        let outcome = self.intersection.tick(tick_ms);
        self.ticks += 1;

        for transition in &outcome.transitions {
            let to = transition.phase();
            metrics::record_phase_transition(from.label(), to.label());
            from = to;
            self.record_transition(transition);
        }

        let changed = !outcome.transitions.is_empty();
        self.publish(changed || self.ticks % BROADCAST_EVERY_TICKS == 0);
        outcome
    }

    fn record_transition(&mut self, transition: &Transition) {
        self.events.emit(Event::PhaseEntered {
            timestamp: Utc::now(),
            sim_time_ms: transition.at(),
            phase: transition.phase().label(),
            ends_at_ms: transition.ends_at(),
        });

        if let Transition::GreenStarted {
            axis,
            boundary,
            decision,
            origin,
            at,
            ..
        } = transition
        {
            debug!(
                boundary,
                axis = %axis,
                green_ms = decision.green_ms,
                reason = %decision.reason,
                origin = %origin,
                "green started"
            );
            metrics::record_decision(*origin, &decision.reason);
            self.summary.greens += 1;
            self.summary.count_decision(*origin);
            self.events.emit(Event::DecisionApplied {
                timestamp: Utc::now(),
                sim_time_ms: *at,
                boundary: *boundary,
                axis: *axis,
                green_ms: decision.green_ms,
                reason: decision.reason.clone(),
                origin: *origin,
                queues: *self.intersection.queues(),
            });
        }
    }

    fn publish(&self, broadcast: bool) {
        let snapshot = self.intersection.snapshot(self.epoch);
        metrics::set_queue_lengths(&snapshot.counts);
        if broadcast {
            // No subscribers is not an error.
            let _ = self.updates_tx.send(snapshot.clone());
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    fn spawn_decision(&mut self, boundary: u64, request: DecisionRequest) {
        let source = Arc::clone(&self.source);
        let timing = self.config.timing.clone();
        let timeout = Duration::from_millis(self.config.decision.timeout_ms);
        let tx = self.inbound_tx.clone();
        let epoch = self.epoch;

        self.decision_tasks.retain(|t| !t.is_finished());
        self.decision_tasks.push(tokio::spawn(async move {
            let resolution = resolve_with_fallback(source.as_ref(), &request, &timing, timeout).await;
            let _ = tx
                .send(Inbound::Decision {
                    epoch,
                    boundary,
                    resolution,
                })
                .await;
        }));
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Decision {
                epoch,
                boundary,
                resolution,
            } => self.apply_decision(epoch, boundary, resolution),
            Inbound::Score { epoch, score } => {
                if epoch == self.epoch {
                    debug!(score, "congestion score updated");
                    self.intersection.set_congestion_score(score);
                }
            }
        }
    }

    fn apply_decision(&mut self, epoch: u64, boundary: u64, resolution: Resolution) {
        let why = if epoch == self.epoch {
            let outcome = self
                .intersection
                .offer(boundary, resolution.result, resolution.origin);
            if outcome.is_accepted() {
                debug!(boundary, origin = %resolution.origin, "decision accepted");
                return;
            }
            outcome.as_str()
        } else {
            "stale_epoch"
        };

        debug!(epoch, boundary, why, "decision discarded");
        metrics::record_decision_discarded(why);
        self.summary.discarded_decisions += 1;
        self.events.emit(Event::DecisionDiscarded {
            timestamp: Utc::now(),
            epoch,
            boundary,
            why,
        });
    }

    // ========================================================================
    // Control
    // ========================================================================

    fn handle_control(&mut self, control: Control) {
        let Control::Reset { scenario } = control;
        let id = scenario.unwrap_or_else(|| self.scenario.id.clone());
        let scenario = match self.registry.resolve(&id) {
            Ok(s) => s.clone(),
            Err(e) => {
                warn!(error = %e, "reset ignored");
                return;
            }
        };

        for task in self.decision_tasks.drain(..) {
            task.abort();
        }
        self.accumulate_totals();

        self.epoch += 1;
        self.summary.resets += 1;
        self.intersection = build_intersection(&self.config, &scenario);
        self.scenario = scenario;
        self.summary.scenario = self.scenario.id.clone();

        info!(epoch = self.epoch, scenario = %self.scenario.id, "simulation reset");
        metrics::record_reset(&self.scenario.id);
        self.events.emit(Event::SimulationReset {
            timestamp: Utc::now(),
            epoch: self.epoch,
            scenario: self.scenario.id.clone(),
        });

        if self.options.pace == Pace::RealTime {
            self.spawn_score_refresher();
        }
        self.publish(true);
    }

    fn spawn_score_refresher(&mut self) {
        if let Some(task) = self.score_task.take() {
            task.abort();
        }
        let scores = Arc::clone(&self.scores);
        let tx = self.inbound_tx.clone();
        let epoch = self.epoch;
        let id = self.scenario.id.clone();
        let baseline = self.scenario.congestion;
        let period = Duration::from_millis(self.config.traffic_score.cache_ttl_ms.max(100));

        self.score_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let score = scores.score(&id, baseline).await;
                if tx.send(Inbound::Score { epoch, score }).await.is_err() {
                    break;
                }
            }
        }));
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn accumulate_totals(&mut self) {
        let (arrived, departed) = self.intersection.totals();
        self.summary.arrivals += arrived;
        self.summary.departures += departed;
    }

    fn finish(mut self, reason: StopReason) -> RunSummary {
        for task in self.decision_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.score_task.take() {
            task.abort();
        }

        self.accumulate_totals();
        self.summary.sim_time_ms = self.intersection.now();
        self.summary.final_queues = *self.intersection.queues();
        self.publish(true);

        info!(
            reason = %reason,
            greens = self.summary.greens,
            fallbacks = self.summary.fallback_decisions,
            "simulation stopped"
        );
        self.events.emit(Event::SimulationStopped {
            timestamp: Utc::now(),
            reason,
            summary: self.summary.clone(),
        });
        self.summary
    }

    /// Current phase, for tests.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.intersection.phase()
    }
}

fn build_intersection(config: &SmartcrossConfig, scenario: &ScenarioDefinition) -> Intersection {
    Intersection::new(
        scenario,
        config.timing.clone(),
        config.clearance.clone(),
        &config.simulation,
    )
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
