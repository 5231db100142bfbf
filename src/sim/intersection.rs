//! One intersection: queues, waits, traffic and the signal controller.
//!
//! [`Intersection::advance`] is the only mutator. Per tick it accumulates
//! red waits, applies arrivals and departures, then steps the phase machine
//! until it has caught up with the tick's end time.

use serde::Serialize;

use crate::config::schema::{
    ClearanceMode, GreenExtension, INCIDENT_SCENARIO, ScenarioDefinition, SimulationSettings,
    Timing,
};
use crate::decision::{
    self, DecisionOrigin, DecisionRequest, DecisionResult, OutflowFlags, outflow_flags,
};
use crate::phase::{OfferOutcome, Phase, PhaseMachine, SimTime, Transition, score_target_ms};
use crate::traffic::score::multiplier;
use crate::traffic::{ArrivalTimeline, Departures, TrafficModel};
use crate::types::{Axis, Direction, QueueSnapshot, WaitSnapshot};

/// Changes produced by one tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub transitions: Vec<Transition>,
    /// Decisions to request, one per boundary opened during the tick.
    pub requests: Vec<(u64, DecisionRequest)>,
    pub arrived: QueueSnapshot,
    pub departed: QueueSnapshot,
}

/// Read-only view published to HTTP clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionSnapshot {
    pub epoch: u64,
    pub scenario_id: String,
    pub sim_time_ms: u64,
    pub phase: Phase,
    pub phase_label: &'static str,
    pub phase_remaining_ms: u64,
    pub boundary: u64,
    pub green_axis: Axis,
    pub green_ms: u64,
    pub reason: String,
    pub origin: Option<DecisionOrigin>,
    pub counts: QueueSnapshot,
    pub waits: WaitSnapshot,
    #[serde(rename = "outflowNS")]
    pub outflow_ns: bool,
    #[serde(rename = "outflowEW")]
    pub outflow_ew: bool,
    pub congestion_multiplier: f64,
    pub congestion_score: Option<u8>,
    pub arrivals_total: u64,
    pub departures_total: u64,
}

/// Simulated four-way intersection.
#[derive(Debug)]
pub struct Intersection {
    scenario_id: String,
    timing: Timing,
    now: SimTime,
    queues: QueueSnapshot,
    waits: WaitSnapshot,
    previous: QueueSnapshot,
    outflow: OutflowFlags,
    machine: PhaseMachine,
    traffic: TrafficModel,
    departures: Departures,
    extension: GreenExtension,
    score: Option<u8>,
    arrivals_total: u64,
    departures_total: u64,
}

impl Intersection {
    /// Empty intersection at time 0, green A.
    #[must_use]
    pub fn new(
        scenario: &ScenarioDefinition,
        timing: Timing,
        clearance: ClearanceMode,
        settings: &SimulationSettings,
    ) -> Self {
        let max_green = if scenario.id == INCIDENT_SCENARIO {
            timing.incident_max_green_ms()
        } else {
            timing.max_green_ms
        };
        let machine = PhaseMachine::new(timing.clone(), clearance, 0).with_max_green(max_green);
        Self {
            scenario_id: scenario.id.clone(),
            timing,
            now: 0,
            queues: QueueSnapshot::default(),
            waits: WaitSnapshot::default(),
            previous: QueueSnapshot::default(),
            outflow: OutflowFlags::default(),
            machine,
            traffic: TrafficModel::new(ArrivalTimeline::from_scenario(scenario), settings.seed),
            departures: Departures::new(settings.saturation_flow_per_s),
            extension: settings.green_extension.clone(),
            score: None,
            arrivals_total: 0,
            departures_total: 0,
        }
    }

    #[must_use]
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    #[must_use]
    pub const fn now(&self) -> SimTime {
        self.now
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.machine.phase()
    }

    #[must_use]
    pub const fn queues(&self) -> &QueueSnapshot {
        &self.queues
    }

    #[must_use]
    pub const fn waits(&self) -> &WaitSnapshot {
        &self.waits
    }

    #[must_use]
    pub const fn machine(&self) -> &PhaseMachine {
        &self.machine
    }

    /// Vehicles that arrived and departed since construction.
    #[must_use]
    pub const fn totals(&self) -> (u64, u64) {
        (self.arrivals_total, self.departures_total)
    }

    /// Applies a congestion score to arrivals and, when enabled, to the
    /// green extension target.
    pub fn set_congestion_score(&mut self, score: u8) {
        self.score = Some(score.min(100));
        self.traffic.set_multiplier(multiplier(score));
    }

    /// Draws arrivals from the scenario timeline and advances by `dt_ms`.
    pub fn tick(&mut self, dt_ms: u64) -> TickOutcome {
        let arrivals = self.traffic.arrivals(ms_to_s(self.now), ms_to_s(dt_ms));
        self.advance(dt_ms, arrivals)
    }

    /// Advances by `dt_ms` with the given arrivals.
    pub fn advance(&mut self, dt_ms: u64, arrivals: QueueSnapshot) -> TickOutcome {
        let dt_s = ms_to_s(dt_ms);
        let green = self.machine.phase().green_axis();

        for d in Direction::ALL {
            let wait = self.waits.get_mut(d);
            if green.is_some_and(|axis| axis.contains(d)) {
                *wait = 0.0;
            } else {
                *wait += dt_s;
            }
        }

        for (d, &n) in arrivals.iter() {
            let queue = self.queues.get_mut(d);
            *queue = queue.saturating_add(n);
        }
        self.arrivals_total += arrivals.total();

        let departed = self.departures.discharge(green, &mut self.queues, dt_s);
        self.departures_total += departed.total();

        self.now = self.now.saturating_add(dt_ms);

        if self.extension.enabled {
            if let Some(score) = self.score {
                let target = score_target_ms(&self.timing, score);
                self.machine
                    .extend_green(self.now, target, self.extension.step_ms);
            }
        }

        let mut outcome = TickOutcome {
            arrived: arrivals,
            departed,
            ..TickOutcome::default()
        };
        loop {
            let fallback_request = self.decision_request();
            let timing = &self.timing;
            let Some(transition) = self
                .machine
                .step(self.now, || decision::fallback(&fallback_request, timing))
            else {
                break;
            };
            match &transition {
                Transition::ClearanceStarted { boundary, .. } => {
                    self.outflow = outflow_flags(&self.previous, &self.queues);
                    self.previous = self.queues;
                    outcome.requests.push((*boundary, self.decision_request()));
                }
                Transition::GreenStarted { axis, .. } => {
                    for d in axis.directions() {
                        *self.waits.get_mut(d) = 0.0;
                    }
                }
                Transition::ClearanceStep { .. } => {}
            }
            outcome.transitions.push(transition);
        }
        outcome
    }

    /// Current inputs for the decision function.
    #[must_use]
    pub fn decision_request(&self) -> DecisionRequest {
        DecisionRequest {
            counts: self.queues,
            waits: self.waits,
            scenario_id: self.scenario_id.clone(),
            last_green_dir: self.machine.active_green().axis,
            outflow_ns: self.outflow.ns,
            outflow_ew: self.outflow.ew,
        }
    }

    /// Offers a decision for `boundary` to the phase machine.
    pub fn offer(
        &mut self,
        boundary: u64,
        result: DecisionResult,
        origin: DecisionOrigin,
    ) -> OfferOutcome {
        self.machine.offer(boundary, result, origin)
    }

    #[must_use]
    pub fn snapshot(&self, epoch: u64) -> IntersectionSnapshot {
        let active = self.machine.active_green();
        let phase = self.machine.phase();
        IntersectionSnapshot {
            epoch,
            scenario_id: self.scenario_id.clone(),
            sim_time_ms: self.now,
            phase,
            phase_label: phase.label(),
            phase_remaining_ms: self.machine.remaining_ms(self.now),
            boundary: self.machine.boundary(),
            green_axis: active.axis,
            green_ms: active.green_ms,
            reason: active.reason.clone(),
            origin: active.origin,
            counts: self.queues,
            waits: self.waits,
            outflow_ns: self.outflow.ns,
            outflow_ew: self.outflow.ew,
            congestion_multiplier: self.traffic.multiplier(),
            congestion_score: self.score,
            arrivals_total: self.arrivals_total,
            departures_total: self.departures_total,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ms_to_s(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
