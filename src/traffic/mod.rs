//! Vehicle arrivals and departures.
//!
//! Arrivals follow a scenario's piecewise-constant rate timeline, drawn as
//! per-tick Bernoulli trials from a seeded RNG. Departures drain the green
//! axis at a fixed saturation flow.

pub mod score;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::schema::{ScenarioDefinition, TimelineSegment};
use crate::types::{Axis, Direction, PerDirection, QueueSnapshot};

/// Vehicles per minute per approach.
pub type Rates = PerDirection<f64>;

// ============================================================================
// Timeline
// ============================================================================

/// Piecewise-constant arrival rates over scenario time.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalTimeline {
    segments: Vec<TimelineSegment>,
    loop_s: Option<f64>,
}

impl ArrivalTimeline {
    /// Segments are sorted by `at_s`.
    #[must_use]
    pub fn new(mut segments: Vec<TimelineSegment>, loop_s: Option<f64>) -> Self {
        segments.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        Self {
            segments,
            loop_s: loop_s.filter(|l| l.is_finite() && *l > 0.0),
        }
    }

    #[must_use]
    pub fn from_scenario(scenario: &ScenarioDefinition) -> Self {
        Self::new(scenario.timeline.clone(), scenario.loop_s)
    }

    /// Rates in effect `elapsed_s` seconds into the scenario.
    ///
    /// The last segment starting at or before the (wrapped) time applies;
    /// times before the first segment use the first segment. An empty
    /// timeline yields no arrivals.
    #[must_use]
    pub fn rates_at(&self, elapsed_s: f64) -> Rates {
        let t = self.loop_s.map_or(elapsed_s, |l| elapsed_s.rem_euclid(l));
        self.segments
            .iter()
            .rev()
            .find(|s| s.at_s <= t)
            .or_else(|| self.segments.first())
            .map_or_else(|| Rates::splat(0.0), |s| s.rates)
    }
}

// ============================================================================
// Arrivals
// ============================================================================

/// Random arrival generator.
#[derive(Debug)]
pub struct TrafficModel {
    timeline: ArrivalTimeline,
    rng: StdRng,
    multiplier: f64,
}

impl TrafficModel {
    /// Uses OS entropy when `seed` is `None`.
    #[must_use]
    pub fn new(timeline: ArrivalTimeline, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            timeline,
            rng,
            multiplier: 1.0,
        }
    }

    /// Scales every rate; negative or non-finite values are ignored.
    pub fn set_multiplier(&mut self, multiplier: f64) {
        if multiplier.is_finite() && multiplier >= 0.0 {
            self.multiplier = multiplier;
        }
    }

    #[must_use]
    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Draws the arrivals of one tick of length `dt_s` at `elapsed_s`.
    ///
    /// The expected count `rate / 60 * dt * multiplier` contributes its
    /// whole part deterministically and its fraction as a Bernoulli trial.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn arrivals(&mut self, elapsed_s: f64, dt_s: f64) -> QueueSnapshot {
        let rates = self.timeline.rates_at(elapsed_s);
        let multiplier = self.multiplier;
        let rng = &mut self.rng;
        PerDirection::from_fn(|d| {
            let rate = *rates.get(d);
            if !(rate.is_finite() && rate > 0.0) || dt_s <= 0.0 {
                return 0;
            }
            let expected = rate / 60.0 * dt_s * multiplier;
            let whole = expected.floor();
            let extra = u32::from(rng.random::<f64>() < expected - whole);
            (whole as u32).saturating_add(extra)
        })
    }
}

// ============================================================================
// Departures
// ============================================================================

/// Saturation-flow discharge of the green axis.
#[derive(Debug, Clone)]
pub struct Departures {
    saturation_flow_per_s: f64,
    credit: PerDirection<f64>,
}

impl Departures {
    #[must_use]
    pub fn new(saturation_flow_per_s: f64) -> Self {
        Self {
            saturation_flow_per_s: saturation_flow_per_s.max(0.0),
            credit: PerDirection::splat(0.0),
        }
    }

    /// Removes departing vehicles from `queues` and returns how many left.
    ///
    /// Green directions earn `flow * dt` departure credit per tick; whole
    /// credits become departures while vehicles are queued. Credit is
    /// dropped for red or empty approaches, so a queue never goes negative
    /// and no burst is banked.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn discharge(
        &mut self,
        green: Option<Axis>,
        queues: &mut QueueSnapshot,
        dt_s: f64,
    ) -> QueueSnapshot {
        let mut departed = QueueSnapshot::default();
        for d in Direction::ALL {
            let credit = self.credit.get_mut(d);
            let queue = queues.get_mut(d);
            if green.is_none_or(|axis| !axis.contains(d)) || *queue == 0 {
                *credit = 0.0;
                continue;
            }
            *credit += self.saturation_flow_per_s * dt_s.max(0.0);
            let leaving = (credit.floor() as u32).min(*queue);
            *credit -= f64::from(leaving);
            *queue -= leaving;
            if *queue == 0 {
                *credit = 0.0;
            }
            *departed.get_mut(d) = leaving;
        }
        departed
    }
}
