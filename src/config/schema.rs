//! Configuration schema
//!
//! Typed representation of the YAML configuration file. Every section is
//! optional; absent fields take the defaults below, which are also the
//! values the decision heuristic was tuned with.

use serde::{Deserialize, Serialize};

use crate::types::PerDirection;

// ============================================================================
// Defaults
// ============================================================================

/// Shortest green any axis may receive.
pub const MIN_GREEN_MS: u64 = 7_000;

/// Longest green outside the incident scenario.
pub const MAX_GREEN_MS: u64 = 45_000;

/// Starvation threshold in seconds.
pub const MAX_WAIT_S: f64 = 90.0;

/// Green granted when the starvation threshold forces an axis.
pub const MAX_WAIT_GREEN_MS: u64 = 15_000;

/// Extra green granted to a departing platoon.
pub const PLATOON_BONUS_MS: u64 = 2_500;

/// Multiplier applied to the green cap during an incident.
pub const INCIDENT_CAP_FACTOR: f64 = 1.15;

/// Cap on the load-dependent part of the base duration.
pub const BASE_CAP_MS: u64 = 38_000;

/// Base-duration weight per waiting vehicle.
pub const QUEUE_WEIGHT_MS: u64 = 800;

/// Base-duration weight per second of mean wait.
pub const WAIT_WEIGHT_MS: u64 = 120;

/// Scenario id that activates the incident override.
pub const INCIDENT_SCENARIO: &str = "incident";

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmartcrossConfig {
    /// Decision heuristic constants.
    pub timing: Timing,

    /// Policy for equal fairness scores.
    pub tie_break: TieBreak,

    /// Safety interval between greens.
    pub clearance: ClearanceMode,

    /// Simulation loop settings.
    pub simulation: SimulationSettings,

    /// Where decisions come from.
    pub decision: DecisionSettings,

    /// HTTP service settings.
    pub server: ServerSettings,

    /// Congestion score endpoint and client.
    pub traffic_score: TrafficScoreSettings,

    /// User-defined scenarios, consulted before the built-ins.
    pub scenarios: Vec<ScenarioDefinition>,
}

// ============================================================================
// Timing
// ============================================================================

/// Constants consumed by the decision heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub min_green_ms: u64,
    pub max_green_ms: u64,
    /// Starvation threshold (`Tmax`) in seconds.
    pub max_wait_s: f64,
    pub max_wait_green_ms: u64,
    pub platoon_bonus_ms: u64,
    pub incident_cap_factor: f64,
    pub base_cap_ms: u64,
    pub queue_weight_ms: u64,
    pub wait_weight_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            min_green_ms: MIN_GREEN_MS,
            max_green_ms: MAX_GREEN_MS,
            max_wait_s: MAX_WAIT_S,
            max_wait_green_ms: MAX_WAIT_GREEN_MS,
            platoon_bonus_ms: PLATOON_BONUS_MS,
            incident_cap_factor: INCIDENT_CAP_FACTOR,
            base_cap_ms: BASE_CAP_MS,
            queue_weight_ms: QUEUE_WEIGHT_MS,
            wait_weight_ms: WAIT_WEIGHT_MS,
        }
    }
}

impl Timing {
    /// Green cap in effect while the incident override is active.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn incident_max_green_ms(&self) -> u64 {
        let raised = (self.max_green_ms as f64 * self.incident_cap_factor).round();
        if raised.is_finite() && raised >= self.max_green_ms as f64 {
            raised as u64
        } else {
            self.max_green_ms
        }
    }

    /// Clamps `green_ms` into `[min_green_ms, max_green]`.
    #[must_use]
    pub fn clamp_green(&self, green_ms: u64, max_green: u64) -> u64 {
        green_ms.clamp(self.min_green_ms, max_green.max(self.min_green_ms))
    }
}

// ============================================================================
// Tie-Break Policy
// ============================================================================

/// How equal fairness scores are resolved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Axis A wins every tie.
    #[default]
    FavorA,
    /// The axis that did not have the last green wins.
    Alternate,
}

// ============================================================================
// Clearance
// ============================================================================

/// Safety interval(s) between two greens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ClearanceMode {
    /// Yellow on the departing axis, then all-red.
    YellowAllRed { yellow_ms: u64, all_red_ms: u64 },
    /// Single all-red pedestrian crossing pause.
    Pedestrian { pause_ms: u64 },
}

impl Default for ClearanceMode {
    fn default() -> Self {
        Self::YellowAllRed {
            yellow_ms: 3_000,
            all_red_ms: 800,
        }
    }
}

impl ClearanceMode {
    /// Time between the end of one green and the start of the next.
    #[must_use]
    pub const fn total_ms(&self) -> u64 {
        match self {
            Self::YellowAllRed {
                yellow_ms,
                all_red_ms,
            } => yellow_ms.saturating_add(*all_red_ms),
            Self::Pedestrian { pause_ms } => *pause_ms,
        }
    }
}

// ============================================================================
// Simulation / Decision / Server
// ============================================================================

/// Loop and traffic settings for `simulate` and `serve --simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    /// Fixed tick period.
    pub tick_ms: u64,
    /// Vehicles per second discharged by each green approach.
    pub saturation_flow_per_s: f64,
    /// RNG seed for arrivals; random when absent.
    pub seed: Option<u64>,
    /// Scenario started when none is given on the command line.
    pub scenario: String,
    /// Stretches a running green toward the congestion score's target.
    pub green_extension: GreenExtension,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            saturation_flow_per_s: 0.5,
            seed: None,
            scenario: "free".to_string(),
            green_extension: GreenExtension::default(),
        }
    }
}

/// Score-driven extension of the running green.
///
/// The congestion score maps linearly to a target green length in
/// `[min_green_ms, max_green_ms]`. While the remaining green is below that
/// target the deadline moves out by at most `step_ms` per tick, never past
/// the active green cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreenExtension {
    pub enabled: bool,
    pub step_ms: u64,
}

impl Default for GreenExtension {
    fn default() -> Self {
        Self {
            enabled: false,
            step_ms: 300,
        }
    }
}

/// Decision source selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionSettings {
    /// Remote `/api/decision` endpoint; the local heuristic is used when absent.
    pub url: Option<String>,
    /// Bound on a single remote decision call.
    pub timeout_ms: u64,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 2_000,
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// `[host:]port` to bind.
    pub bind: String,
    /// Request bodies above this size are rejected with 413.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Congestion score settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrafficScoreSettings {
    /// How long a generated score is served from cache.
    pub cache_ttl_ms: u64,
    /// Remote `/api/traffic` endpoint read by the simulation, if any.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TrafficScoreSettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            url: None,
            timeout_ms: 1_500,
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// A named arrival timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDefinition {
    /// Identifier passed as `scenarioId` to the decision function.
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Baseline congestion score (0..=100) reported by `/api/traffic`.
    #[serde(default = "default_congestion")]
    pub congestion: u8,

    /// Timeline period in seconds; time wraps when set.
    #[serde(default)]
    pub loop_s: Option<f64>,

    /// Rate changes, ordered by `at_s`.
    pub timeline: Vec<TimelineSegment>,
}

const fn default_congestion() -> u8 {
    50
}

/// Arrival rates in effect from `at_s` until the next segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineSegment {
    /// Offset from scenario start in seconds.
    pub at_s: f64,
    /// Vehicles per minute per approach.
    pub rates: PerDirection<f64>,
}
