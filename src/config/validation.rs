//! Configuration validation
//!
//! Semantic checks run after deserialization. The validator collects every
//! issue instead of stopping at the first so that `smartcross validate`
//! reports a complete list.

use std::collections::HashSet;

use crate::config::loader::ConfigLimits;
use crate::config::schema::{ClearanceMode, ScenarioDefinition, SmartcrossConfig};
use crate::error::{Severity, ValidationIssue};
use crate::scenarios;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &SmartcrossConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_timing(config);
        self.validate_clearance(&config.clearance);
        self.validate_simulation(config);
        self.validate_decision(config);
        self.validate_endpoints(config);
        self.validate_scenarios(&config.scenarios, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_timing(&mut self, config: &SmartcrossConfig) {
        let t = &config.timing;

        if t.min_green_ms == 0 {
            self.add_error("timing.min_green_ms", "Minimum green must be positive");
        }
        if t.max_green_ms < t.min_green_ms {
            self.add_error(
                "timing.max_green_ms",
                &format!(
                    "Maximum green ({}) is below minimum green ({})",
                    t.max_green_ms, t.min_green_ms
                ),
            );
        }
        if !t.max_wait_s.is_finite() || t.max_wait_s <= 0.0 {
            self.add_error("timing.max_wait_s", "Starvation threshold must be a positive number");
        }
        if !t.incident_cap_factor.is_finite() || t.incident_cap_factor < 1.0 {
            self.add_error(
                "timing.incident_cap_factor",
                "Incident cap factor must be a number >= 1.0",
            );
        }
        if t.max_wait_green_ms < t.min_green_ms || t.max_wait_green_ms > t.max_green_ms {
            self.add_warning(
                "timing.max_wait_green_ms",
                "Starvation green lies outside [min_green_ms, max_green_ms] and will be clamped",
            );
        }
        if t.min_green_ms.saturating_add(t.base_cap_ms) > t.max_green_ms {
            self.add_warning(
                "timing.base_cap_ms",
                "min_green_ms + base_cap_ms exceeds max_green_ms; heavy load saturates at the cap",
            );
        }
    }

    fn validate_clearance(&mut self, clearance: &ClearanceMode) {
        match clearance {
            ClearanceMode::YellowAllRed {
                yellow_ms,
                all_red_ms,
            } => {
                if *yellow_ms == 0 {
                    self.add_error("clearance.yellow_ms", "Yellow interval must be positive");
                }
                if *all_red_ms == 0 {
                    self.add_warning(
                        "clearance.all_red_ms",
                        "All-red interval is zero; conflicting greens will be back to back",
                    );
                }
            }
            ClearanceMode::Pedestrian { pause_ms } => {
                if *pause_ms == 0 {
                    self.add_error("clearance.pause_ms", "Pedestrian pause must be positive");
                }
            }
        }
    }

    fn validate_simulation(&mut self, config: &SmartcrossConfig) {
        let sim = &config.simulation;

        if sim.tick_ms == 0 {
            self.add_error("simulation.tick_ms", "Tick period must be positive");
        } else if sim.tick_ms > 1_000 {
            self.add_warning(
                "simulation.tick_ms",
                "Tick period above one second makes phase deadlines coarse",
            );
        }
        if !sim.saturation_flow_per_s.is_finite() || sim.saturation_flow_per_s <= 0.0 {
            self.add_error(
                "simulation.saturation_flow_per_s",
                "Saturation flow must be a positive number",
            );
        }
        if sim.green_extension.enabled && sim.green_extension.step_ms == 0 {
            self.add_error(
                "simulation.green_extension.step_ms",
                "Extension step must be positive when the extension is enabled",
            );
        }
        if sim.scenario.is_empty() {
            self.add_error("simulation.scenario", "Default scenario cannot be empty");
        } else if scenarios::find_scenario(&sim.scenario).is_none()
            && !config.scenarios.iter().any(|s| s.id == sim.scenario)
        {
            self.add_error(
                "simulation.scenario",
                &format!("Unknown scenario '{}'", sim.scenario),
            );
        }
    }

    fn validate_decision(&mut self, config: &SmartcrossConfig) {
        let decision = &config.decision;

        if decision.timeout_ms == 0 {
            self.add_error("decision.timeout_ms", "Decision timeout must be positive");
        }
        if let Some(url) = &decision.url {
            if let Err(e) = reqwest::Url::parse(url) {
                self.add_error("decision.url", &format!("Invalid URL '{url}': {e}"));
            }
            if decision.timeout_ms >= config.clearance.total_ms() {
                self.add_warning(
                    "decision.timeout_ms",
                    "Timeout is not shorter than clearance; slow answers will be replaced by the fallback",
                );
            }
        }
    }

    fn validate_endpoints(&mut self, config: &SmartcrossConfig) {
        if config.server.max_body_bytes == 0 {
            self.add_error("server.max_body_bytes", "Body limit must be positive");
        }
        if config.server.bind.is_empty() {
            self.add_error("server.bind", "Bind address cannot be empty");
        }
        if let Some(url) = &config.traffic_score.url {
            if let Err(e) = reqwest::Url::parse(url) {
                self.add_error("traffic_score.url", &format!("Invalid URL '{url}': {e}"));
            }
        }
        if config.traffic_score.timeout_ms == 0 {
            self.add_error("traffic_score.timeout_ms", "Timeout must be positive");
        }
    }

    fn validate_scenarios(&mut self, defs: &[ScenarioDefinition], limits: &ConfigLimits) {
        if defs.len() > limits.max_scenarios {
            self.add_error(
                "scenarios",
                &format!(
                    "Too many scenarios: {} (limit: {})",
                    defs.len(),
                    limits.max_scenarios
                ),
            );
        }

        let mut seen = HashSet::new();
        for (i, def) in defs.iter().enumerate() {
            let base = format!("scenarios[{i}]");
            if def.id.is_empty() {
                self.add_error(&format!("{base}.id"), "Scenario id cannot be empty");
            } else if !seen.insert(def.id.as_str()) {
                self.add_error(
                    &format!("{base}.id"),
                    &format!("Duplicate scenario id '{}'", def.id),
                );
            } else if scenarios::find_scenario(&def.id).is_some() {
                self.add_warning(
                    &format!("{base}.id"),
                    &format!("Scenario '{}' overrides the built-in of the same name", def.id),
                );
            }
            if def.congestion > 100 {
                self.add_error(
                    &format!("{base}.congestion"),
                    "Congestion score must be within 0..=100",
                );
            }
            self.validate_timeline(&base, def, limits);
        }
    }

    fn validate_timeline(&mut self, base: &str, def: &ScenarioDefinition, limits: &ConfigLimits) {
        if def.timeline.is_empty() {
            self.add_error(&format!("{base}.timeline"), "Timeline needs at least one segment");
            return;
        }
        if def.timeline.len() > limits.max_segments {
            self.add_error(
                &format!("{base}.timeline"),
                &format!(
                    "Too many segments: {} (limit: {})",
                    def.timeline.len(),
                    limits.max_segments
                ),
            );
        }

        let mut previous = f64::NEG_INFINITY;
        for (j, seg) in def.timeline.iter().enumerate() {
            let path = format!("{base}.timeline[{j}]");
            if !seg.at_s.is_finite() || seg.at_s < 0.0 {
                self.add_error(&format!("{path}.at_s"), "Offset must be a non-negative number");
            } else if seg.at_s <= previous {
                self.add_error(&format!("{path}.at_s"), "Segments must be strictly ascending");
            }
            previous = seg.at_s;
            for (d, rate) in seg.rates.iter() {
                if !rate.is_finite() || *rate < 0.0 {
                    self.add_error(
                        &format!("{path}.rates.{d}"),
                        "Arrival rate must be a non-negative number",
                    );
                }
            }
        }
        if def.timeline[0].at_s > 0.0 {
            self.add_warning(
                &format!("{base}.timeline[0].at_s"),
                "First segment starts after 0; its rates also apply before it",
            );
        }
        if let Some(period) = def.loop_s {
            if !period.is_finite() || period <= previous {
                self.add_error(
                    &format!("{base}.loop_s"),
                    "Loop period must exceed the last segment offset",
                );
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
