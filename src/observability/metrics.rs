//! Prometheus metrics.
//!
//! Label values that can come from outside the process (reasons returned by
//! a remote decision service, scenario ids from config) are sanitized to keep
//! label cardinality bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::decision::DecisionOrigin;
use crate::error::SmartcrossError;
use crate::types::QueueSnapshot;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Reason tags the heuristic can produce, without the platoon suffix.
const KNOWN_REASONS: [&str; 6] = [
    "max-wait",
    "incident",
    "fairness",
    "tie-favor-a",
    "tie-alternate",
    "fallback",
];

const MAX_LABEL_LEN: usize = 64;

/// Returns `reason` when it is a known tag (optionally `+platoon`), else
/// `"__unknown__"`.
#[must_use]
pub fn sanitize_reason_label(reason: &str) -> &str {
    let base = reason.strip_suffix("+platoon").unwrap_or(reason);
    if KNOWN_REASONS.contains(&base) {
        reason
    } else {
        "__unknown__"
    }
}

/// Truncates and replaces characters invalid in Prometheus label values.
fn sanitize_free_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus scrape endpoint is served on
/// `127.0.0.1:<port>`; with `None` the recorder is installed without one.
///
/// # Errors
///
/// Returns `SmartcrossError::Io` if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: Option<u16>) -> Result<(), SmartcrossError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SmartcrossError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "smartcross_decisions_total",
        "Decisions applied at a green start, by origin and reason"
    );
    describe_counter!(
        "smartcross_decision_fallbacks_total",
        "Fallback substitutions by failure cause"
    );
    describe_counter!(
        "smartcross_decisions_discarded_total",
        "Decision results rejected as stale or duplicate"
    );
    describe_histogram!(
        "smartcross_decision_latency_ms",
        "Time spent waiting on a decision source in milliseconds"
    );
    describe_counter!(
        "smartcross_phase_transitions_total",
        "Signal phase transitions"
    );
    describe_gauge!(
        "smartcross_queue_length",
        "Vehicles waiting per approach"
    );
    describe_counter!(
        "smartcross_simulation_resets_total",
        "Simulation resets by scenario"
    );
    describe_counter!(
        "smartcross_http_requests_total",
        "HTTP requests by route and status"
    );
}

/// Records a decision applied at the start of a green.
pub fn record_decision(origin: DecisionOrigin, reason: &str) {
    counter!(
        "smartcross_decisions_total",
        "origin" => origin.as_str(),
        "reason" => sanitize_reason_label(reason).to_owned(),
    )
    .increment(1);
}

/// Records a fallback substitution.
pub fn record_fallback(cause: &'static str) {
    counter!("smartcross_decision_fallbacks_total", "cause" => cause).increment(1);
}

/// Records a result rejected by the phase machine or the epoch check.
pub fn record_decision_discarded(why: &'static str) {
    counter!("smartcross_decisions_discarded_total", "why" => why).increment(1);
}

/// Records how long a decision source took.
pub fn record_decision_latency(origin: DecisionOrigin, latency: Duration) {
    histogram!("smartcross_decision_latency_ms", "origin" => origin.as_str())
        .record(latency.as_secs_f64() * 1000.0);
}

/// Records a phase transition between two phase labels.
pub fn record_phase_transition(from: &'static str, to: &'static str) {
    counter!("smartcross_phase_transitions_total", "from" => from, "to" => to).increment(1);
}

/// Publishes per-approach queue gauges.
pub fn set_queue_lengths(queues: &QueueSnapshot) {
    for (d, count) in queues.iter() {
        gauge!("smartcross_queue_length", "direction" => d.label()).set(f64::from(*count));
    }
}

/// Records a simulation reset.
pub fn record_reset(scenario: &str) {
    counter!("smartcross_simulation_resets_total", "scenario" => sanitize_free_label(scenario))
        .increment(1);
}

/// Records a handled HTTP request.
pub fn record_http_request(route: &'static str, status: u16) {
    counter!(
        "smartcross_http_requests_total",
        "route" => route,
        "status" => status.to_string(),
    )
    .increment(1);
}
