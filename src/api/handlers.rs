//! Route handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::AppState;
use crate::decision::{DecisionRequest, decide};
use crate::error::{ConfigError, ServerError, SmartcrossError};
use crate::observability::metrics::record_http_request;
use crate::traffic::score::{NEUTRAL_SCORE, TrafficScore};

/// Score key used when `/api/traffic` is called without a scenario.
const DEFAULT_SCORE_KEY: &str = "default";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

fn error_response(
    route: &'static str,
    status: StatusCode,
    error: impl Into<String>,
    suggestion: Option<String>,
) -> Response {
    record_http_request(route, status.as_u16());
    let body = ErrorBody {
        error: error.into(),
        suggestion,
    };
    (status, Json(body)).into_response()
}

fn ok_json<T: Serialize>(route: &'static str, status: StatusCode, body: &T) -> Response {
    record_http_request(route, status.as_u16());
    (status, Json(body)).into_response()
}

/// Checks the body against the configured limit, returning a 413 response
/// when it is too large.
fn check_size(route: &'static str, state: &AppState, body: &Bytes) -> Option<Response> {
    (body.len() > state.max_body_bytes).then(|| {
        error_response(
            route,
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "request body too large: {} bytes (limit: {})",
                body.len(),
                state.max_body_bytes
            ),
            None,
        )
    })
}

// ============================================================================
// Decision
// ============================================================================

/// `POST /api/decision`
pub async fn post_decision(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    const ROUTE: &str = "/api/decision";

    if let Some(resp) = check_size(ROUTE, &state, &body) {
        return resp;
    }
    let request: DecisionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                ROUTE,
                StatusCode::BAD_REQUEST,
                format!("invalid decision request: {e}"),
                None,
            );
        }
    };

    let result = decide(&request, &state.timing, state.tie_break);
    debug!(
        scenario = %request.scenario_id,
        next_dir = %result.next_dir,
        green_ms = result.green_ms,
        reason = %result.reason,
        "served decision"
    );
    ok_json(ROUTE, StatusCode::OK, &result)
}

// ============================================================================
// Traffic Score
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrafficQuery {
    scenario: Option<String>,
}

/// `GET /api/traffic[?scenario=id]`
pub async fn get_traffic(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrafficQuery>,
) -> Response {
    // Unknown ids share the default entry so the cache stays bounded.
    let (key, baseline) = match query.scenario.as_deref().and_then(|id| state.registry.get(id)) {
        Some(scenario) => (scenario.id.as_str(), scenario.congestion),
        None => (DEFAULT_SCORE_KEY, NEUTRAL_SCORE),
    };
    let score = state.scores.score(key, baseline);
    ok_json("/api/traffic", StatusCode::OK, &TrafficScore { score })
}

// ============================================================================
// Simulation
// ============================================================================

/// `GET /api/simulation`
pub async fn get_simulation(State(state): State<Arc<AppState>>) -> Response {
    const ROUTE: &str = "/api/simulation";
    match &state.simulation {
        Some(handle) => ok_json(ROUTE, StatusCode::OK, &handle.snapshot()),
        None => no_simulation(ROUTE),
    }
}

/// `GET /api/simulation/events`
///
/// Snapshots are sent as `snapshot` events. A subscriber that falls behind
/// skips the snapshots it missed.
pub async fn simulation_events(State(state): State<Arc<AppState>>) -> Response {
    const ROUTE: &str = "/api/simulation/events";
    let Some(handle) = &state.simulation else {
        return no_simulation(ROUTE);
    };

    let stream = BroadcastStream::new(handle.subscribe()).filter_map(|item| {
        item.ok()
            .and_then(|snapshot| SseEvent::default().event("snapshot").json_data(snapshot).ok())
            .map(Ok::<_, Infallible>)
    });
    record_http_request(ROUTE, StatusCode::OK.as_u16());
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResetRequest {
    #[serde(default)]
    scenario: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResetAccepted<'a> {
    status: &'static str,
    scenario: Option<&'a str>,
}

/// `POST /api/simulation/reset` with an optional `{"scenario": id}` body.
pub async fn post_reset(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    const ROUTE: &str = "/api/simulation/reset";

    let Some(handle) = &state.simulation else {
        return no_simulation(ROUTE);
    };
    if let Some(resp) = check_size(ROUTE, &state, &body) {
        return resp;
    }
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ResetRequest::default()
    } else {
        match serde_json::from_slice::<ResetRequest>(&body) {
            Ok(r) => r,
            Err(e) => {
                return error_response(
                    ROUTE,
                    StatusCode::BAD_REQUEST,
                    format!("invalid reset request: {e}"),
                    None,
                );
            }
        }
    };

    match handle.reset(request.scenario.clone()).await {
        Ok(()) => ok_json(
            ROUTE,
            StatusCode::ACCEPTED,
            &ResetAccepted {
                status: "accepted",
                scenario: request.scenario.as_deref(),
            },
        ),
        Err(SmartcrossError::Config(ConfigError::UnknownScenario { id, suggestion })) => {
            error_response(
                ROUTE,
                StatusCode::NOT_FOUND,
                format!("unknown scenario '{id}'"),
                suggestion,
            )
        }
        Err(SmartcrossError::Server(ServerError::SimulationStopped)) => error_response(
            ROUTE,
            StatusCode::SERVICE_UNAVAILABLE,
            ServerError::SimulationStopped.to_string(),
            None,
        ),
        Err(e) => error_response(ROUTE, StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None),
    }
}

fn no_simulation(route: &'static str) -> Response {
    error_response(
        route,
        StatusCode::NOT_FOUND,
        "no simulation is running in this server",
        None,
    )
}

// ============================================================================
// Health
// ============================================================================

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    record_http_request("/healthz", StatusCode::OK.as_u16());
    "ok"
}

// ============================================================================
// Tests
// ============================================================================
