//! HTTP service.
//!
//! Hosts the decision heuristic (`POST /api/decision`), the mock congestion
//! score (`GET /api/traffic`), and, when a simulation runs in the same
//! process, its state and control endpoints.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::schema::{TieBreak, Timing};
use crate::error::ServerError;
use crate::scenarios::ScenarioRegistry;
use crate::sim::SimulationHandle;
use crate::traffic::score::ScoreCache;

/// State shared by every handler.
pub struct AppState {
    pub timing: Timing,
    pub tie_break: TieBreak,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
    pub registry: Arc<ScenarioRegistry>,
    /// Backs `/api/traffic`.
    pub scores: Arc<ScoreCache>,
    /// Present when the server also runs a simulation.
    pub simulation: Option<SimulationHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tie_break", &self.tie_break)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("simulation", &self.simulation.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds the router with every route mounted.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Raise axum's 2 MB default so the handler's own limit check decides.
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes.saturating_add(1));

    Router::new()
        .route("/api/decision", post(handlers::post_decision))
        .route("/api/traffic", get(handlers::get_traffic))
        .route("/api/simulation", get(handlers::get_simulation))
        .route("/api/simulation/events", get(handlers::simulation_events))
        .route("/api/simulation/reset", post(handlers::post_reset))
        .route("/healthz", get(handlers::healthz))
        .layer(body_limit)
        .with_state(state)
}

/// Binds a TCP listener, returning it with the address actually bound.
///
/// # Errors
///
/// Returns `ServerError::Bind` if the address is unavailable.
pub async fn bind(addr: &str) -> Result<(TcpListener, SocketAddr), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;
    let bound = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("local_addr failed: {e}")))?;
    Ok((listener, bound))
}

/// Serves `state` on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns `ServerError::Serve` if the server loop fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let router = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP service started");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;
    debug!("HTTP service shut down");
    Ok(())
}

/// Parses a bind address string into a full `host:port` form.
///
/// Accepts:
/// - `:8080` → `0.0.0.0:8080`
/// - `8080` → `0.0.0.0:8080`
/// - `1.2.3.4:8080` → as-is
///
/// # Errors
///
/// Returns [`ServerError::InvalidAddress`] if the result is not a socket
/// address.
pub fn parse_bind_addr(input: &str) -> Result<String, ServerError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse::<SocketAddr>()
        .map_err(|e| ServerError::InvalidAddress {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bind_addr_colon_port() {
        assert_eq!(parse_bind_addr(":8080").unwrap(), "0.0.0.0:8080");
    }

    #[test]
    fn parse_bind_addr_port_only() {
        assert_eq!(parse_bind_addr("8080").unwrap(), "0.0.0.0:8080");
    }

    #[test]
    fn parse_bind_addr_full() {
        assert_eq!(parse_bind_addr("127.0.0.1:3000").unwrap(), "127.0.0.1:3000");
    }

    #[test]
    fn parse_bind_addr_invalid() {
        let err = parse_bind_addr("crossroads").unwrap_err();
        assert!(err.to_string().contains("crossroads"));
    }

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let (_listener, addr) = bind("127.0.0.1:0").await.unwrap();
        assert_ne!(addr.port(), 0);
    }
}
