//! Where decisions come from.
//!
//! A [`DecisionSource`] answers a [`DecisionRequest`]. The simulation never
//! talks to a source directly; it goes through [`resolve_with_fallback`],
//! which bounds the call and substitutes the load-only formula on failure.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::redirect;
use tracing::{debug, warn};

use crate::config::schema::{TieBreak, Timing};
use crate::error::DecisionError;
use crate::observability::metrics;

use super::heuristic;
use super::request::{DecisionOrigin, DecisionRequest, DecisionResult};

/// Largest decision response body accepted from a remote service.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024;

/// Produces scheduling decisions.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Answers one request.
    ///
    /// # Errors
    ///
    /// Returns a [`DecisionError`] when no decision could be obtained.
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResult, DecisionError>;

    /// Origin recorded for decisions from this source.
    fn origin(&self) -> DecisionOrigin;
}

// ============================================================================
// Local
// ============================================================================

/// In-process heuristic.
#[derive(Debug, Clone)]
pub struct LocalSource {
    timing: Timing,
    tie_break: TieBreak,
}

impl LocalSource {
    #[must_use]
    pub const fn new(timing: Timing, tie_break: TieBreak) -> Self {
        Self { timing, tie_break }
    }
}

#[async_trait]
impl DecisionSource for LocalSource {
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResult, DecisionError> {
        Ok(heuristic::decide(request, &self.timing, self.tie_break))
    }

    fn origin(&self) -> DecisionOrigin {
        DecisionOrigin::Local
    }
}

// ============================================================================
// Remote
// ============================================================================

/// Decision service reached over HTTP (`POST` JSON, JSON answer).
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteSource {
    /// Creates a source posting to `url`.
    ///
    /// Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns `DecisionError::Network` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| DecisionError::Network(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn timeout_error(&self) -> DecisionError {
        DecisionError::Timeout(self.timeout.as_millis() as u64)
    }
}

#[async_trait]
impl DecisionSource for RemoteSource {
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResult, DecisionError> {
        debug!(url = %self.url, "requesting remote decision");

        let response = tokio::time::timeout(self.timeout, self.client.post(&self.url).json(request).send())
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| DecisionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecisionError::HttpStatus(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_SIZE as u64)
        {
            return Err(oversized_body());
        }
        let bytes = tokio::time::timeout(self.timeout, read_limited(response, MAX_RESPONSE_SIZE))
            .await
            .map_err(|_| self.timeout_error())??;

        serde_json::from_slice(&bytes).map_err(|e| DecisionError::InvalidResponse(e.to_string()))
    }

    fn origin(&self) -> DecisionOrigin {
        DecisionOrigin::Remote
    }
}

fn oversized_body() -> DecisionError {
    DecisionError::InvalidResponse(format!(
        "response body exceeds {MAX_RESPONSE_SIZE} byte limit"
    ))
}

/// Reads the body chunk by chunk, stopping as soon as it passes `limit`.
async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, DecisionError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DecisionError::Network(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(oversized_body());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of [`resolve_with_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub result: DecisionResult,
    pub origin: DecisionOrigin,
    /// Time spent waiting on the source.
    pub latency: Duration,
    /// Failure cause when the fallback was substituted.
    pub failure: Option<&'static str>,
}

/// Asks `source` for a decision, bounded by `timeout`.
///
/// On any error or when `timeout` elapses, logs a warning, counts the
/// fallback and returns [`heuristic::fallback`] with origin
/// [`DecisionOrigin::Fallback`].
pub async fn resolve_with_fallback(
    source: &dyn DecisionSource,
    request: &DecisionRequest,
    timing: &Timing,
    timeout: Duration,
) -> Resolution {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, source.decide(request)).await {
        Ok(outcome) => outcome,
        #[allow(clippy::cast_possible_truncation)]
        Err(_) => Err(DecisionError::Timeout(timeout.as_millis() as u64)),
    };
    let latency = started.elapsed();
    let origin = source.origin();
    metrics::record_decision_latency(origin, latency);

    match outcome {
        Ok(result) => {
            debug!(
                origin = %origin,
                axis = %result.next_dir,
                green_ms = result.green_ms,
                reason = %result.reason,
                "decision obtained"
            );
            Resolution {
                result,
                origin,
                latency,
                failure: None,
            }
        }
        Err(e) => {
            warn!(origin = %origin, error = %e, "decision source failed, using fallback");
            metrics::record_fallback(e.cause());
            Resolution {
                result: heuristic::fallback(request, timing),
                origin: DecisionOrigin::Fallback,
                latency,
                failure: Some(e.cause()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis, QueueSnapshot};

    struct Failing(DecisionError);

    #[async_trait]
    impl DecisionSource for Failing {
        async fn decide(&self, _: &DecisionRequest) -> Result<DecisionResult, DecisionError> {
            Err(self.0.clone())
        }

        fn origin(&self) -> DecisionOrigin {
            DecisionOrigin::Remote
        }
    }

    struct Stalled;

    #[async_trait]
    impl DecisionSource for Stalled {
        async fn decide(&self, _: &DecisionRequest) -> Result<DecisionResult, DecisionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(DecisionError::Network("unreachable".to_string()))
        }

        fn origin(&self) -> DecisionOrigin {
            DecisionOrigin::Remote
        }
    }

    fn busy_b() -> DecisionRequest {
        DecisionRequest {
            counts: QueueSnapshot::new(1, 6, 0, 4),
            ..DecisionRequest::default()
        }
    }

    #[tokio::test]
    async fn local_source_matches_heuristic() {
        let timing = Timing::default();
        let source = LocalSource::new(timing.clone(), TieBreak::FavorA);
        let resolution =
            resolve_with_fallback(&source, &busy_b(), &timing, Duration::from_secs(1)).await;
        assert_eq!(resolution.origin, DecisionOrigin::Local);
        assert_eq!(resolution.failure, None);
        assert_eq!(
            resolution.result,
            heuristic::decide(&busy_b(), &timing, TieBreak::FavorA)
        );
    }

    #[tokio::test]
    async fn error_falls_back() {
        let timing = Timing::default();
        let source = Failing(DecisionError::HttpStatus(503));
        let resolution =
            resolve_with_fallback(&source, &busy_b(), &timing, Duration::from_secs(1)).await;
        assert_eq!(resolution.origin, DecisionOrigin::Fallback);
        assert_eq!(resolution.failure, Some("http_status"));
        assert_eq!(resolution.result.next_dir, Axis::B);
        assert_eq!(resolution.result.reason, "fallback");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_times_out() {
        let timing = Timing::default();
        let resolution =
            resolve_with_fallback(&Stalled, &busy_b(), &timing, Duration::from_millis(250)).await;
        assert_eq!(resolution.origin, DecisionOrigin::Fallback);
        assert_eq!(resolution.failure, Some("timeout"));
    }

    #[tokio::test]
    async fn unreachable_remote_is_a_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let source = RemoteSource::new("http://127.0.0.1:9/api/decision", Duration::from_secs(2))
            .expect("client");
        let err = source.decide(&busy_b()).await.unwrap_err();
        assert!(matches!(err, DecisionError::Network(_) | DecisionError::Timeout(_)));
    }
}
