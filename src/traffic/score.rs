//! Congestion score (`0..=100`) served at `/api/traffic`.
//!
//! The score is an opaque external signal. Locally it is a scenario baseline
//! plus jitter, cached per scenario; remotely it is read with a bounded
//! timeout and degrades to the last known value.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DecisionError;

/// Score reported when nothing better is known.
pub const NEUTRAL_SCORE: u8 = 50;

/// Maximum jitter applied around a scenario's baseline.
const JITTER: i16 = 10;

/// Body of `GET /api/traffic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficScore {
    pub score: u8,
}

/// Arrival-rate scale derived from a score: `0.5` at 0, `1.5` at 100.
#[must_use]
pub fn multiplier(score: u8) -> f64 {
    0.5 + f64::from(score.min(100)) / 100.0
}

// ============================================================================
// Local Generator
// ============================================================================

struct CachedScore {
    score: u8,
    generated_at: Instant,
}

/// Per-scenario mock score generator with a TTL cache.
pub struct ScoreCache {
    ttl: Duration,
    entries: DashMap<String, CachedScore>,
    rng: Mutex<StdRng>,
}

impl ScoreCache {
    #[must_use]
    pub fn new(ttl: Duration, seed: Option<u64>) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            rng: Mutex::new(seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)),
        }
    }

    /// Returns the cached score for `scenario_id`, generating a fresh one
    /// from `baseline` once the entry is older than the TTL.
    pub fn score(&self, scenario_id: &str, baseline: u8) -> u8 {
        if let Some(entry) = self.entries.get(scenario_id) {
            if entry.generated_at.elapsed() < self.ttl {
                return entry.score;
            }
        }
        let score = self.generate(baseline);
        self.entries.insert(
            scenario_id.to_string(),
            CachedScore {
                score,
                generated_at: Instant::now(),
            },
        );
        debug!(scenario = scenario_id, score, "generated traffic score");
        score
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn generate(&self, baseline: u8) -> u8 {
        let jitter = self
            .rng
            .lock()
            .map_or(0, |mut rng| rng.random_range(-JITTER..=JITTER));
        (i16::from(baseline.min(100)) + jitter).clamp(0, 100) as u8
    }
}

// ============================================================================
// Remote Client
// ============================================================================

/// Reads the score from a remote `/api/traffic` endpoint.
pub struct TrafficScoreClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    last: Mutex<Option<u8>>,
}

impl TrafficScoreClient {
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
            last: Mutex::new(None),
        })
    }

    /// Fetches the score for `scenario_id`.
    ///
    /// On failure returns the last successfully read score, or
    /// [`NEUTRAL_SCORE`] if there is none.
    pub async fn fetch(&self, scenario_id: &str) -> u8 {
        match self.try_fetch(scenario_id).await {
            Ok(score) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(score);
                }
                score
            }
            Err(e) => {
                let fallback = self.last.lock().ok().and_then(|l| *l).unwrap_or(NEUTRAL_SCORE);
                warn!(url = %self.url, error = %e, fallback, "traffic score unavailable");
                fallback
            }
        }
    }

    async fn try_fetch(&self, scenario_id: &str) -> Result<u8, DecisionError> {
        let request = self.client.get(&self.url).query(&[("scenario", scenario_id)]);
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| DecisionError::Timeout(timeout_ms))?
            .map_err(|e| DecisionError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DecisionError::HttpStatus(response.status().as_u16()));
        }
        let body: TrafficScore = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| DecisionError::Timeout(timeout_ms))?
            .map_err(|e| DecisionError::InvalidResponse(e.to_string()))?;
        Ok(body.score.min(100))
    }
}

/// Where the simulation reads its congestion score from.
pub enum ScoreSource {
    Local(std::sync::Arc<ScoreCache>),
    Remote(TrafficScoreClient),
}

impl ScoreSource {
    pub async fn score(&self, scenario_id: &str, baseline: u8) -> u8 {
        match self {
            Self::Local(cache) => cache.score(scenario_id, baseline),
            Self::Remote(client) => client.fetch(scenario_id).await,
        }
    }
}
