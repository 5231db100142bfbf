//! Structured event log.
//!
//! Typed simulation events serialized as newline-delimited JSON (JSONL),
//! each carrying a monotonically increasing sequence number. The emitter is
//! injected into the simulation; nothing writes to a global log.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::decision::DecisionOrigin;
use crate::types::{Axis, QueueSnapshot};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted by a simulation run.
///
/// Serialized with a `"type"` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    SimulationStarted {
        timestamp: DateTime<Utc>,
        run_id: Uuid,
        scenario: String,
        /// `"local"` or the remote decision URL.
        decision_source: String,
        seed: Option<u64>,
    },

    /// A phase (or clearance sub-step) began.
    PhaseEntered {
        timestamp: DateTime<Utc>,
        /// Simulation time at which the phase started.
        sim_time_ms: u64,
        phase: &'static str,
        ends_at_ms: u64,
    },

    /// A decision took effect at the start of a green.
    DecisionApplied {
        timestamp: DateTime<Utc>,
        sim_time_ms: u64,
        boundary: u64,
        axis: Axis,
        green_ms: u64,
        reason: String,
        origin: DecisionOrigin,
        queues: QueueSnapshot,
    },

    /// A decision result arrived too late or for a superseded run.
    DecisionDiscarded {
        timestamp: DateTime<Utc>,
        epoch: u64,
        boundary: u64,
        why: &'static str,
    },

    /// The intersection was replaced, possibly with a new scenario.
    SimulationReset {
        timestamp: DateTime<Utc>,
        epoch: u64,
        scenario: String,
    },

    SimulationStopped {
        timestamp: DateTime<Utc>,
        reason: StopReason,
        summary: RunSummary,
    },
}

/// Why a simulation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured run duration elapsed.
    DurationElapsed,
    /// Shutdown was requested.
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DurationElapsed => f.write_str("duration elapsed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Totals reported when a run stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scenario: String,
    /// Simulated time of the current epoch.
    pub sim_time_ms: u64,
    pub resets: u64,
    /// Greens started, one per completed decision boundary.
    pub greens: u64,
    pub local_decisions: u64,
    pub remote_decisions: u64,
    pub fallback_decisions: u64,
    pub discarded_decisions: u64,
    pub arrivals: u64,
    pub departures: u64,
    pub final_queues: QueueSnapshot,
}

impl RunSummary {
    /// Counts one applied decision under its origin.
    pub const fn count_decision(&mut self, origin: DecisionOrigin) {
        match origin {
            DecisionOrigin::Local => self.local_decisions += 1,
            DecisionOrigin::Remote => self.remote_decisions += 1,
            DecisionOrigin::Fallback => self.fallback_decisions += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Write failures are dropped; a broken event sink never stops a run.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Discards every event.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone, Default)]
    pub(crate) struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        pub(crate) fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }

        pub(crate) fn events(&self) -> Vec<serde_json::Value> {
            self.contents()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn applied() -> Event {
        Event::DecisionApplied {
            timestamp: DateTime::parse_from_rfc3339("2026-03-02T08:15:30Z")
                .unwrap()
                .with_timezone(&Utc),
            sim_time_ms: 11_000,
            boundary: 1,
            axis: Axis::B,
            green_ms: 12_000,
            reason: "fairness".to_owned(),
            origin: DecisionOrigin::Remote,
            queues: QueueSnapshot::new(1, 4, 0, 2),
        }
    }

    #[test]
    fn emitter_writes_flat_jsonl() {
        let tw = TestWriter::default();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(applied());

        let events = tw.events();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e["sequence"], 0);
        assert_eq!(e["type"], "DecisionApplied");
        assert_eq!(e["axis"], "B");
        assert_eq!(e["origin"], "remote");
        assert_eq!(e["queues"]["E"], 4);
        assert!(e.get("event").is_none());
    }

    #[test]
    fn emitter_increments_sequence() {
        let tw = TestWriter::default();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(applied());
        emitter.emit(Event::SimulationReset {
            timestamp: Utc::now(),
            epoch: 2,
            scenario: "rush".to_owned(),
        });

        assert_eq!(emitter.event_count(), 2);
        let events = tw.events();
        assert_eq!(events[1]["sequence"], 1);
        assert_eq!(events[1]["type"], "SimulationReset");
    }

    #[test]
    fn stopped_event_embeds_summary() {
        let mut summary = RunSummary {
            scenario: "free".to_owned(),
            ..RunSummary::default()
        };
        summary.count_decision(DecisionOrigin::Fallback);
        summary.count_decision(DecisionOrigin::Local);

        let json = serde_json::to_value(Event::SimulationStopped {
            timestamp: Utc::now(),
            reason: StopReason::DurationElapsed,
            summary,
        })
        .unwrap();
        assert_eq!(json["reason"], "duration_elapsed");
        assert_eq!(json["summary"]["fallback_decisions"], 1);
        assert_eq!(json["summary"]["local_decisions"], 1);
    }
}
