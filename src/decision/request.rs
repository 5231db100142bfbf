//! Decision wire types.
//!
//! Field names match the JSON contract of `POST /api/decision`. Decoding is
//! lenient: a missing, null, negative, non-finite or non-numeric count or
//! wait reads as zero, so a malformed snapshot degrades to "no pressure"
//! instead of failing the request. A missing or unreadable `scenarioId` reads
//! as `free` and `lastGreenDir` as `A`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{Axis, Direction, PerDirection, QueueSnapshot, WaitSnapshot};

/// Scenario assumed when a request names none.
pub const DEFAULT_SCENARIO_ID: &str = "free";

/// Inputs of one scheduling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(default, deserialize_with = "lenient_counts")]
    pub counts: QueueSnapshot,

    #[serde(default, deserialize_with = "lenient_waits")]
    pub waits: WaitSnapshot,

    #[serde(default = "default_scenario_id", deserialize_with = "lenient_scenario")]
    pub scenario_id: String,

    #[serde(default, deserialize_with = "lenient_axis")]
    pub last_green_dir: Axis,

    #[serde(default, rename = "outflowNS", deserialize_with = "lenient_bool")]
    pub outflow_ns: bool,

    #[serde(default, rename = "outflowEW", deserialize_with = "lenient_bool")]
    pub outflow_ew: bool,
}

impl Default for DecisionRequest {
    fn default() -> Self {
        Self {
            counts: QueueSnapshot::default(),
            waits: WaitSnapshot::default(),
            scenario_id: default_scenario_id(),
            last_green_dir: Axis::default(),
            outflow_ns: false,
            outflow_ew: false,
        }
    }
}

impl DecisionRequest {
    /// Outflow flag for `axis`.
    #[must_use]
    pub const fn outflow(&self, axis: Axis) -> bool {
        match axis {
            Axis::A => self.outflow_ns,
            Axis::B => self.outflow_ew,
        }
    }
}

/// Next green axis and its duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    pub next_dir: Axis,
    pub green_ms: u64,
    pub reason: String,
}

/// Where an applied decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOrigin {
    /// In-process heuristic.
    Local,
    /// Remote decision service.
    Remote,
    /// Load-only formula substituted after a failure or a missed deadline.
    Fallback,
}

impl DecisionOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for DecisionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lenient Decoding
// ============================================================================

fn lookup<'a>(map: &'a serde_json::Map<String, Value>, direction: Direction) -> Option<&'a Value> {
    let short = direction.label();
    let long = match direction {
        Direction::North => "north",
        Direction::East => "east",
        Direction::South => "south",
        Direction::West => "west",
    };
    map.get(short)
        .or_else(|| map.get(&short.to_ascii_lowercase()))
        .or_else(|| map.get(long))
}

/// Reads a non-negative finite number, or zero.
fn non_negative(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 { n } else { 0.0 }
}

fn per_direction<T>(value: &Value, convert: impl Fn(f64) -> T) -> PerDirection<T> {
    match value {
        Value::Object(map) => {
            PerDirection::from_fn(|d| convert(non_negative(lookup(map, d))))
        }
        _ => PerDirection::from_fn(|_| convert(0.0)),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_count(n: f64) -> u32 {
    // Saturating float-to-int cast; `n` is already non-negative and finite.
    n.floor() as u32
}

fn lenient_counts<'de, D: Deserializer<'de>>(de: D) -> Result<QueueSnapshot, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(per_direction(&value, to_count))
}

fn lenient_waits<'de, D: Deserializer<'de>>(de: D) -> Result<WaitSnapshot, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(per_direction(&value, |n| n))
}

fn default_scenario_id() -> String {
    DEFAULT_SCENARIO_ID.to_string()
}

fn lenient_scenario<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) if !s.is_empty() => s,
        _ => default_scenario_id(),
    })
}

fn lenient_axis<'de, D: Deserializer<'de>>(de: D) -> Result<Axis, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "B" | "EW" => Axis::B,
            _ => Axis::A,
        },
        _ => Axis::A,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(de)?, Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_the_documented_shape() {
        let req: DecisionRequest = serde_json::from_value(json!({
            "counts": {"N": 5, "E": 3, "S": 4, "W": 2},
            "waits": {"N": 10, "E": 20.5, "S": 5, "W": 15},
            "scenarioId": "free",
            "lastGreenDir": "A",
            "outflowNS": true,
            "outflowEW": false
        }))
        .unwrap();
        assert_eq!(req.counts, QueueSnapshot::new(5, 3, 4, 2));
        assert!((req.waits.east - 20.5).abs() < f64::EPSILON);
        assert_eq!(req.scenario_id, "free");
        assert_eq!(req.last_green_dir, Axis::A);
        assert!(req.outflow(Axis::A));
        assert!(!req.outflow(Axis::B));
    }

    #[test]
    fn empty_object_defaults_to_zero() {
        let req: DecisionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, DecisionRequest::default());
    }

    #[test]
    fn malformed_fields_default_to_zero() {
        let req: DecisionRequest = serde_json::from_value(json!({
            "counts": {"N": -4, "E": "7", "S": null, "W": 2.9},
            "waits": "soon",
            "scenarioId": 12,
            "lastGreenDir": "Z",
            "outflowNS": "yes"
        }))
        .unwrap();
        assert_eq!(req.counts, QueueSnapshot::new(0, 7, 0, 2));
        assert_eq!(req.waits, WaitSnapshot::default());
        assert_eq!(req.scenario_id, "free");
        assert_eq!(req.last_green_dir, Axis::A);
        assert!(!req.outflow_ns);
    }

    #[test]
    fn missing_context_reads_as_free_after_a() {
        let req: DecisionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.scenario_id, "free");
        assert_eq!(req.last_green_dir, Axis::A);

        let req: DecisionRequest =
            serde_json::from_value(json!({"lastGreenDir": "b", "scenarioId": "rush"})).unwrap();
        assert_eq!(req.last_green_dir, Axis::B);
        assert_eq!(req.scenario_id, "rush");
    }

    #[test]
    fn null_snapshots_default_to_zero() {
        let req: DecisionRequest =
            serde_json::from_value(json!({"counts": null, "waits": null})).unwrap();
        assert_eq!(req.counts.total(), 0);
    }

    #[test]
    fn accepts_long_direction_names() {
        let req: DecisionRequest =
            serde_json::from_value(json!({"counts": {"north": 3, "w": 1}})).unwrap();
        assert_eq!(req.counts, QueueSnapshot::new(3, 0, 0, 1));
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = DecisionResult {
            next_dir: Axis::B,
            green_ms: 12_000,
            reason: "fairness".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"nextDir": "B", "greenMs": 12000, "reason": "fairness"})
        );
    }

    #[test]
    fn request_serializes_outflow_names() {
        let value = serde_json::to_value(DecisionRequest::default()).unwrap();
        assert!(value.get("outflowNS").is_some());
        assert!(value.get("outflowEW").is_some());
        assert!(value.get("scenarioId").is_some());
    }
}
