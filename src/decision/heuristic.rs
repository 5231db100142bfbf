//! Green-axis and green-duration heuristic.
//!
//! Rules, in priority order:
//!
//! 1. **Max-wait**: a direction that has waited at least `max_wait_s` forces
//!    its axis with a fixed `max_wait_green_ms`.
//! 2. **Fairness**: each axis scores `Σ count * (1 + wait / max_wait_s)`;
//!    the higher score wins, ties follow the [`TieBreak`] policy.
//! 3. **Incident**: in the `incident` scenario axis A wins only with a
//!    strictly larger combined queue, otherwise axis B; the green cap is
//!    raised.
//! 4. **Base duration**: `min_green + min(base_cap, total * queue_weight +
//!    mean_wait * wait_weight)`.
//! 5. **Platoon**: a bonus when the chosen axis' queue is shrinking.
//! 6. **Clamp** into `[min_green, cap]`.
//!
//! Everything here is a pure function of its arguments.

use crate::config::schema::{INCIDENT_SCENARIO, TieBreak, Timing};
use crate::types::{Axis, QueueSnapshot};

use super::request::{DecisionRequest, DecisionResult};

/// Reason tag of a starvation-forced decision.
pub const REASON_MAX_WAIT: &str = "max-wait";
/// Reason tag of an incident-forced decision.
pub const REASON_INCIDENT: &str = "incident";
/// Reason tag when the fairness score decided.
pub const REASON_FAIRNESS: &str = "fairness";
/// Reason tag of the load-only fallback formula.
pub const REASON_FALLBACK: &str = "fallback";
/// Suffix appended when the platoon bonus was granted.
pub const PLATOON_SUFFIX: &str = "+platoon";

/// Computes the next green axis and its duration.
#[must_use]
pub fn decide(request: &DecisionRequest, timing: &Timing, tie_break: TieBreak) -> DecisionResult {
    let (longest, longest_wait) = request.waits.max_entry();
    if longest_wait >= timing.max_wait_s {
        return DecisionResult {
            next_dir: longest.axis(),
            green_ms: timing.clamp_green(timing.max_wait_green_ms, timing.max_green_ms),
            reason: REASON_MAX_WAIT.to_string(),
        };
    }

    let score_a = fairness_score(request, Axis::A, timing.max_wait_s);
    let score_b = fairness_score(request, Axis::B, timing.max_wait_s);

    let (mut axis, mut reason) = if score_a > score_b {
        (Axis::A, REASON_FAIRNESS)
    } else if score_b > score_a {
        (Axis::B, REASON_FAIRNESS)
    } else {
        match tie_break {
            TieBreak::FavorA => (Axis::A, "tie-favor-a"),
            TieBreak::Alternate => (request.last_green_dir.other(), "tie-alternate"),
        }
    };

    let mut max_green = timing.max_green_ms;
    if request.scenario_id == INCIDENT_SCENARIO {
        max_green = timing.incident_max_green_ms();
        let queue_a = request.counts.axis_total(Axis::A);
        let queue_b = request.counts.axis_total(Axis::B);
        axis = if queue_a > queue_b { Axis::A } else { Axis::B };
        reason = REASON_INCIDENT;
    }

    let mut green_ms = base_duration(
        timing,
        request.counts.total(),
        request.waits.mean() * f64_from(timing.wait_weight_ms),
    );

    let mut reason = reason.to_string();
    if request.outflow(axis) {
        green_ms = green_ms.saturating_add(timing.platoon_bonus_ms);
        reason.push_str(PLATOON_SUFFIX);
    }

    DecisionResult {
        next_dir: axis,
        green_ms: timing.clamp_green(green_ms, max_green),
        reason,
    }
}

/// Load-only formula used when no heuristic answer is available in time.
///
/// Serves the axis with the larger combined queue (alternating on ties) for
/// a duration that depends on queue length alone.
#[must_use]
pub fn fallback(request: &DecisionRequest, timing: &Timing) -> DecisionResult {
    let queue_a = request.counts.axis_total(Axis::A);
    let queue_b = request.counts.axis_total(Axis::B);
    let axis = match queue_a.cmp(&queue_b) {
        std::cmp::Ordering::Greater => Axis::A,
        std::cmp::Ordering::Less => Axis::B,
        std::cmp::Ordering::Equal => request.last_green_dir.other(),
    };

    let green_ms = base_duration(timing, request.counts.total(), 0.0);

    DecisionResult {
        next_dir: axis,
        green_ms: timing.clamp_green(green_ms, timing.max_green_ms),
        reason: REASON_FALLBACK.to_string(),
    }
}

/// Queue-shrink flags per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutflowFlags {
    pub ns: bool,
    pub ew: bool,
}

/// Compares two snapshots taken at consecutive green→clearance boundaries.
///
/// An axis has outflow when its combined queue is strictly smaller now than
/// at the previous boundary.
#[must_use]
pub fn outflow_flags(previous: &QueueSnapshot, current: &QueueSnapshot) -> OutflowFlags {
    OutflowFlags {
        ns: current.axis_total(Axis::A) < previous.axis_total(Axis::A),
        ew: current.axis_total(Axis::B) < previous.axis_total(Axis::B),
    }
}

/// `Σ count[d] * (1 + wait[d] / max_wait_s)` over the directions of `axis`.
#[must_use]
pub fn fairness_score(request: &DecisionRequest, axis: Axis, max_wait_s: f64) -> f64 {
    axis.directions()
        .iter()
        .map(|&d| {
            let count = f64::from(*request.counts.get(d));
            count * (1.0 + *request.waits.get(d) / max_wait_s)
        })
        .sum()
}

#[allow(clippy::cast_precision_loss)]
fn f64_from(v: u64) -> f64 {
    v as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn base_duration(timing: &Timing, total_queue: u64, wait_term_ms: f64) -> u64 {
    let load_ms = f64_from(total_queue) * f64_from(timing.queue_weight_ms) + wait_term_ms;
    let capped = load_ms.clamp(0.0, f64_from(timing.base_cap_ms));
    timing.min_green_ms.saturating_add(capped.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MAX_GREEN_MS, MIN_GREEN_MS};
    use crate::types::WaitSnapshot;
    use proptest::prelude::*;

    fn request(counts: QueueSnapshot, waits: WaitSnapshot, scenario: &str) -> DecisionRequest {
        DecisionRequest {
            counts,
            waits,
            scenario_id: scenario.to_string(),
            last_green_dir: Axis::A,
            outflow_ns: false,
            outflow_ew: false,
        }
    }

    fn decide_default(req: &DecisionRequest) -> DecisionResult {
        decide(req, &Timing::default(), TieBreak::FavorA)
    }

    #[test]
    fn worked_example_picks_axis_a() {
        let req = request(
            QueueSnapshot::new(5, 3, 4, 2),
            WaitSnapshot::new(10.0, 20.0, 5.0, 15.0),
            "free",
        );
        let score_a = fairness_score(&req, Axis::A, 90.0);
        let score_b = fairness_score(&req, Axis::B, 90.0);
        assert!((score_a - 9.777_777).abs() < 1e-4, "{score_a}");
        assert!((score_b - 6.0).abs() < 1e-9, "{score_b}");

        let result = decide_default(&req);
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.reason, "fairness");
        // 7000 + 14 * 800 + 12.5 * 120
        assert_eq!(result.green_ms, 19_700);
    }

    #[test]
    fn max_wait_forces_the_starved_axis() {
        let req = request(
            QueueSnapshot::new(0, 30, 0, 30),
            WaitSnapshot::new(95.0, 0.0, 0.0, 0.0),
            "rush",
        );
        let result = decide_default(&req);
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.green_ms, 15_000);
        assert_eq!(result.reason, "max-wait");
    }

    #[test]
    fn max_wait_applies_in_incident_too() {
        let req = request(
            QueueSnapshot::new(0, 30, 0, 30),
            WaitSnapshot::new(0.0, 0.0, 0.0, 0.0),
            "incident",
        );
        let mut starved = req.clone();
        starved.waits.south = 90.0;
        let result = decide_default(&starved);
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.reason, "max-wait");
    }

    #[test]
    fn largest_wait_wins_among_several_starved() {
        let req = request(
            QueueSnapshot::splat(1),
            WaitSnapshot::new(91.0, 120.0, 95.0, 0.0),
            "free",
        );
        assert_eq!(decide_default(&req).next_dir, Axis::B);
    }

    #[test]
    fn all_zero_yields_minimum_green() {
        let result = decide_default(&DecisionRequest::default());
        assert_eq!(result.green_ms, MIN_GREEN_MS);
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.reason, "tie-favor-a");
    }

    #[test]
    fn alternate_tie_break_rotates_away_from_last_green() {
        let mut req = DecisionRequest::default();
        req.last_green_dir = Axis::A;
        let result = decide(&req, &Timing::default(), TieBreak::Alternate);
        assert_eq!(result.next_dir, Axis::B);
        assert_eq!(result.reason, "tie-alternate");

        req.last_green_dir = Axis::B;
        let result = decide(&req, &Timing::default(), TieBreak::Alternate);
        assert_eq!(result.next_dir, Axis::A);
    }

    #[test]
    fn missing_last_green_alternates_to_b() {
        let req: DecisionRequest = serde_json::from_str("{}").unwrap();
        let result = decide(&req, &Timing::default(), TieBreak::Alternate);
        assert_eq!(result.next_dir, Axis::B);
        assert_eq!(fallback(&req, &Timing::default()).next_dir, Axis::B);
    }

    #[test]
    fn incident_prefers_longer_queue_over_score() {
        // Axis B is older, so it wins on score; axis A has more vehicles.
        let req = request(
            QueueSnapshot::new(6, 5, 0, 0),
            WaitSnapshot::new(0.0, 89.0, 0.0, 0.0),
            "incident",
        );
        assert!(fairness_score(&req, Axis::B, 90.0) > fairness_score(&req, Axis::A, 90.0));
        let result = decide_default(&req);
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.reason, "incident");
    }

    #[test]
    fn incident_with_equal_queues_serves_axis_b() {
        // Axis A wins on score, but queues are level.
        let req = request(
            QueueSnapshot::new(3, 3, 0, 0),
            WaitSnapshot::new(60.0, 0.0, 0.0, 0.0),
            "incident",
        );
        assert!(fairness_score(&req, Axis::A, 90.0) > fairness_score(&req, Axis::B, 90.0));
        let result = decide_default(&req);
        assert_eq!(result.next_dir, Axis::B);
        assert_eq!(result.reason, "incident");

        let empty = request(QueueSnapshot::default(), WaitSnapshot::default(), "incident");
        assert_eq!(decide_default(&empty).next_dir, Axis::B);
    }

    #[test]
    fn incident_raises_the_cap() {
        let mut req = request(QueueSnapshot::splat(100), WaitSnapshot::splat(10.0), "incident");
        req.outflow_ns = true;
        req.outflow_ew = true;
        let result = decide_default(&req);
        // 7000 + 38000 + 2500, under the raised cap of 51750
        assert_eq!(result.green_ms, 47_500);

        req.scenario_id = "free".to_string();
        assert_eq!(decide_default(&req).green_ms, MAX_GREEN_MS);
    }

    #[test]
    fn platoon_bonus_only_for_chosen_axis() {
        let mut req = request(QueueSnapshot::new(4, 1, 0, 0), WaitSnapshot::default(), "free");
        req.outflow_ew = true;
        let without = decide_default(&req);
        assert_eq!(without.next_dir, Axis::A);
        assert_eq!(without.reason, "fairness");

        req.outflow_ns = true;
        let with = decide_default(&req);
        assert_eq!(with.green_ms, without.green_ms + 2_500);
        assert_eq!(with.reason, "fairness+platoon");
    }

    #[test]
    fn base_duration_is_capped() {
        let req = request(QueueSnapshot::splat(1_000), WaitSnapshot::default(), "free");
        assert_eq!(decide_default(&req).green_ms, MIN_GREEN_MS + 38_000);
    }

    #[test]
    fn fallback_uses_load_only() {
        let mut req = request(
            QueueSnapshot::new(1, 4, 1, 4),
            WaitSnapshot::new(80.0, 0.0, 80.0, 0.0),
            "free",
        );
        let result = fallback(&req, &Timing::default());
        assert_eq!(result.next_dir, Axis::B);
        assert_eq!(result.green_ms, 7_000 + 10 * 800);
        assert_eq!(result.reason, "fallback");

        req.counts = QueueSnapshot::default();
        req.last_green_dir = Axis::B;
        let result = fallback(&req, &Timing::default());
        assert_eq!(result.next_dir, Axis::A);
        assert_eq!(result.green_ms, MIN_GREEN_MS);
    }

    #[test]
    fn outflow_requires_strict_decrease() {
        let previous = QueueSnapshot::new(5, 2, 5, 2);
        let flags = outflow_flags(&previous, &QueueSnapshot::new(4, 2, 5, 3));
        assert_eq!(flags, OutflowFlags { ns: true, ew: false });
        let flags = outflow_flags(&previous, &previous);
        assert_eq!(flags, OutflowFlags::default());
    }

    fn arb_request() -> impl Strategy<Value = DecisionRequest> {
        (
            proptest::array::uniform4(0u32..500),
            proptest::array::uniform4(0.0f64..200.0),
            prop_oneof![Just("free"), Just("rush"), Just("incident")],
            prop_oneof![Just(Axis::A), Just(Axis::B)],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(c, w, scenario, last, ns, ew)| DecisionRequest {
                counts: QueueSnapshot::new(c[0], c[1], c[2], c[3]),
                waits: WaitSnapshot::new(w[0], w[1], w[2], w[3]),
                scenario_id: scenario.to_string(),
                last_green_dir: last,
                outflow_ns: ns,
                outflow_ew: ew,
            })
    }

    proptest! {
        #[test]
        fn green_always_within_bounds(req in arb_request()) {
            let timing = Timing::default();
            let result = decide(&req, &timing, TieBreak::Alternate);
            let cap = if req.scenario_id == "incident" {
                timing.incident_max_green_ms()
            } else {
                timing.max_green_ms
            };
            prop_assert!(result.green_ms >= timing.min_green_ms);
            prop_assert!(result.green_ms <= cap);

            let fb = fallback(&req, &timing);
            prop_assert!(fb.green_ms >= timing.min_green_ms);
            prop_assert!(fb.green_ms <= timing.max_green_ms);
        }

        #[test]
        fn starved_direction_is_always_served(req in arb_request()) {
            let result = decide(&req, &Timing::default(), TieBreak::FavorA);
            let (longest, wait) = req.waits.max_entry();
            if wait >= 90.0 {
                prop_assert!(result.next_dir.contains(longest));
                prop_assert_eq!(result.reason.as_str(), "max-wait");
            } else {
                prop_assert_ne!(result.reason.as_str(), "max-wait");
            }
        }

        #[test]
        fn decision_is_deterministic(req in arb_request()) {
            let timing = Timing::default();
            prop_assert_eq!(
                decide(&req, &timing, TieBreak::Alternate),
                decide(&req.clone(), &timing, TieBreak::Alternate)
            );
        }

        #[test]
        fn incident_follows_longer_queue(req in arb_request()) {
            let mut req = req;
            req.scenario_id = "incident".to_string();
            req.waits = WaitSnapshot::from_fn(|d| req.waits.get(d).min(89.0));
            let a = req.counts.axis_total(Axis::A);
            let b = req.counts.axis_total(Axis::B);
            prop_assume!(a != b);
            let result = decide(&req, &Timing::default(), TieBreak::FavorA);
            prop_assert_eq!(result.next_dir, if a > b { Axis::A } else { Axis::B });
        }
    }
}
