//! The signal controller.
//!
//! `GreenA → Clearance → GreenB → Clearance → …`, where the axis of each
//! green is whatever the decision for the preceding boundary chose. Time is
//! passed in explicitly so the machine stays deterministic under test; new
//! phases are anchored to the previous deadline, never to the observed
//! `now`, so a late tick does not stretch the schedule.

use tracing::trace;

use crate::config::schema::{ClearanceMode, Timing};
use crate::decision::{DecisionOrigin, DecisionResult};
use crate::types::Axis;

use super::state::{ClearanceStep, OfferOutcome, Phase, SimTime, Transition};

/// Green currently (or most recently) in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGreen {
    pub axis: Axis,
    pub green_ms: u64,
    pub reason: String,
    /// `None` for the initial minimum-green window.
    pub origin: Option<DecisionOrigin>,
}

/// Phase state machine for one intersection.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    timing: Timing,
    clearance: ClearanceMode,
    max_green_ms: u64,
    phase: Phase,
    phase_started_at: SimTime,
    phase_end_at: SimTime,
    boundary: u64,
    pending: Option<(DecisionResult, DecisionOrigin)>,
    active: ActiveGreen,
}

impl PhaseMachine {
    /// Starts in green A with a `min_green_ms` window.
    #[must_use]
    pub fn new(timing: Timing, clearance: ClearanceMode, now: SimTime) -> Self {
        let min = timing.min_green_ms;
        let max_green_ms = timing.max_green_ms;
        Self {
            timing,
            clearance,
            max_green_ms,
            phase: Phase::GreenA,
            phase_started_at: now,
            phase_end_at: now.saturating_add(min),
            boundary: 0,
            pending: None,
            active: ActiveGreen {
                axis: Axis::A,
                green_ms: min,
                reason: "initial".to_string(),
                origin: None,
            },
        }
    }

    /// Overrides the upper bound used when clamping accepted decisions.
    #[must_use]
    pub const fn with_max_green(mut self, max_green_ms: u64) -> Self {
        self.max_green_ms = max_green_ms;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn phase_end_at(&self) -> SimTime {
        self.phase_end_at
    }

    /// Sequence number of the most recent decision boundary (0 before the first).
    #[must_use]
    pub const fn boundary(&self) -> u64 {
        self.boundary
    }

    #[must_use]
    pub const fn active_green(&self) -> &ActiveGreen {
        &self.active
    }

    /// Whether a decision has been accepted for the open boundary.
    #[must_use]
    pub const fn has_pending_decision(&self) -> bool {
        self.pending.is_some()
    }

    /// Milliseconds until the current phase ends.
    #[must_use]
    pub const fn remaining_ms(&self, now: SimTime) -> u64 {
        self.phase_end_at.saturating_sub(now)
    }

    /// Advances at most one phase if `now` has reached the deadline.
    ///
    /// `fallback` is called only when a clearance interval ends without an
    /// accepted decision. Call repeatedly until `None` to catch up after a
    /// stall.
    pub fn step<F>(&mut self, now: SimTime, fallback: F) -> Option<Transition>
    where
        F: FnOnce() -> DecisionResult,
    {
        if now < self.phase_end_at {
            return None;
        }
        let at = self.phase_end_at;

        let transition = match self.phase {
            Phase::GreenA | Phase::GreenB => {
                let from = self.active.axis;
                self.boundary += 1;
                self.pending = None;
                let (step, duration) = self.first_clearance_step();
                let ends_at = self.enter(Phase::Clearance(step), at, duration);
                Transition::ClearanceStarted {
                    from,
                    boundary: self.boundary,
                    step,
                    at,
                    ends_at,
                }
            }
            Phase::Clearance(ClearanceStep::Yellow) => {
                let all_red_ms = match self.clearance {
                    ClearanceMode::YellowAllRed { all_red_ms, .. } => all_red_ms,
                    ClearanceMode::Pedestrian { .. } => 0,
                };
                let step = ClearanceStep::AllRed;
                let ends_at = self.enter(Phase::Clearance(step), at, all_red_ms);
                Transition::ClearanceStep { step, at, ends_at }
            }
            Phase::Clearance(ClearanceStep::AllRed | ClearanceStep::Pedestrian) => {
                let (decision, origin) = self
                    .pending
                    .take()
                    .unwrap_or_else(|| (fallback(), DecisionOrigin::Fallback));
                let decision = DecisionResult {
                    green_ms: self.timing.clamp_green(decision.green_ms, self.max_green_ms),
                    ..decision
                };
                let axis = decision.next_dir;
                let ends_at = self.enter(Phase::green(axis), at, decision.green_ms);
                self.active = ActiveGreen {
                    axis,
                    green_ms: decision.green_ms,
                    reason: decision.reason.clone(),
                    origin: Some(origin),
                };
                Transition::GreenStarted {
                    axis,
                    boundary: self.boundary,
                    decision,
                    origin,
                    at,
                    ends_at,
                }
            }
        };

        trace!(phase = %self.phase, at, ends_at = self.phase_end_at, "phase transition");
        Some(transition)
    }

    /// Offers a decision for `boundary`.
    ///
    /// Accepted only while that boundary's clearance interval is running and
    /// no other decision has been accepted for it. The duration is clamped
    /// again on acceptance.
    pub fn offer(
        &mut self,
        boundary: u64,
        result: DecisionResult,
        origin: DecisionOrigin,
    ) -> OfferOutcome {
        if boundary != self.boundary {
            return OfferOutcome::StaleBoundary;
        }
        if !self.phase.is_clearance() {
            return OfferOutcome::NotInClearance;
        }
        if self.pending.is_some() {
            return OfferOutcome::AlreadyDecided;
        }
        let green_ms = self.timing.clamp_green(result.green_ms, self.max_green_ms);
        self.pending = Some((DecisionResult { green_ms, ..result }, origin));
        OfferOutcome::Accepted
    }

    /// Lengthens the running green toward a total of `target_ms`.
    ///
    /// Adds at most `step_ms` per call and never lets the green outlast the
    /// active cap. Returns the milliseconds added; 0 outside a green, at or
    /// past the deadline, or once the green is already that long.
    pub fn extend_green(&mut self, now: SimTime, target_ms: u64, step_ms: u64) -> u64 {
        if self.phase.green_axis().is_none() || now >= self.phase_end_at {
            return 0;
        }
        let length = self.phase_end_at - self.phase_started_at;
        let goal = target_ms.min(self.max_green_ms);
        let extension = step_ms.min(goal.saturating_sub(length));
        if extension > 0 {
            self.phase_end_at += extension;
            self.active.green_ms = self.phase_end_at - self.phase_started_at;
            trace!(extension, ends_at = self.phase_end_at, "green extended");
        }
        extension
    }

    const fn first_clearance_step(&self) -> (ClearanceStep, u64) {
        match self.clearance {
            ClearanceMode::YellowAllRed { yellow_ms, .. } => (ClearanceStep::Yellow, yellow_ms),
            ClearanceMode::Pedestrian { pause_ms } => (ClearanceStep::Pedestrian, pause_ms),
        }
    }

    fn enter(&mut self, phase: Phase, at: SimTime, duration_ms: u64) -> SimTime {
        self.phase = phase;
        self.phase_started_at = at;
        self.phase_end_at = at.saturating_add(duration_ms);
        self.phase_end_at
    }
}

/// Green length a congestion score asks for: `min_green_ms` at 0, linear up
/// to `max_green_ms` at 100.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn score_target_ms(timing: &Timing, score: u8) -> u64 {
    let span = timing.max_green_ms.saturating_sub(timing.min_green_ms);
    let share = f64::from(score.min(100)) / 100.0;
    let extra = (span as f64 * share).round() as u64;
    timing.min_green_ms.saturating_add(extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(axis: Axis, green_ms: u64, reason: &str) -> DecisionResult {
        DecisionResult {
            next_dir: axis,
            green_ms,
            reason: reason.to_string(),
        }
    }

    fn machine() -> PhaseMachine {
        let clearance = ClearanceMode::YellowAllRed {
            yellow_ms: 3_000,
            all_red_ms: 1_000,
        };
        PhaseMachine::new(Timing::default(), clearance, 0)
    }

    fn no_fallback() -> DecisionResult {
        panic!("fallback must not be used")
    }

    #[test]
    fn starts_green_a_with_min_window() {
        let m = machine();
        assert_eq!(m.phase(), Phase::GreenA);
        assert_eq!(m.phase_end_at(), 7_000);
        assert_eq!(m.boundary(), 0);
    }

    #[test]
    fn no_transition_before_deadline() {
        let mut m = machine();
        assert!(m.step(6_999, no_fallback).is_none());
        assert_eq!(m.phase(), Phase::GreenA);
    }

    #[test]
    fn full_cycle_with_decision() {
        let mut m = machine();

        let t = m.step(7_000, no_fallback).unwrap();
        assert!(matches!(
            t,
            Transition::ClearanceStarted { from: Axis::A, boundary: 1, step: ClearanceStep::Yellow, at: 7_000, ends_at: 10_000 }
        ));

        assert!(m.offer(1, result(Axis::B, 12_000, "fairness"), DecisionOrigin::Local).is_accepted());

        let t = m.step(10_000, no_fallback).unwrap();
        assert_eq!(t.phase(), Phase::Clearance(ClearanceStep::AllRed));
        assert_eq!(t.ends_at(), 11_000);

        let t = m.step(11_000, no_fallback).unwrap();
        match t {
            Transition::GreenStarted { axis, decision, origin, ends_at, .. } => {
                assert_eq!(axis, Axis::B);
                assert_eq!(decision.reason, "fairness");
                assert_eq!(origin, DecisionOrigin::Local);
                assert_eq!(ends_at, 23_000);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.phase(), Phase::GreenB);
        assert_eq!(m.active_green().origin, Some(DecisionOrigin::Local));
    }

    #[test]
    fn clearance_without_decision_uses_fallback() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        m.step(10_000, no_fallback);
        let t = m
            .step(11_000, || result(Axis::B, 9_000, "fallback"))
            .unwrap();
        assert!(matches!(
            t,
            Transition::GreenStarted { axis: Axis::B, origin: DecisionOrigin::Fallback, .. }
        ));
    }

    #[test]
    fn stale_boundary_rejected() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        assert_eq!(
            m.offer(0, result(Axis::B, 9_000, "x"), DecisionOrigin::Remote),
            OfferOutcome::StaleBoundary
        );
        assert!(!m.has_pending_decision());
    }

    #[test]
    fn late_decision_after_green_started_is_rejected() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        m.step(10_000, no_fallback);
        m.step(11_000, || result(Axis::A, 7_000, "fallback"));
        assert_eq!(
            m.offer(1, result(Axis::B, 9_000, "late"), DecisionOrigin::Remote),
            OfferOutcome::NotInClearance
        );
        assert_eq!(m.phase(), Phase::GreenA);
    }

    #[test]
    fn only_first_offer_per_boundary_wins() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        assert!(m.offer(1, result(Axis::B, 9_000, "first"), DecisionOrigin::Local).is_accepted());
        assert_eq!(
            m.offer(1, result(Axis::A, 9_000, "second"), DecisionOrigin::Local),
            OfferOutcome::AlreadyDecided
        );
        m.step(10_000, no_fallback);
        let t = m.step(11_000, no_fallback).unwrap();
        assert_eq!(t.phase(), Phase::GreenB);
    }

    #[test]
    fn accepted_decision_is_clamped() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        m.offer(1, result(Axis::A, 999_999, "huge"), DecisionOrigin::Remote);
        m.step(10_000, no_fallback);
        m.step(11_000, no_fallback);
        assert_eq!(m.active_green().green_ms, 45_000);

        let mut m = machine().with_max_green(51_750);
        m.step(7_000, no_fallback);
        m.offer(1, result(Axis::A, 1, "tiny"), DecisionOrigin::Remote);
        m.step(10_000, no_fallback);
        m.step(11_000, no_fallback);
        assert_eq!(m.active_green().green_ms, 7_000);
    }

    #[test]
    fn same_axis_passes_through_clearance() {
        let mut m = machine();
        m.step(7_000, no_fallback);
        m.offer(1, result(Axis::A, 8_000, "fairness"), DecisionOrigin::Local);
        assert!(m.step(10_000, no_fallback).unwrap().phase().is_clearance());
        let t = m.step(11_000, no_fallback).unwrap();
        assert_eq!(t.phase(), Phase::GreenA);
    }

    #[test]
    fn pedestrian_mode_has_single_step() {
        let mut m = PhaseMachine::new(
            Timing::default(),
            ClearanceMode::Pedestrian { pause_ms: 5_000 },
            0,
        );
        let t = m.step(7_000, no_fallback).unwrap();
        assert_eq!(t.phase(), Phase::Clearance(ClearanceStep::Pedestrian));
        assert_eq!(t.ends_at(), 12_000);
        let t = m.step(12_000, || result(Axis::B, 7_000, "fallback")).unwrap();
        assert_eq!(t.phase(), Phase::GreenB);
    }

    #[test]
    fn catch_up_after_stall_is_anchored_to_deadlines() {
        let mut m = machine();
        let mut phases = Vec::new();
        while let Some(t) = m.step(30_000, || result(Axis::B, 7_000, "fallback")) {
            phases.push((t.phase(), t.at()));
        }
        assert_eq!(
            phases,
            vec![
                (Phase::Clearance(ClearanceStep::Yellow), 7_000),
                (Phase::Clearance(ClearanceStep::AllRed), 10_000),
                (Phase::GreenB, 11_000),
                (Phase::Clearance(ClearanceStep::Yellow), 18_000),
                (Phase::Clearance(ClearanceStep::AllRed), 21_000),
                (Phase::GreenB, 22_000),
                (Phase::Clearance(ClearanceStep::Yellow), 29_000),
            ]
        );
        assert_eq!(m.phase_end_at(), 32_000);
        assert_eq!(m.boundary(), 3);
    }

    #[test]
    fn default_clearance_is_yellow_then_short_all_red() {
        let mut m = PhaseMachine::new(Timing::default(), ClearanceMode::default(), 0);
        m.step(7_000, no_fallback);
        let t = m.step(10_000, no_fallback).unwrap();
        assert_eq!(t.ends_at(), 10_800);
    }

    #[test]
    fn score_target_spans_green_bounds() {
        let timing = Timing::default();
        assert_eq!(score_target_ms(&timing, 0), 7_000);
        assert_eq!(score_target_ms(&timing, 50), 26_000);
        assert_eq!(score_target_ms(&timing, 100), 45_000);
        assert_eq!(score_target_ms(&timing, 255), 45_000);
    }

    #[test]
    fn extension_moves_deadline_in_bounded_steps() {
        let mut m = machine();
        assert_eq!(m.extend_green(6_000, 8_000, 300), 300);
        assert_eq!(m.phase_end_at(), 7_300);
        assert_eq!(m.active_green().green_ms, 7_300);

        // Only the shortfall is added once close to the target.
        assert_eq!(m.extend_green(6_100, 7_400, 300), 100);
        assert_eq!(m.phase_end_at(), 7_400);

        // Already as long as the target.
        assert_eq!(m.extend_green(6_200, 7_400, 300), 0);
        assert_eq!(m.extend_green(6_200, 7_000, 300), 0);
        assert_eq!(m.phase_end_at(), 7_400);
    }

    #[test]
    fn extension_never_passes_the_green_cap() {
        let mut m = machine();
        let mut now = 0;
        while now < m.phase_end_at() {
            m.extend_green(now, 45_000, 300);
            now += 100;
        }
        assert_eq!(m.phase_end_at(), 45_000);
        assert_eq!(m.active_green().green_ms, 45_000);

        let mut m = machine().with_max_green(51_750);
        let mut now = 0;
        while now < m.phase_end_at() {
            m.extend_green(now, 60_000, 300);
            now += 100;
        }
        assert_eq!(m.phase_end_at(), 51_750);
    }

    #[test]
    fn extension_is_ignored_outside_green() {
        let mut m = machine();
        assert_eq!(m.extend_green(7_000, 30_000, 300), 0);
        m.step(7_000, no_fallback);
        assert_eq!(m.extend_green(8_000, 30_000, 300), 0);
        assert_eq!(m.phase_end_at(), 10_000);
    }
}
