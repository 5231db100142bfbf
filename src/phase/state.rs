//! Signal phases and the transitions between them.

use serde::Serialize;

use crate::decision::{DecisionOrigin, DecisionResult};
use crate::types::Axis;

/// Milliseconds since the simulation started.
pub type SimTime = u64;

/// Sub-step of a clearance interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearanceStep {
    /// Departing axis shows yellow.
    Yellow,
    /// Every approach shows red.
    AllRed,
    /// All-red pause reserved for pedestrians.
    Pedestrian,
}

impl ClearanceStep {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::AllRed => "all-red",
            Self::Pedestrian => "pedestrian",
        }
    }
}

/// The active signal phase. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    GreenA,
    GreenB,
    Clearance(ClearanceStep),
}

impl Phase {
    /// Green phase serving `axis`.
    #[must_use]
    pub const fn green(axis: Axis) -> Self {
        match axis {
            Axis::A => Self::GreenA,
            Axis::B => Self::GreenB,
        }
    }

    /// Axis holding green, or `None` during clearance.
    #[must_use]
    pub const fn green_axis(self) -> Option<Axis> {
        match self {
            Self::GreenA => Some(Axis::A),
            Self::GreenB => Some(Axis::B),
            Self::Clearance(_) => None,
        }
    }

    #[must_use]
    pub const fn is_clearance(self) -> bool {
        matches!(self, Self::Clearance(_))
    }

    /// Stable name used in logs, events and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GreenA => "green-a",
            Self::GreenB => "green-b",
            Self::Clearance(step) => step.label(),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Record of a phase change produced by [`PhaseMachine::step`].
///
/// [`PhaseMachine::step`]: super::PhaseMachine::step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A green ended; a decision boundary is open until the next green.
    ClearanceStarted {
        from: Axis,
        boundary: u64,
        step: ClearanceStep,
        at: SimTime,
        ends_at: SimTime,
    },
    /// Next sub-step of the same clearance interval.
    ClearanceStep {
        step: ClearanceStep,
        at: SimTime,
        ends_at: SimTime,
    },
    /// A green began.
    GreenStarted {
        axis: Axis,
        boundary: u64,
        decision: DecisionResult,
        origin: DecisionOrigin,
        at: SimTime,
        ends_at: SimTime,
    },
}

impl Transition {
    /// Phase entered by this transition.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::ClearanceStarted { step, .. } | Self::ClearanceStep { step, .. } => {
                Phase::Clearance(*step)
            }
            Self::GreenStarted { axis, .. } => Phase::green(*axis),
        }
    }

    /// When the entered phase started.
    #[must_use]
    pub const fn at(&self) -> SimTime {
        match self {
            Self::ClearanceStarted { at, .. }
            | Self::ClearanceStep { at, .. }
            | Self::GreenStarted { at, .. } => *at,
        }
    }

    /// Deadline of the entered phase.
    #[must_use]
    pub const fn ends_at(&self) -> SimTime {
        match self {
            Self::ClearanceStarted { ends_at, .. }
            | Self::ClearanceStep { ends_at, .. }
            | Self::GreenStarted { ends_at, .. } => *ends_at,
        }
    }
}

/// Result of offering a decision to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    /// The boundary it answers has already closed.
    StaleBoundary,
    /// No clearance interval is running.
    NotInClearance,
    /// A decision was already accepted for this boundary.
    AlreadyDecided,
}

impl OfferOutcome {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::StaleBoundary => "stale_boundary",
            Self::NotInClearance => "not_in_clearance",
            Self::AlreadyDecided => "already_decided",
        }
    }
}
