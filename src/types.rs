//! Intersection geometry shared by every subsystem.
//!
//! Four approach directions grouped into two perpendicular axes. Axis A
//! carries North/South traffic, axis B carries East/West traffic; the two
//! directions of an axis always share a green.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An approach direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
}

impl Direction {
    /// All directions in canonical N, E, S, W order.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// The axis this direction belongs to.
    #[must_use]
    pub const fn axis(self) -> Axis {
        match self {
            Self::North | Self::South => Axis::A,
            Self::East | Self::West => Axis::B,
        }
    }

    /// Single-letter label used on the wire and in metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::North => "N",
            Self::East => "E",
            Self::South => "S",
            Self::West => "W",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pair of opposite directions sharing a green phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    /// North/South.
    #[default]
    A,
    /// East/West.
    B,
}

impl Axis {
    /// The two directions served by this axis.
    #[must_use]
    pub const fn directions(self) -> [Direction; 2] {
        match self {
            Self::A => [Direction::North, Direction::South],
            Self::B => [Direction::East, Direction::West],
        }
    }

    /// The perpendicular axis.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Whether `direction` is served by this axis.
    #[must_use]
    pub fn contains(self, direction: Direction) -> bool {
        direction.axis() == self
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per approach direction.
///
/// Serializes as `{"N": .., "E": .., "S": .., "W": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerDirection<T> {
    #[serde(rename = "N")]
    pub north: T,
    #[serde(rename = "E")]
    pub east: T,
    #[serde(rename = "S")]
    pub south: T,
    #[serde(rename = "W")]
    pub west: T,
}

impl<T> PerDirection<T> {
    #[must_use]
    pub const fn new(north: T, east: T, south: T, west: T) -> Self {
        Self {
            north,
            east,
            south,
            west,
        }
    }

    #[must_use]
    pub const fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::North => &self.north,
            Direction::East => &self.east,
            Direction::South => &self.south,
            Direction::West => &self.west,
        }
    }

    pub const fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::North => &mut self.north,
            Direction::East => &mut self.east,
            Direction::South => &mut self.south,
            Direction::West => &mut self.west,
        }
    }

    /// Iterates `(direction, value)` pairs in N, E, S, W order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &T)> {
        Direction::ALL.into_iter().map(move |d| (d, self.get(d)))
    }

    /// Builds a new set by applying `f` to each direction.
    #[must_use]
    pub fn from_fn(mut f: impl FnMut(Direction) -> T) -> Self {
        Self::new(
            f(Direction::North),
            f(Direction::East),
            f(Direction::South),
            f(Direction::West),
        )
    }
}

impl<T: Copy> PerDirection<T> {
    /// Same value for every direction.
    #[must_use]
    pub const fn splat(value: T) -> Self {
        Self::new(value, value, value, value)
    }
}

/// Waiting vehicles per direction.
pub type QueueSnapshot = PerDirection<u32>;

/// Seconds since each direction last had green.
pub type WaitSnapshot = PerDirection<f64>;

impl PerDirection<u32> {
    /// Vehicles waiting across all four approaches.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, &c)| u64::from(c)).sum()
    }

    /// Vehicles waiting on the two approaches of `axis`.
    #[must_use]
    pub fn axis_total(&self, axis: Axis) -> u64 {
        axis.directions()
            .iter()
            .map(|&d| u64::from(*self.get(d)))
            .sum()
    }
}

impl PerDirection<f64> {
    /// Mean over the four approaches.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.iter().map(|(_, &w)| w).sum::<f64>() / 4.0
    }

    /// Largest value and the first direction (N, E, S, W order) holding it.
    #[must_use]
    pub fn max_entry(&self) -> (Direction, f64) {
        let mut best = (Direction::North, self.north);
        for (d, &w) in self.iter().skip(1) {
            if w > best.1 {
                best = (d, w);
            }
        }
        best
    }
}
