//! Virtual time and cycle numbering.
//!
//! The scheduler never invents time: the host supplies every instant
//! through `run_until` and `post_at`, and the engine only checks that the
//! supplied scalar never decreases. Cycles are not a clock of their own;
//! a cycle is the interval between two consecutive postings of a chosen
//! sampling event, numbered from zero at the first posting.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Cycle index relative to a sampling event (first posting = cycle 0).
pub type Cycle = u64;

/// A monotone scalar on the engine's virtual timeline.
///
/// The unit is whatever the host decides — simulator ticks, nanoseconds,
/// frame numbers. When the wall-clock interface is anchored (see
/// [`Engine::set_wall_anchor`](crate::Engine::set_wall_anchor)), one tick
/// is one microsecond.
///
/// # Examples
///
/// ```
/// use oroboro::VirtualTime;
///
/// let t = VirtualTime::from_ticks(30);
/// assert_eq!(t + 10, VirtualTime::from_ticks(40));
/// assert!(t < VirtualTime::from_ticks(31));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The origin of the virtual timeline.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw tick count.
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Saturating addition of a tick delta.
    #[must_use]
    pub const fn saturating_add(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

impl Add<u64> for VirtualTime {
    type Output = Self;

    fn add(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

impl Sub for VirtualTime {
    type Output = u64;

    fn sub(self, earlier: Self) -> u64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VirtualTime {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_arithmetic() {
        let a = VirtualTime::from_ticks(10);
        let b = a + 25;
        assert_eq!(b.ticks(), 35);
        assert_eq!(b - a, 25);
        assert!(VirtualTime::ZERO < a);
    }

    #[test]
    fn display_is_raw_ticks() {
        assert_eq!(format!("{}", VirtualTime::from_ticks(40)), "40");
    }

    #[test]
    fn serde_transparent() {
        let t = VirtualTime::from_ticks(7);
        assert_eq!(serde_json::to_string(&t).unwrap(), "7");
    }
}
