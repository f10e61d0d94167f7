//! Keyframes and fixed-point simulation time
//!
//! Provides the two units every peer must agree on bit-for-bit:
//! - `Keyframe` - monotonically increasing id of a discrete simulation step
//! - `SimTime` - fixed-point duration, so cross-peer arithmetic is exact

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A discrete simulation step identifier.
///
/// Keyframe 0 is the seed slot: it holds the initial sync state and an
/// empty input sentinel, and is never produced by the update function.
pub type Keyframe = u32;

/// A fixed-point simulation duration, counted in whole microseconds.
///
/// Floating-point time does not survive being accumulated independently on
/// two machines; integer microseconds do. Floats appear only at the API
/// edge, when converting a host frame delta in and out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Zero duration
    pub const ZERO: SimTime = SimTime(0);

    /// Microseconds per second, for conversions
    const MICROS_PER_SECOND: f64 = 1_000_000.0;

    /// Create from whole microseconds
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create from a host-side seconds value, rounding to the nearest
    /// microsecond. Negative inputs clamp to zero.
    pub fn from_seconds(seconds: f32) -> Self {
        if seconds <= 0.0 {
            return Self::ZERO;
        }
        Self((seconds as f64 * Self::MICROS_PER_SECOND).round() as u64)
    }

    /// The duration in whole microseconds
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// The duration as host-side seconds
    pub fn as_seconds(&self) -> f32 {
        (self.0 as f64 / Self::MICROS_PER_SECOND) as f32
    }

    /// Check for zero duration
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtract, clamping at zero instead of underflowing
    pub const fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for SimTime {
    fn sub_assign(&mut self, rhs: SimTime) {
        *self = *self - rhs;
    }
}

impl Sum for SimTime {
    fn sum<I: Iterator<Item = SimTime>>(iter: I) -> SimTime {
        iter.fold(SimTime::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}
