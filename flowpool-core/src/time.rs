//! Simulated time.
//!
//! Simulation time is a real number of minutes since the start of the run.
//! It only moves forward when the scheduler pops a future event.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A point on the simulated clock, in minutes since the run started.
///
/// `SimTime` is totally ordered (via [`f64::total_cmp`]) so it can key the
/// future-event list directly. Constructors reject non-finite values by
/// clamping them to zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// The start of the run.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Creates a time from a number of minutes.
    pub fn from_minutes(minutes: f64) -> Self {
        if minutes.is_finite() {
            SimTime(minutes)
        } else {
            SimTime::ZERO
        }
    }

    /// Returns the time as minutes since the run started.
    pub fn as_minutes(self) -> f64 {
        self.0
    }

    /// Returns the later of two times.
    pub fn max(self, other: SimTime) -> SimTime {
        if self >= other {
            self
        } else {
            other
        }
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, minutes: f64) -> SimTime {
        SimTime::from_minutes(self.0 + minutes)
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> f64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}min", self.0)
    }
}
