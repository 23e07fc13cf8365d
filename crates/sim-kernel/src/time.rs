//! Fixed-point logical time.
//!
//! A [`Time`] is an integer count of time slots plus a slots-per-second
//! accuracy. Two values are only comparable when their accuracies match;
//! mixing accuracies is a configuration bug and aborts loudly.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

fn to_time_slot(sec: f64, accuracy: u64) -> i64 {
    (sec * accuracy as f64).round() as i64
}

/// Timestamp or duration used in the simulator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Time {
    time_slot: i64,
    accuracy: u64,
}

impl Time {
    /// Placeholder value used before a real timestamp is assigned.
    /// It compares equal only to itself and must not enter arithmetic.
    pub const SENTINEL: Time = Time {
        time_slot: 0,
        accuracy: 0,
    };

    /// Construct from an integer time slot.
    pub const fn new(time_slot: i64, accuracy: u64) -> Self {
        Time {
            time_slot,
            accuracy,
        }
    }

    /// Construct from seconds, rounding to the nearest time slot.
    pub fn from_sec(sec: f64, accuracy: u64) -> Self {
        Time {
            time_slot: to_time_slot(sec, accuracy),
            accuracy,
        }
    }

    pub const fn time_slot(&self) -> i64 {
        self.time_slot
    }

    pub const fn accuracy(&self) -> u64 {
        self.accuracy
    }

    pub const fn is_sentinel(&self) -> bool {
        self.accuracy == 0
    }

    /// Timestamp/duration in seconds.
    pub fn sec(&self) -> f64 {
        self.time_slot as f64 / self.accuracy as f64
    }

    /// Add a duration given in seconds.
    pub fn add_sec(&self, sec: f64) -> Self {
        self.checked()
            .offset(to_time_slot(sec, self.accuracy))
    }

    /// New timestamp offset by a raw time-slot count.
    pub fn offset(&self, slots: i64) -> Self {
        Time {
            time_slot: self.time_slot + slots,
            accuracy: self.accuracy,
        }
    }

    fn checked(self) -> Self {
        assert!(
            !self.is_sentinel(),
            "Time: arithmetic/comparison on SENTINEL"
        );
        self
    }

    fn matching(self, other: Self) -> (Self, Self) {
        assert_eq!(
            self.checked().accuracy,
            other.checked().accuracy,
            "Time: accuracy mismatch ({} vs {})",
            self.accuracy,
            other.accuracy
        );
        (self, other)
    }
}

impl PartialEq for Time {
    /// Equal only with the same accuracy and the same time slot.
    fn eq(&self, other: &Self) -> bool {
        self.accuracy == other.accuracy && self.time_slot == other.time_slot
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    /// Two `Time` values can be ordered only with the same accuracy.
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.matching(*other);
        a.time_slot.cmp(&b.time_slot)
    }
}

impl Hash for Time {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.time_slot.hash(state);
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        let (a, b) = self.matching(rhs);
        a.offset(b.time_slot)
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        let (a, b) = self.matching(rhs);
        a.offset(-b.time_slot)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "SENTINEL")
        } else {
            write!(f, "{}", self.sec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACC: u64 = 1_000_000;

    #[test]
    fn test_from_sec_rounds_to_slot() {
        let t = Time::from_sec(1.0015, 1000);
        assert_eq!(t.time_slot(), 1002); // rounds up at 1.5 slots
        assert_eq!(Time::from_sec(0.5, ACC).time_slot(), 500_000);
    }

    #[test]
    fn test_comparisons_same_accuracy() {
        let a = Time::from_sec(1.0, ACC);
        let b = Time::from_sec(2.0, ACC);
        assert!(a < b);
        assert!(b >= a);
        assert_eq!(a, Time::new(1_000_000, ACC));
    }

    #[test]
    fn test_equality_requires_matching_accuracy() {
        let a = Time::new(1000, 1000);
        let b = Time::new(1000, ACC);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "accuracy mismatch")]
    fn test_ordering_rejects_mixed_accuracy() {
        let a = Time::new(1000, 1000);
        let b = Time::new(1000, ACC);
        let _ = a < b;
    }

    #[test]
    fn test_duration_arithmetic() {
        let a = Time::from_sec(1.0, ACC);
        let d = Time::from_sec(0.25, ACC);
        assert_eq!((a + d).sec(), 1.25);
        assert_eq!((a - d).sec(), 0.75);
        assert_eq!(a.add_sec(0.002).time_slot(), 1_002_000);
    }

    #[test]
    #[should_panic(expected = "SENTINEL")]
    fn test_sentinel_rejects_arithmetic() {
        let _ = Time::SENTINEL + Time::from_sec(1.0, ACC);
    }
}
