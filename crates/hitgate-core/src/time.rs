//! DAQ time and closed time intervals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the DAQ clock, counted in ticks of 0.1 ns.
///
/// Durations (window lengths, readout offsets) are plain `i64` tick counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtcTime(i64);

impl UtcTime {
    /// Earliest representable time.
    pub const MIN: UtcTime = UtcTime(i64::MIN);
    /// Latest representable time.
    pub const MAX: UtcTime = UtcTime(i64::MAX);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Shift by `ticks`, saturating at the ends of the clock.
    pub const fn offset(self, ticks: i64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// The smallest time strictly after this one.
    pub const fn just_after(self) -> Self {
        self.offset(1)
    }

    /// Signed distance `self - earlier` in ticks.
    pub const fn since(self, earlier: UtcTime) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<i64> for UtcTime {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A closed time range `[start, end]` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: UtcTime,
    pub end: UtcTime,
}

impl Interval {
    /// Create an interval. Callers guarantee `start <= end`.
    pub fn new(start: UtcTime, end: UtcTime) -> Self {
        debug_assert!(start <= end, "interval start {start} after end {end}");
        Self { start, end }
    }

    /// Create an interval from raw tick counts.
    pub fn ticks(start: i64, end: i64) -> Self {
        Self::new(UtcTime(start), UtcTime(end))
    }

    /// Interval covering a single instant.
    pub fn at(time: UtcTime) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Overlap test that also accepts intervals separated by at most `gap` ticks.
    pub fn overlaps_within(&self, other: &Interval, gap: i64) -> bool {
        self.start <= other.end.offset(gap) && other.start <= self.end.offset(gap)
    }

    pub fn contains(&self, time: UtcTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest interval covering both.
    pub fn union(&self, other: &Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length in ticks.
    pub fn duration(&self) -> i64 {
        self.end.since(self.start)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_is_inclusive() {
        let a = Interval::ticks(10, 20);
        assert!(a.overlaps(&Interval::ticks(20, 30)));
        assert!(a.overlaps(&Interval::ticks(0, 10)));
        assert!(!a.overlaps(&Interval::ticks(21, 30)));
    }

    #[test]
    fn test_overlap_with_gap() {
        let a = Interval::ticks(10, 20);
        let b = Interval::ticks(25, 30);
        assert!(!a.overlaps_within(&b, 4));
        assert!(a.overlaps_within(&b, 5));
        assert!(b.overlaps_within(&a, 5));
    }

    #[test]
    fn test_union_and_display() {
        let u = Interval::ticks(11, 15).union(&Interval::ticks(18, 25));
        assert_eq!(u, Interval::ticks(11, 25));
        assert_eq!(u.to_string(), "[11-25]");
        assert_eq!(u.duration(), 14);
    }

    #[test]
    fn test_offset_saturates() {
        assert_eq!(UtcTime::MAX.just_after(), UtcTime::MAX);
        assert_eq!(UtcTime::new(5).just_after(), UtcTime::new(6));
    }
}
