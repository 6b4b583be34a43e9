//! Hit buffers for the sliding-window trigger algorithms.
//!
//! Includes:
//! - [`HitCollection`]: a time-ordered FIFO of hits with fast membership tests
//! - [`SlidingTimeWindow`]: a collection bounded to `[front, front + length]`

use hitgate_core::{Hit, UtcTime};
use std::collections::VecDeque;

/// Above this size membership tests binary-search on hit time instead of
/// scanning.
const LINEAR_SEARCH_LIMIT: usize = 100;

/// Time-ordered hits. Grows at the back, shrinks at the front.
#[derive(Debug, Clone, Default)]
pub struct HitCollection {
    hits: VecDeque<Hit>,
}

impl HitCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hit: Hit) {
        debug_assert!(
            self.hits.back().map_or(true, |last| last.time <= hit.time),
            "hit collection must stay time ordered"
        );
        self.hits.push_back(hit);
    }

    pub fn pop_front(&mut self) -> Option<Hit> {
        self.hits.pop_front()
    }

    pub fn extend_from(&mut self, other: &HitCollection) {
        for hit in other.iter() {
            self.push(*hit);
        }
    }

    pub fn front(&self) -> Option<&Hit> {
        self.hits.front()
    }

    pub fn back(&self) -> Option<&Hit> {
        self.hits.back()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }

    pub fn to_vec(&self) -> Vec<Hit> {
        self.hits.iter().copied().collect()
    }

    /// Take every hit out, leaving the collection empty.
    pub fn take(&mut self) -> Vec<Hit> {
        self.hits.drain(..).collect()
    }

    pub fn contains(&self, hit: &Hit) -> bool {
        if self.hits.len() < LINEAR_SEARCH_LIMIT {
            return self.hits.contains(hit);
        }
        let first = self.hits.partition_point(|h| h.time < hit.time);
        self.hits
            .range(first..)
            .take_while(|h| h.time == hit.time)
            .any(|h| h == hit)
    }

    /// True if any hit of `other` is also in this collection.
    pub fn overlaps(&self, other: &HitCollection) -> bool {
        other.iter().any(|h| self.contains(h))
    }
}

/// Hits lying within `length` ticks of the front hit.
#[derive(Debug, Clone)]
pub struct SlidingTimeWindow {
    hits: HitCollection,
    length: i64,
}

impl SlidingTimeWindow {
    pub fn new(length: i64) -> Self {
        Self {
            hits: HitCollection::new(),
            length,
        }
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn set_length(&mut self, length: i64) {
        self.length = length;
    }

    pub fn start_time(&self) -> Option<UtcTime> {
        self.hits.front().and_then(|h| h.time)
    }

    pub fn end_time(&self) -> Option<UtcTime> {
        self.start_time().map(|t| t.offset(self.length))
    }

    /// Whether `time` fits in the window as currently anchored. An empty
    /// window contains nothing.
    pub fn in_window(&self, time: UtcTime) -> bool {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => start <= time && time <= end,
            _ => false,
        }
    }

    pub fn push(&mut self, hit: Hit) {
        self.hits.push(hit);
    }

    /// Evict the front hit.
    pub fn slide(&mut self) -> Option<Hit> {
        self.hits.pop_front()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn hits(&self) -> &HitCollection {
        &self.hits
    }

    pub fn contains(&self, hit: &Hit) -> bool {
        self.hits.contains(hit)
    }

    pub fn overlaps(&self, other: &HitCollection) -> bool {
        self.hits.overlaps(other)
    }

    /// Ticks between the front and back hits.
    pub fn span(&self) -> i64 {
        match (
            self.hits.front().and_then(|h| h.time),
            self.hits.back().and_then(|h| h.time),
        ) {
            (Some(first), Some(last)) => last.since(first),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitgate_core::{SensorId, SourceId};

    fn hit(sensor: u64, t: i64) -> Hit {
        Hit::new(SensorId(sensor), SourceId::string_hub(1), UtcTime::new(t), 2)
    }

    #[test]
    fn test_in_window_bounds() {
        let mut w = SlidingTimeWindow::new(100);
        assert!(!w.in_window(UtcTime::new(0)));
        w.push(hit(1, 10));
        assert!(w.in_window(UtcTime::new(10)));
        assert!(w.in_window(UtcTime::new(110)));
        assert!(!w.in_window(UtcTime::new(111)));
        assert!(!w.in_window(UtcTime::new(9)));
    }

    #[test]
    fn test_slide_is_fifo() {
        let mut w = SlidingTimeWindow::new(100);
        w.push(hit(1, 10));
        w.push(hit(2, 20));
        assert_eq!(w.slide(), Some(hit(1, 10)));
        assert_eq!(w.start_time(), Some(UtcTime::new(20)));
        assert_eq!(w.span(), 0);
    }

    #[test]
    fn test_contains_small_and_large() {
        let mut small = HitCollection::new();
        small.push(hit(1, 5));
        small.push(hit(2, 5));
        assert!(small.contains(&hit(2, 5)));
        assert!(!small.contains(&hit(3, 5)));

        let mut large = HitCollection::new();
        for i in 0..500 {
            large.push(hit(i % 7, i as i64 / 3));
        }
        assert!(large.len() >= LINEAR_SEARCH_LIMIT);
        assert!(large.contains(&hit(499 % 7, 499 / 3)));
        assert!(large.contains(&hit(0, 0)));
        assert!(!large.contains(&hit(6, 0)));
        assert!(!large.contains(&hit(1, 10_000)));
    }

    #[test]
    fn test_overlaps() {
        let mut a = HitCollection::new();
        a.push(hit(1, 1));
        a.push(hit(2, 2));
        let mut b = HitCollection::new();
        b.push(hit(2, 2));
        let mut c = HitCollection::new();
        c.push(hit(3, 3));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
