//! Watermark-gated request bag.
//!
//! Candidate requests wait here until the collector's watermark has passed
//! their end. Overlapping candidates are merged on insertion, so the buffered
//! entries are always sorted by start and pairwise non-overlapping.

use crate::error::WatermarkError;
use crate::merge::{common_identity, MergeEngine, MergePolicy};
use hitgate_core::{Interval, TriggerRequest, UtcTime};
use tracing::trace;

/// One buffered span and the original requests merged into it.
#[derive(Debug, Clone, PartialEq)]
pub struct BagEntry {
    pub interval: Interval,
    pub parts: Vec<TriggerRequest>,
}

impl BagEntry {
    fn new(request: TriggerRequest) -> Self {
        Self {
            interval: request.interval,
            parts: vec![request],
        }
    }

    /// Collapse the entry into one request. A single part is returned as is;
    /// several parts become a request carrying them as sub-requests. An
    /// entry without parts yields nothing.
    pub fn into_request(self, engine: &MergeEngine) -> Option<TriggerRequest> {
        let mut parts = self.parts;
        if parts.len() == 1 {
            return parts.pop();
        }
        let source = parts.first()?.source;
        let (kind, config_id) = common_identity(&parts);
        let elements: Vec<_> = parts.iter().flat_map(|p| p.elements.iter().copied()).collect();
        Some(
            TriggerRequest::new(0, kind, config_id, source, self.interval)
                .with_elements(engine.merge_homogeneous(&elements))
                .with_sub_requests(parts),
        )
    }
}

#[derive(Debug, Default)]
pub struct RequestBag {
    engine: MergeEngine,
    entries: Vec<BagEntry>,
    watermark: Option<UtcTime>,
}

impl RequestBag {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            engine: MergeEngine::new(policy),
            entries: Vec::new(),
            watermark: None,
        }
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn watermark(&self) -> Option<UtcTime> {
        self.watermark
    }

    /// Buffered spans in start order.
    pub fn intervals(&self) -> Vec<Interval> {
        self.entries.iter().map(|e| e.interval).collect()
    }

    /// Insert `request`, merging it with every entry it overlaps.
    pub fn add(&mut self, request: TriggerRequest) {
        let policy = self.engine.policy();
        let mut entry = BagEntry::new(request);

        // Entries are sorted and disjoint, so the overlapping ones are contiguous.
        let first = self
            .entries
            .partition_point(|e| e.interval.end.offset(policy.gap) < entry.interval.start);
        let mut last = first;
        while last < self.entries.len() && policy.mergeable(&self.entries[last].interval, &entry.interval) {
            last += 1;
        }

        if last > first {
            for absorbed in self.entries.drain(first..last) {
                entry.interval = entry.interval.union(&absorbed.interval);
                entry.parts.extend(absorbed.parts);
            }
            entry
                .parts
                .sort_by_key(|p| (p.interval.start, p.interval.end));
            trace!(interval = %entry.interval, parts = entry.parts.len(), "merged bag entry");
        }
        self.entries.insert(first, entry);
    }

    /// Advance the release watermark.
    pub fn set_watermark(&mut self, watermark: UtcTime) -> Result<(), WatermarkError> {
        if let Some(previous) = self.watermark {
            if watermark < previous {
                return Err(WatermarkError::Backward {
                    previous,
                    requested: watermark,
                });
            }
        }
        self.watermark = Some(watermark);
        Ok(())
    }

    /// Release every entry that ends strictly before the watermark.
    pub fn drain_entries(&mut self) -> Vec<BagEntry> {
        let Some(watermark) = self.watermark else {
            return Vec::new();
        };
        let releasable = self
            .entries
            .iter()
            .take_while(|e| e.interval.end < watermark)
            .count();
        self.entries.drain(..releasable).collect()
    }

    /// Releasable entries, each collapsed into one request.
    pub fn drain(&mut self) -> Vec<TriggerRequest> {
        let engine = self.engine;
        self.drain_entries()
            .into_iter()
            .filter_map(|e| e.into_request(&engine))
            .collect()
    }

    /// Release everything regardless of the watermark. End of stream only.
    pub fn flush_entries(&mut self) -> Vec<BagEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn flush(&mut self) -> Vec<TriggerRequest> {
        let engine = self.engine;
        self.flush_entries()
            .into_iter()
            .filter_map(|e| e.into_request(&engine))
            .collect()
    }

    /// Drop all entries and forget the watermark.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.watermark = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitgate_core::{SourceId, TriggerKind};

    fn req(start: i64, end: i64) -> TriggerRequest {
        TriggerRequest::new(
            0,
            TriggerKind::SimpleMajority,
            1,
            SourceId::INICE_TRIGGER,
            Interval::ticks(start, end),
        )
    }

    #[test]
    fn test_add_keeps_sorted_and_disjoint() {
        let mut bag = RequestBag::default();
        bag.add(req(50, 60));
        bag.add(req(10, 20));
        bag.add(req(30, 40));
        assert_eq!(
            bag.intervals(),
            vec![
                Interval::ticks(10, 20),
                Interval::ticks(30, 40),
                Interval::ticks(50, 60)
            ]
        );

        // Bridges the last two entries.
        bag.add(req(35, 55));
        assert_eq!(
            bag.intervals(),
            vec![Interval::ticks(10, 20), Interval::ticks(30, 60)]
        );
    }

    #[test]
    fn test_merged_entry_keeps_parts() {
        let mut bag = RequestBag::default();
        bag.add(req(10, 20));
        bag.add(TriggerRequest {
            kind: TriggerKind::MinBias,
            ..req(15, 25)
        });
        let out = bag.flush();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].interval, Interval::ticks(10, 25));
        assert_eq!(out[0].kind, TriggerKind::Merged);
        assert_eq!(out[0].config_id, -1);
        assert_eq!(out[0].sub_requests.len(), 2);
        assert_eq!(out[0].source, SourceId::INICE_TRIGGER);
    }

    #[test]
    fn test_entry_without_parts_yields_nothing() {
        let entry = BagEntry {
            interval: Interval::ticks(1, 2),
            parts: Vec::new(),
        };
        assert_eq!(entry.into_request(&MergeEngine::default()), None);
    }

    #[test]
    fn test_drain_respects_watermark() {
        let mut bag = RequestBag::default();
        bag.add(req(10, 20));
        bag.add(req(30, 40));
        assert!(bag.drain().is_empty());

        bag.set_watermark(UtcTime::new(20)).unwrap();
        assert!(bag.drain().is_empty());

        bag.set_watermark(UtcTime::new(21)).unwrap();
        let out = bag.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].interval, Interval::ticks(10, 20));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_backward_watermark() {
        let mut bag = RequestBag::default();
        bag.set_watermark(UtcTime::new(100)).unwrap();
        bag.set_watermark(UtcTime::new(100)).unwrap();
        assert_eq!(
            bag.set_watermark(UtcTime::new(99)),
            Err(WatermarkError::Backward {
                previous: UtcTime::new(100),
                requested: UtcTime::new(99),
            })
        );
        assert_eq!(bag.watermark(), Some(UtcTime::new(100)));
    }

    #[test]
    fn test_flush_ignores_watermark() {
        let mut bag = RequestBag::new(MergePolicy::ZERO_GAP);
        bag.add(req(10, 20));
        bag.add(req(30, 40));
        assert_eq!(bag.flush().len(), 2);
        assert!(bag.is_empty());
    }
}
