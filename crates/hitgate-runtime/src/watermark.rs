//! Per-algorithm watermark tracking for the collector.
//!
//! Each algorithm reports its earliest time of interest independently; the
//! effective watermark is the minimum across all algorithms that have reported
//! one. Nothing before the effective watermark can change any more.

use hitgate_core::UtcTime;
use rustc_hash::FxHashMap;

/// Tracks earliest times of interest for several algorithms.
#[derive(Debug, Default)]
pub struct WatermarkTracker {
    sources: FxHashMap<String, UtcTime>,
    effective: Option<UtcTime>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the earliest time of interest reported by `algorithm`.
    ///
    /// `None` means the algorithm has not seen any data yet; it does not
    /// constrain the watermark.
    pub fn observe(&mut self, algorithm: &str, earliest: Option<UtcTime>) {
        let Some(earliest) = earliest else {
            return;
        };
        match self.sources.get_mut(algorithm) {
            // Per-algorithm watermarks never recede.
            Some(current) if earliest > *current => *current = earliest,
            Some(_) => {}
            None => {
                self.sources.insert(algorithm.to_string(), earliest);
            }
        }
    }

    /// Recompute and return the effective watermark.
    ///
    /// The result never moves backwards, even when an algorithm reports for
    /// the first time with a lower value.
    pub fn recompute(&mut self) -> Option<UtcTime> {
        let min = self.sources.values().min().copied();
        self.effective = match (self.effective, min) {
            (Some(current), Some(new)) => Some(current.max(new)),
            (current, None) => current,
            (None, new) => new,
        };
        self.effective
    }

    pub fn effective_watermark(&self) -> Option<UtcTime> {
        self.effective
    }

    /// Watermark last reported by `algorithm`.
    pub fn source_watermark(&self, algorithm: &str) -> Option<UtcTime> {
        self.sources.get(algorithm).copied()
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn reset(&mut self) {
        self.sources.clear();
        self.effective = None;
    }
}
