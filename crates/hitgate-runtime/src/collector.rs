//! Watermark-driven request collector.
//!
//! A [`Collector`] gathers the candidate requests of every algorithm sharing
//! one source id, holds them in a [`RequestBag`] until the common watermark
//! has passed them, merges what was released and pushes each final request to
//! the output sink. For the global trigger it also feeds multiplicity
//! accounting, whose failures are logged and never hold up trigger output.

use crate::accounting::MultiplicityDataManager;
use crate::algorithm::TriggerAlgorithm;
use crate::bag::{BagEntry, RequestBag};
use crate::error::CollectorError;
use crate::merge::{MergeEngine, MergePolicy};
use crate::sink::{BufferCache, JsonEncoder, RequestEncoder, RequestSink};
use crate::watermark::WatermarkTracker;
use hitgate_core::{Interval, SourceId, TriggerKind, TriggerRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters describing collector activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub loop_count: u64,
    pub interval_searches: u64,
    pub found_intervals: u64,
    pub requests_pushed: u64,
    pub regressions: u64,
    pub accounting_failures: u64,
    pub sink_failures: u64,
}

pub struct Collector {
    source: SourceId,
    engine: MergeEngine,
    bag: RequestBag,
    tracker: WatermarkTracker,
    sink: Arc<dyn RequestSink>,
    cache: Option<Arc<dyn BufferCache>>,
    encoder: Box<dyn RequestEncoder>,
    multiplicity: Option<Box<dyn MultiplicityDataManager>>,
    next_uid: u32,
    last_interval: Option<Interval>,
    stats: CollectorStats,
}

impl Collector {
    pub fn new(source: SourceId, policy: MergePolicy, sink: Arc<dyn RequestSink>) -> Self {
        Self {
            source,
            engine: MergeEngine::new(policy),
            bag: RequestBag::new(policy),
            tracker: WatermarkTracker::new(),
            sink,
            cache: None,
            encoder: Box::new(JsonEncoder),
            multiplicity: None,
            next_uid: 1,
            last_interval: None,
            stats: CollectorStats::default(),
        }
    }

    pub fn with_buffer_cache(mut self, cache: Arc<dyn BufferCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn RequestEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Attach multiplicity accounting. Only used when the source is the
    /// global trigger.
    pub fn with_multiplicity(mut self, manager: Box<dyn MultiplicityDataManager>) -> Self {
        if !self.source.is_global() {
            warn!(source = %self.source, "multiplicity accounting is ignored for non-global sources");
        }
        self.multiplicity = Some(manager);
        self
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    pub fn bag(&self) -> &RequestBag {
        &self.bag
    }

    pub fn last_interval(&self) -> Option<Interval> {
        self.last_interval
    }

    /// The uid the next pushed request will get.
    pub fn next_uid(&self) -> u32 {
        self.next_uid
    }

    /// Restart request numbering. Run boundaries only.
    pub fn reset_uid(&mut self) {
        info!(source = %self.source, "resetting request uid");
        self.next_uid = 1;
    }

    fn take_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid = self.next_uid.wrapping_add(1).max(1);
        uid
    }

    /// Collect from every algorithm and release what the watermark allows.
    ///
    /// Returns the number of requests pushed to the sink. A backwards
    /// watermark aborts the cycle.
    pub fn run_cycle<A: TriggerAlgorithm>(&mut self, algorithms: &mut [A]) -> Result<usize, CollectorError> {
        self.stats.loop_count += 1;
        self.gather(algorithms);

        let Some(watermark) = self.tracker.recompute() else {
            return Ok(0);
        };
        self.bag.set_watermark(watermark)?;
        self.stats.interval_searches += 1;

        let entries = self.bag.drain_entries();
        let pushed = self.release(entries);
        if pushed > 0 {
            debug!(source = %self.source, %watermark, pushed, "released requests");
        }
        Ok(pushed)
    }

    /// Collect remaining requests and release everything. End of stream.
    pub fn flush<A: TriggerAlgorithm>(&mut self, algorithms: &mut [A]) -> usize {
        self.gather(algorithms);

        let entries = self.bag.flush_entries();
        let pushed = self.release(entries);
        info!(source = %self.source, pushed, "flushed collector");

        // Another stream may follow with earlier times.
        self.bag.reset();
        self.tracker.reset();
        self.last_interval = None;
        pushed
    }

    /// Drop everything buffered and restart numbering.
    pub fn reset(&mut self) {
        self.bag.reset();
        self.tracker.reset();
        self.last_interval = None;
        self.next_uid = 1;
        self.stats = CollectorStats::default();
    }

    fn gather<A: TriggerAlgorithm>(&mut self, algorithms: &mut [A]) {
        for algorithm in algorithms.iter_mut() {
            for request in algorithm.take_ready() {
                self.bag.add(request);
            }
            self.tracker
                .observe(algorithm.name(), algorithm.earliest_time_of_interest());
        }
    }

    /// Send everything released in one cycle as a single found interval,
    /// spanning the first released start to the last released end.
    fn release(&mut self, entries: Vec<BagEntry>) -> usize {
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return 0;
        };
        let interval = Interval::new(first.interval.start, last.interval.end);
        self.stats.found_intervals += 1;
        if let Some(previous) = self.last_interval {
            if interval.start <= previous.end {
                error!(
                    source = %self.source,
                    "New interval {} precedes old interval {}", interval, previous
                );
                self.stats.regressions += 1;
                return 0;
            }
        }
        let parts: Vec<_> = entries.into_iter().flat_map(|e| e.parts).collect();
        let pushed = self.send_requests(interval, parts);
        self.last_interval = Some(interval);
        pushed
    }

    /// Turn the requests found for `interval` into final requests.
    ///
    /// The global trigger emits one request for the interval, wrapping all
    /// inputs when there are several. Other triggers emit one request per
    /// cluster of overlapping inputs.
    pub fn send_requests(&mut self, interval: Interval, requests: Vec<TriggerRequest>) -> usize {
        if requests.is_empty() {
            warn!(source = %self.source, "No requests found for interval {}", interval);
            return 0;
        }

        if self.source.is_global() {
            let request = if requests.len() == 1 {
                let mut requests = requests;
                match requests.pop() {
                    Some(only) => only,
                    None => return 0,
                }
            } else {
                let elements: Vec<_> = requests
                    .iter()
                    .flat_map(|r| r.elements.iter().copied())
                    .collect();
                TriggerRequest::new(0, TriggerKind::Merged, -1, self.source, interval)
                    .with_elements(self.engine.merge_homogeneous(&elements))
                    .with_sub_requests(requests)
            };
            return usize::from(self.push_trigger(request));
        }

        let mut pushed = 0;
        for mut cluster in self.engine.merge_requests(requests) {
            let request = if cluster.requests.len() == 1 {
                match cluster.requests.pop() {
                    Some(only) => only,
                    None => continue,
                }
            } else {
                let (kind, config_id) = cluster.identity();
                TriggerRequest::new(0, kind, config_id, self.source, cluster.interval)
                    .with_elements(cluster.elements)
                    .with_sub_requests(cluster.requests)
            };
            if self.push_trigger(request) {
                pushed += 1;
            }
        }
        pushed
    }

    /// Number, account for and emit one final request. Returns whether the
    /// sink accepted it.
    pub fn push_trigger(&mut self, mut request: TriggerRequest) -> bool {
        request.uid = self.take_uid();

        if self.source.is_global() {
            if let Some(manager) = self.multiplicity.as_deref_mut() {
                account(manager, &request, &mut self.stats);
            }
        }

        let len = self.encoder.encoded_len(&request);
        let mut buffer = match &self.cache {
            Some(cache) => cache.acquire(len),
            None => Vec::with_capacity(len),
        };
        buffer.clear();

        if let Err(e) = self.encoder.encode(&request, &mut buffer) {
            error!(source = %self.source, request = %request, error = %e, "Cannot encode trigger request");
            self.stats.sink_failures += 1;
            return false;
        }

        debug!(source = %self.source, request = %request, bytes = buffer.len(), "pushing trigger");
        match self.sink.receive(buffer) {
            Ok(()) => {
                self.stats.requests_pushed += 1;
                true
            }
            Err(e) => {
                error!(sink = %self.sink.name(), error = %e, "Cannot push trigger request");
                self.stats.sink_failures += 1;
                false
            }
        }
    }
}

/// Best-effort multiplicity bookkeeping for one request.
fn account(
    manager: &mut dyn MultiplicityDataManager,
    request: &TriggerRequest,
    stats: &mut CollectorStats,
) {
    if let Err(e) = manager.add(request) {
        error!(request = %request, error = %e, "Cannot add multiplicity data");
        stats.accounting_failures += 1;
        return;
    }
    if !manager.send_due() {
        return;
    }
    match manager.send() {
        Ok(true) => {
            if let Err(e) = manager.reset() {
                error!(error = %e, "Failed to reset multiplicity data");
                stats.accounting_failures += 1;
            }
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Failed to send multiplicity data");
            stats.accounting_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{Algorithm, MinBiasTrigger, RerunPolicy, SimpleMajorityTrigger};
    use crate::sink::MemorySink;
    use hitgate_core::{Hit, Payload, SensorId, UtcTime};

    fn hit(sensor: u64, t: i64) -> Payload {
        Payload::Hit(Hit::new(
            SensorId(sensor),
            SourceId::string_hub(1),
            UtcTime::new(t),
            2,
        ))
    }

    fn collector(source: SourceId) -> (Collector, MemorySink) {
        let sink = MemorySink::new("test");
        let collector = Collector::new(source, MergePolicy::ZERO_GAP, Arc::new(sink.clone()));
        (collector, sink)
    }

    #[test]
    fn test_nothing_released_without_watermark() {
        let (mut collector, sink) = collector(SourceId::INICE_TRIGGER);
        let mut algs: Vec<Algorithm> = Vec::new();
        assert_eq!(collector.run_cycle(&mut algs).unwrap(), 0);
        assert!(sink.is_empty());
        assert_eq!(collector.stats().loop_count, 1);
        assert_eq!(collector.stats().interval_searches, 0);
    }

    #[test]
    fn test_release_follows_watermark() {
        let (mut collector, sink) = collector(SourceId::INICE_TRIGGER);
        let mut smt = SimpleMajorityTrigger::new("smt", 1, SourceId::INICE_TRIGGER, RerunPolicy::Drop);
        smt.configure([("threshold", "2"), ("timeWindow", "100")]).unwrap();
        let mut algs = vec![Algorithm::from(smt)];

        for t in [10, 20, 150] {
            algs[0].process(&hit(t as u64, t)).unwrap();
        }
        // [10-20] is formed but the window still holds the hit at 150.
        assert_eq!(collector.run_cycle(&mut algs).unwrap(), 0);
        assert_eq!(collector.bag().len(), 1);

        algs[0].process(&hit(4, 300)).unwrap();
        assert_eq!(collector.run_cycle(&mut algs).unwrap(), 1);
        let out = sink.requests().unwrap();
        assert_eq!(out[0].interval, Interval::ticks(10, 20));
        assert_eq!(out[0].uid, 1);
        assert_eq!(collector.stats().found_intervals, 1);
    }

    #[test]
    fn test_min_bias_released_by_next_hit() {
        let (mut collector, sink) = collector(SourceId::INICE_TRIGGER);
        let mut mb = MinBiasTrigger::new("mb", 1, SourceId::INICE_TRIGGER);
        mb.add_parameter("prescale", "2").unwrap();
        let mut algs = vec![Algorithm::from(mb)];

        algs[0].process(&hit(1, 10)).unwrap();
        algs[0].process(&hit(2, 20)).unwrap();
        // Forming a trigger leaves the earliest time of interest at 11.
        assert_eq!(collector.run_cycle(&mut algs).unwrap(), 0);

        algs[0].process(&hit(3, 30)).unwrap();
        assert_eq!(collector.run_cycle(&mut algs).unwrap(), 1);
        assert_eq!(sink.requests().unwrap()[0].interval, Interval::ticks(20, 20));
    }

    #[test]
    fn test_flush_releases_everything() {
        let (mut collector, sink) = collector(SourceId::INICE_TRIGGER);
        let mut smt = SimpleMajorityTrigger::new("smt", 1, SourceId::INICE_TRIGGER, RerunPolicy::Drop);
        smt.configure([("threshold", "2"), ("timeWindow", "100")]).unwrap();
        let mut algs = vec![Algorithm::from(smt)];
        algs[0].process(&hit(1, 10)).unwrap();
        algs[0].process(&hit(2, 20)).unwrap();
        algs[0].flush();

        assert_eq!(collector.flush(&mut algs), 1);
        assert_eq!(sink.len(), 1);
        assert!(collector.bag().is_empty());
        assert_eq!(collector.last_interval(), None);
    }

    #[test]
    fn test_reset_uid() {
        let (mut collector, sink) = collector(SourceId::INICE_TRIGGER);
        let req = TriggerRequest::new(
            0,
            TriggerKind::MinBias,
            1,
            SourceId::INICE_TRIGGER,
            Interval::ticks(1, 2),
        );
        collector.push_trigger(req.clone());
        collector.push_trigger(req.clone());
        assert_eq!(collector.next_uid(), 3);
        collector.reset_uid();
        collector.push_trigger(req);
        let uids: Vec<_> = sink.requests().unwrap().iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec![1, 2, 1]);
    }

    #[test]
    fn test_empty_interval_sends_nothing() {
        let (mut collector, sink) = collector(SourceId::GLOBAL_TRIGGER);
        assert_eq!(collector.send_requests(Interval::ticks(1, 2), Vec::new()), 0);
        assert!(sink.is_empty());
    }
}
