//! Payload dispatch to the algorithms of one collector.

use crate::algorithm::TriggerAlgorithm;
use crate::error::TriggerError;
use crate::worker::CollectorSignal;
use hitgate_core::{Payload, PayloadKind, SourceId, UtcTime};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Feeds incoming payloads to every algorithm that consumes them.
pub struct TriggerHandler<A: TriggerAlgorithm> {
    source: SourceId,
    algorithms: Arc<Mutex<Vec<A>>>,
    queue: VecDeque<Payload>,
    request_sources: FxHashSet<SourceId>,
    last_time: Option<UtcTime>,
    processed: u64,
    discarded: u64,
    signal: Option<CollectorSignal>,
}

impl<A: TriggerAlgorithm> TriggerHandler<A> {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            algorithms: Arc::new(Mutex::new(Vec::new())),
            queue: VecDeque::new(),
            request_sources: FxHashSet::default(),
            last_time: None,
            processed: 0,
            discarded: 0,
            signal: None,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Shared algorithm list, handed to the collector worker.
    pub fn algorithms(&self) -> Arc<Mutex<Vec<A>>> {
        Arc::clone(&self.algorithms)
    }

    /// Wake this collector after every dispatched payload.
    pub fn attach(&mut self, signal: CollectorSignal) {
        self.signal = Some(signal);
    }

    pub fn algorithm_count(&self) -> usize {
        self.algorithms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Register an algorithm. Kind, config id and source must be unique.
    pub fn add_algorithm(&mut self, algorithm: A) -> Result<(), TriggerError> {
        let mut algorithms = self.algorithms.lock().unwrap_or_else(|e| e.into_inner());
        let duplicate = algorithms.iter().any(|a| {
            a.kind() == algorithm.kind()
                && a.config_id() == algorithm.config_id()
                && a.source() == algorithm.source()
        });
        if duplicate {
            return Err(TriggerError::DuplicateAlgorithm {
                kind: algorithm.kind(),
                config_id: algorithm.config_id(),
                source_name: algorithm.source().name(),
            });
        }
        info!(handler = %self.source, algorithm = %algorithm.name(), "added algorithm");
        algorithms.push(algorithm);
        Ok(())
    }

    /// Accept trigger requests from `source`.
    pub fn add_request_source(&mut self, source: SourceId) {
        self.request_sources.insert(source);
    }

    pub fn add_payload(&mut self, payload: Payload) {
        self.queue.push_back(payload);
    }

    pub fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn next(&mut self) -> Option<Payload> {
        self.queue.pop_front()
    }

    /// Dispatch everything queued. Returns the number dispatched.
    pub fn process_queue(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(payload) = self.next() {
            if self.process(&payload) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Dispatch one payload. Returns `false` if it was discarded.
    pub fn process(&mut self, payload: &Payload) -> bool {
        if payload.kind() == PayloadKind::Request && !self.request_sources.contains(&payload.source()) {
            warn!(handler = %self.source, source = %payload.source(), "Ignoring request from unexpected source");
            self.discarded += 1;
            return false;
        }

        if let Some(time) = payload.time() {
            if let Some(last) = self.last_time {
                if time < last {
                    warn!(handler = %self.source, %time, %last, "Hit out of order");
                    self.discarded += 1;
                    return false;
                }
            }
            self.last_time = Some(time);
        }

        {
            let mut algorithms = self.algorithms.lock().unwrap_or_else(|e| e.into_inner());
            let kind = payload.kind();
            for algorithm in algorithms.iter_mut().filter(|a| a.consumes() == kind) {
                if let Err(e) = algorithm.process(payload) {
                    warn!(algorithm = %algorithm.name(), error = %e, "algorithm rejected payload");
                }
            }
        }

        self.processed += 1;
        if let Some(signal) = &self.signal {
            signal.set_changed();
        }
        true
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// End of stream: close every open trigger and ask the collector to
    /// release everything.
    pub fn flush(&mut self) {
        self.process_queue();
        {
            let mut algorithms = self.algorithms.lock().unwrap_or_else(|e| e.into_inner());
            for algorithm in algorithms.iter_mut() {
                algorithm.flush();
            }
        }
        debug!(handler = %self.source, processed = self.processed, "flushed handler");
        self.last_time = None;
        if let Some(signal) = &self.signal {
            signal.request_flush();
        }
    }

    pub fn reset(&mut self) {
        let mut algorithms = self.algorithms.lock().unwrap_or_else(|e| e.into_inner());
        for algorithm in algorithms.iter_mut() {
            algorithm.reset();
        }
        self.queue.clear();
        self.last_time = None;
        self.processed = 0;
        self.discarded = 0;
    }
}
