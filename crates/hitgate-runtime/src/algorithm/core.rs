//! State shared by every trigger algorithm.
//!
//! [`AlgorithmCore`] owns identity, the earliest time of interest, the queue of
//! formed requests and the readout windows used to turn a set of hits into
//! readout request elements.

use crate::error::{ConfigError, TriggerError};
use hitgate_core::{
    Hit, Interval, ReadoutRequestElement, ReadoutScope, SensorId, SourceId, TriggerKind,
    TriggerRequest, UtcTime,
};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How much data around a trigger to read out, and at which scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadoutWindow {
    pub scope: ReadoutScope,
    /// Shift applied to both ends, in ticks.
    pub offset: i64,
    /// Ticks before the first hit.
    pub minus: i64,
    /// Ticks after the last hit.
    pub plus: i64,
}

impl Default for ReadoutWindow {
    fn default() -> Self {
        Self {
            scope: ReadoutScope::InIceGlobal,
            offset: 0,
            minus: 0,
            plus: 0,
        }
    }
}

impl ReadoutWindow {
    pub fn new(scope: ReadoutScope, offset: i64, minus: i64, plus: i64) -> Self {
        Self {
            scope,
            offset,
            minus,
            plus,
        }
    }

    fn interval(&self, first: UtcTime, last: UtcTime) -> Interval {
        Interval::new(
            first.offset(self.offset - self.minus),
            last.offset(self.offset + self.plus),
        )
    }
}

#[derive(Debug, Clone)]
pub struct AlgorithmCore {
    name: String,
    kind: TriggerKind,
    config_id: i32,
    source: SourceId,
    readouts: Vec<ReadoutWindow>,
    trigger_prescale: u32,
    formed: u64,
    emitted: u64,
    next_uid: u32,
    ready: Vec<TriggerRequest>,
    earliest: Option<UtcTime>,
    hit_filter: Option<FxHashSet<SensorId>>,
    last_time: Option<UtcTime>,
}

impl AlgorithmCore {
    pub fn new(name: impl Into<String>, kind: TriggerKind, config_id: i32, source: SourceId) -> Self {
        Self {
            name: name.into(),
            kind,
            config_id,
            source,
            readouts: Vec::new(),
            trigger_prescale: 0,
            formed: 0,
            emitted: 0,
            next_uid: 1,
            ready: Vec::new(),
            earliest: None,
            hit_filter: None,
            last_time: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn config_id(&self) -> i32 {
        self.config_id
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn readouts(&self) -> &[ReadoutWindow] {
        &self.readouts
    }

    pub fn add_readout(&mut self, window: ReadoutWindow) {
        self.readouts.push(window);
    }

    pub fn trigger_prescale(&self) -> u32 {
        self.trigger_prescale
    }

    /// Restrict the usable hits to the given sensors.
    pub fn set_hit_filter(&mut self, sensors: impl IntoIterator<Item = SensorId>) {
        self.hit_filter = Some(sensors.into_iter().collect());
    }

    pub fn uses_sensor(&self, sensor: SensorId) -> bool {
        self.hit_filter
            .as_ref()
            .map_or(true, |set| set.contains(&sensor))
    }

    /// Number of requests emitted since construction or the last reset.
    pub fn trigger_count(&self) -> u64 {
        self.emitted
    }

    pub fn earliest_time_of_interest(&self) -> Option<UtcTime> {
        self.earliest
    }

    /// Move the earliest time of interest forward. Earlier times are ignored.
    pub fn advance_earliest(&mut self, time: UtcTime) {
        match self.earliest {
            Some(current) if time <= current => {}
            _ => {
                trace!(algorithm = %self.name, %time, "earliest time of interest");
                self.earliest = Some(time);
            }
        }
    }

    pub fn take_ready(&mut self) -> Vec<TriggerRequest> {
        std::mem::take(&mut self.ready)
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Validate the time of an incoming payload and record it as the latest.
    ///
    /// Nothing is modified when an error is returned.
    pub fn accept_time(&mut self, time: Option<UtcTime>) -> Result<UtcTime, TriggerError> {
        let time = time.ok_or_else(|| TriggerError::missing_time(&self.name))?;
        if let Some(previous) = self.last_time {
            if time < previous {
                return Err(TriggerError::OutOfOrder {
                    algorithm: self.name.clone(),
                    time,
                    previous,
                });
            }
        }
        self.last_time = Some(time);
        Ok(time)
    }

    pub fn last_time(&self) -> Option<UtcTime> {
        self.last_time
    }

    /// Handle parameters common to all hit algorithms. Returns `false` when the
    /// name is not a common parameter.
    pub fn add_common_parameter(&mut self, name: &str, value: &str) -> Result<bool, ConfigError> {
        match name {
            "triggerPrescale" => {
                self.trigger_prescale = self.parse_u32(name, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn parse_u32(&self, name: &str, value: &str) -> Result<u32, ConfigError> {
        value
            .trim()
            .parse::<u32>()
            .map_err(|e| self.invalid(name, value, e.to_string()))
    }

    pub fn parse_i64(&self, name: &str, value: &str) -> Result<i64, ConfigError> {
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|e| self.invalid(name, value, e.to_string()))?;
        if parsed < 0 {
            return Err(self.invalid(name, value, "must not be negative".to_string()));
        }
        Ok(parsed)
    }

    pub fn invalid(&self, name: &str, value: &str, reason: String) -> ConfigError {
        ConfigError::InvalidParameter {
            algorithm: self.name.clone(),
            name: name.to_string(),
            value: value.to_string(),
            reason,
        }
    }

    pub fn unknown(&self, name: &str) -> ConfigError {
        ConfigError::UnknownParameter {
            algorithm: self.name.clone(),
            name: name.to_string(),
        }
    }

    fn next_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid = self.next_uid.wrapping_add(1).max(1);
        uid
    }

    /// Turn `hits` into a request and queue it, honouring `triggerPrescale`.
    ///
    /// Returns whether a request was queued.
    pub fn form_trigger(&mut self, hits: Vec<Hit>) -> bool {
        let times = hits.iter().filter_map(|h| h.time);
        let (first, last) = match times.fold(None, |acc: Option<(UtcTime, UtcTime)>, t| {
            Some(acc.map_or((t, t), |(lo, hi)| (lo.min(t), hi.max(t))))
        }) {
            Some(bounds) => bounds,
            None => return false,
        };

        self.formed += 1;
        if self.trigger_prescale > 1 && self.formed % u64::from(self.trigger_prescale) != 0 {
            debug!(algorithm = %self.name, formed = self.formed, "prescaled away");
            return false;
        }

        let elements = self.elements(&hits, first, last);
        let uid = self.next_uid();
        let request = TriggerRequest::new(
            uid,
            self.kind,
            self.config_id,
            self.source,
            Interval::new(first, last),
        )
        .with_elements(elements)
        .with_hits(hits);

        debug!(algorithm = %self.name, request = %request, "formed trigger");
        self.emitted += 1;
        self.ready.push(request);
        true
    }

    /// Queue a request built elsewhere (pass-through algorithms).
    pub fn push_request(&mut self, mut request: TriggerRequest) {
        request.uid = self.next_uid();
        self.emitted += 1;
        self.ready.push(request);
    }

    /// Readout elements for a trigger spanning `[first, last]`.
    pub fn elements(&self, hits: &[Hit], first: UtcTime, last: UtcTime) -> Vec<ReadoutRequestElement> {
        if self.readouts.is_empty() {
            return vec![ReadoutRequestElement::global(
                ReadoutScope::InIceGlobal,
                Interval::new(first, last),
                self.source,
            )];
        }

        let mut elements = Vec::new();
        for window in &self.readouts {
            let interval = window.interval(first, last);
            match window.scope {
                scope if scope.is_global() => {
                    elements.push(ReadoutRequestElement::global(scope, interval, self.source));
                }
                ReadoutScope::InIceString => {
                    let mut seen = Vec::new();
                    for hit in hits {
                        if !seen.contains(&hit.source) {
                            seen.push(hit.source);
                            elements.push(ReadoutRequestElement::string(interval, hit.source));
                        }
                    }
                }
                scope => {
                    let mut seen = FxHashSet::default();
                    for hit in hits {
                        if seen.insert(hit.sensor) {
                            elements.push(ReadoutRequestElement::module(
                                scope, interval, hit.source, hit.sensor,
                            ));
                        }
                    }
                }
            }
        }
        elements
    }

    /// Clear runtime state; configuration is kept.
    pub fn reset(&mut self) {
        self.ready.clear();
        self.earliest = None;
        self.last_time = None;
        self.formed = 0;
        self.emitted = 0;
        self.next_uid = 1;
    }

    /// Return to the initial stream state after a flush. Requests still
    /// waiting in `ready` stay there to be taken, and the emitted count keeps
    /// running.
    pub fn flush_reset(&mut self) {
        self.earliest = None;
        self.last_time = None;
        self.formed = 0;
        self.next_uid = 1;
    }
}
