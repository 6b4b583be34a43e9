//! Trigger kinds and trigger requests.

use crate::hit::{Hit, SensorId};
use crate::readout::ReadoutRequestElement;
use crate::source::SourceId;
use crate::time::Interval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which algorithm family produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    SimpleMajority,
    MinBias,
    Throughput,
    Volume,
    /// Union of requests from different algorithms.
    Merged,
}

impl TriggerKind {
    /// Numeric trigger type carried in request records.
    pub fn code(self) -> i32 {
        match self {
            TriggerKind::SimpleMajority => 0,
            TriggerKind::MinBias => 2,
            TriggerKind::Throughput => 3,
            TriggerKind::Volume => 8,
            TriggerKind::Merged => -1,
        }
    }

    pub fn from_code(code: i32) -> Option<TriggerKind> {
        match code {
            0 => Some(TriggerKind::SimpleMajority),
            2 => Some(TriggerKind::MinBias),
            3 => Some(TriggerKind::Throughput),
            8 => Some(TriggerKind::Volume),
            -1 => Some(TriggerKind::Merged),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::SimpleMajority => "SimpleMajorityTrigger",
            TriggerKind::MinBias => "MinBiasTrigger",
            TriggerKind::Throughput => "ThroughputTrigger",
            TriggerKind::Volume => "VolumeTrigger",
            TriggerKind::Merged => "MergedTrigger",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A candidate or finalized trigger request.
///
/// Algorithms create requests carrying the hits that formed them; the
/// collector assigns the final uid and may wrap several requests into one
/// through `sub_requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub uid: u32,
    pub kind: TriggerKind,
    /// Config id of the producing algorithm, `-1` for merged requests.
    pub config_id: i32,
    pub source: SourceId,
    pub interval: Interval,
    pub elements: Vec<ReadoutRequestElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<Hit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_requests: Vec<TriggerRequest>,
}

impl TriggerRequest {
    pub fn new(
        uid: u32,
        kind: TriggerKind,
        config_id: i32,
        source: SourceId,
        interval: Interval,
    ) -> Self {
        Self {
            uid,
            kind,
            config_id,
            source,
            interval,
            elements: Vec::new(),
            hits: Vec::new(),
            sub_requests: Vec::new(),
        }
    }

    pub fn with_elements(mut self, elements: Vec<ReadoutRequestElement>) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_hits(mut self, hits: Vec<Hit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn with_sub_requests(mut self, sub_requests: Vec<TriggerRequest>) -> Self {
        self.sub_requests = sub_requests;
        self
    }

    /// Numeric trigger type.
    pub fn trigger_type(&self) -> i32 {
        self.kind.code()
    }

    /// Distinct sensors among this request's hits and those of all
    /// nested sub-requests.
    pub fn distinct_sensors(&self) -> BTreeSet<SensorId> {
        let mut sensors = BTreeSet::new();
        self.collect_sensors(&mut sensors);
        sensors
    }

    fn collect_sensors(&self, out: &mut BTreeSet<SensorId>) {
        out.extend(self.hits.iter().map(|h| h.sensor));
        for sub in &self.sub_requests {
            sub.collect_sensors(out);
        }
    }

    /// Number of distinct sensors involved.
    pub fn multiplicity(&self) -> usize {
        self.distinct_sensors().len()
    }

    /// Leaf requests, i.e. the ones without sub-requests, depth first.
    pub fn leaves(&self) -> Vec<&TriggerRequest> {
        if self.sub_requests.is_empty() {
            return vec![self];
        }
        self.sub_requests.iter().flat_map(|s| s.leaves()).collect()
    }
}

impl fmt::Display for TriggerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} cfg {} {} {}",
            self.kind, self.uid, self.config_id, self.source, self.interval
        )
    }
}
