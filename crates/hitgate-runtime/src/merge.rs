//! Interval merge engine.
//!
//! Merging runs in two phases:
//!
//! 1. **Homogeneous**: elements with the same grouping key (scope, plus string
//!    or module for the narrower scopes) are sorted and merged wherever their
//!    intervals overlap within the policy gap.
//! 2. **Heterogeneous**: the results of all groups are swept together in time
//!    order and gathered into non-overlapping [`ReadoutGroup`]s.
//!
//! Ties on start time are broken by end time, then by scope priority (global
//! before string before module). Both phases are idempotent.

use hitgate_core::readout::ElementKey;
use hitgate_core::{Interval, ReadoutRequestElement, TriggerKind, TriggerRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How far apart two intervals may be and still merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Tolerated gap in ticks; zero merges only overlapping intervals.
    pub gap: i64,
}

impl MergePolicy {
    pub const ZERO_GAP: MergePolicy = MergePolicy { gap: 0 };

    pub fn with_gap(gap: i64) -> Self {
        Self { gap: gap.max(0) }
    }

    pub fn mergeable(&self, a: &Interval, b: &Interval) -> bool {
        a.overlaps_within(b, self.gap)
    }
}

/// Elements sharing one time span after the heterogeneous phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadoutGroup {
    pub interval: Interval,
    pub elements: Vec<ReadoutRequestElement>,
}

/// Requests whose intervals chain together, with their merged elements.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCluster {
    pub interval: Interval,
    pub elements: Vec<ReadoutRequestElement>,
    pub requests: Vec<TriggerRequest>,
}

impl RequestCluster {
    /// The kind and config id shared by every request, or `Merged`/`-1`.
    pub fn identity(&self) -> (TriggerKind, i32) {
        common_identity(&self.requests)
    }
}

pub(crate) fn common_identity(requests: &[TriggerRequest]) -> (TriggerKind, i32) {
    match requests.split_first() {
        Some((first, rest))
            if rest
                .iter()
                .all(|r| r.kind == first.kind && r.config_id == first.config_id) =>
        {
            (first.kind, first.config_id)
        }
        _ => (TriggerKind::Merged, -1),
    }
}

type OrderKey = (
    hitgate_core::UtcTime,
    hitgate_core::UtcTime,
    u8,
    ElementKey,
);

fn order_key(e: &ReadoutRequestElement) -> OrderKey {
    (e.interval.start, e.interval.end, e.scope.priority(), e.key())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge elements within each grouping key. The output is sorted by the
    /// tie-break order.
    pub fn merge_homogeneous(&self, elements: &[ReadoutRequestElement]) -> Vec<ReadoutRequestElement> {
        let mut groups: BTreeMap<ElementKey, Vec<ReadoutRequestElement>> = BTreeMap::new();
        for element in elements.iter().flat_map(|e| e.expand()) {
            groups.entry(element.key()).or_default().push(element);
        }

        let mut merged = Vec::with_capacity(elements.len());
        for (_, mut group) in groups {
            group.sort_by_key(|e| (e.interval.start, e.interval.end));
            let mut iter = group.into_iter();
            let Some(mut current) = iter.next() else {
                continue;
            };
            for next in iter {
                if self.policy.mergeable(&current.interval, &next.interval) {
                    current.interval = current.interval.union(&next.interval);
                } else {
                    merged.push(current);
                    current = next;
                }
            }
            merged.push(current);
        }

        merged.sort_by_key(order_key);
        merged
    }

    /// Sweep elements of any scope into non-overlapping groups.
    pub fn merge_heterogeneous(&self, elements: &[ReadoutRequestElement]) -> Vec<ReadoutGroup> {
        let mut sorted = elements.to_vec();
        sorted.sort_by_key(order_key);

        let mut groups: Vec<ReadoutGroup> = Vec::new();
        for element in sorted {
            match groups.last_mut() {
                Some(group) if self.policy.mergeable(&group.interval, &element.interval) => {
                    group.interval = group.interval.union(&element.interval);
                    group.elements.push(element);
                }
                _ => groups.push(ReadoutGroup {
                    interval: element.interval,
                    elements: vec![element],
                }),
            }
        }
        groups
    }

    /// Both phases in sequence.
    pub fn merge(&self, elements: &[ReadoutRequestElement]) -> Vec<ReadoutGroup> {
        self.merge_heterogeneous(&self.merge_homogeneous(elements))
    }

    /// Cluster requests whose intervals chain together. A request's elements
    /// always end up in the same cluster as the request.
    pub fn merge_requests(&self, requests: Vec<TriggerRequest>) -> Vec<RequestCluster> {
        let mut sorted = requests;
        sorted.sort_by_key(|r| (r.interval.start, r.interval.end));

        let mut clusters: Vec<RequestCluster> = Vec::new();
        for request in sorted {
            match clusters.last_mut() {
                Some(cluster) if self.policy.mergeable(&cluster.interval, &request.interval) => {
                    cluster.interval = cluster.interval.union(&request.interval);
                    cluster.elements.extend_from_slice(&request.elements);
                    cluster.requests.push(request);
                }
                _ => clusters.push(RequestCluster {
                    interval: request.interval,
                    elements: request.elements.clone(),
                    requests: vec![request],
                }),
            }
        }

        for cluster in &mut clusters {
            cluster.elements = self.merge_homogeneous(&cluster.elements);
        }
        clusters
    }
}
