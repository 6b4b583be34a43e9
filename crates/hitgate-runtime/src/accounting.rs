//! Multiplicity accounting for global trigger requests.
//!
//! The collector of the global trigger feeds every request it emits to a
//! [`MultiplicityDataManager`]. Accounting is best effort: the collector logs
//! failures and carries on.
//!
//! [`MultiplicityBins`] assumes a single writer. Only the global collector
//! calls it and the type does no locking of its own; share it behind a mutex
//! if that assumption ever changes.

use crate::error::AccountingError;
use chrono::{DateTime, Utc};
use hitgate_core::{TriggerKind, TriggerRequest, UtcTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub trait MultiplicityDataManager: Send {
    /// Account for one emitted request.
    fn add(&mut self, request: &TriggerRequest) -> Result<(), AccountingError>;

    /// Whether the pending data should be sent now.
    fn send_due(&self) -> bool;

    /// Publish pending data. Returns `true` when a reset is due as well.
    fn send(&mut self) -> Result<bool, AccountingError>;

    fn reset(&mut self) -> Result<(), AccountingError>;
}

/// Counts of requests per multiplicity for one trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiplicityHistogram {
    pub kind: TriggerKind,
    pub config_id: i32,
    /// Multiplicity (distinct sensors) to number of requests.
    pub counts: BTreeMap<usize, u64>,
}

/// One published time bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiplicitySummary {
    pub run_number: u32,
    pub bin_start: UtcTime,
    pub bin_end: UtcTime,
    pub sent_at: DateTime<Utc>,
    pub histograms: Vec<MultiplicityHistogram>,
}

impl MultiplicitySummary {
    pub fn total_requests(&self) -> u64 {
        self.histograms
            .iter()
            .flat_map(|h| h.counts.values())
            .sum()
    }
}

/// Fixed-width time bins of multiplicity histograms.
#[derive(Debug)]
pub struct MultiplicityBins {
    bin_width: i64,
    run_number: Option<u32>,
    pending_run: Option<u32>,
    bin_start: Option<UtcTime>,
    latest: Option<UtcTime>,
    histograms: BTreeMap<(TriggerKind, i32), BTreeMap<usize, u64>>,
    tx: mpsc::UnboundedSender<MultiplicitySummary>,
}

impl MultiplicityBins {
    /// Bins of `bin_width` ticks, published on `tx`.
    pub fn new(bin_width: i64, tx: mpsc::UnboundedSender<MultiplicitySummary>) -> Self {
        Self {
            bin_width: bin_width.max(1),
            run_number: None,
            pending_run: None,
            bin_start: None,
            latest: None,
            histograms: BTreeMap::new(),
            tx,
        }
    }

    pub fn run_number(&self) -> Option<u32> {
        self.run_number
    }

    /// Set the run number. While a run is active the new number is held until
    /// the next reset.
    pub fn set_run_number(&mut self, run: u32) {
        if self.run_number.is_none() {
            self.run_number = Some(run);
        } else {
            info!(run, "run switch pending");
            self.pending_run = Some(run);
        }
    }

    pub fn bin_start(&self) -> Option<UtcTime> {
        self.bin_start
    }

    fn align(&self, time: UtcTime) -> UtcTime {
        UtcTime::new(time.ticks() - time.ticks().rem_euclid(self.bin_width))
    }

    fn bin_end(&self) -> Option<UtcTime> {
        self.bin_start.map(|s| s.offset(self.bin_width))
    }
}

impl MultiplicityDataManager for MultiplicityBins {
    fn add(&mut self, request: &TriggerRequest) -> Result<(), AccountingError> {
        if self.run_number.is_none() {
            return Err(AccountingError::NoRunNumber);
        }
        if self.bin_start.is_none() {
            self.bin_start = Some(self.align(request.interval.start));
        }
        self.latest = Some(
            self.latest
                .map_or(request.interval.end, |t| t.max(request.interval.end)),
        );

        for leaf in request.leaves() {
            *self
                .histograms
                .entry((leaf.kind, leaf.config_id))
                .or_default()
                .entry(leaf.multiplicity())
                .or_default() += 1;
        }
        Ok(())
    }

    fn send_due(&self) -> bool {
        if self.pending_run.is_some() {
            return true;
        }
        match (self.bin_end(), self.latest) {
            (Some(end), Some(latest)) => latest >= end,
            _ => false,
        }
    }

    fn send(&mut self) -> Result<bool, AccountingError> {
        let run_number = self.run_number.ok_or(AccountingError::NoRunNumber)?;
        let (Some(bin_start), Some(bin_end)) = (self.bin_start, self.bin_end()) else {
            return Ok(self.pending_run.is_some());
        };

        // Pending counts stay in place until the summary is out.
        let histograms = self
            .histograms
            .iter()
            .map(|(&(kind, config_id), counts)| MultiplicityHistogram {
                kind,
                config_id,
                counts: counts.clone(),
            })
            .collect();
        let summary = MultiplicitySummary {
            run_number,
            bin_start,
            bin_end,
            sent_at: Utc::now(),
            histograms,
        };
        debug!(run_number, %bin_start, %bin_end, "sending multiplicity summary");
        self.tx
            .send(summary)
            .map_err(|_| AccountingError::ChannelClosed)?;

        self.histograms.clear();
        self.bin_start = self.latest.map(|t| self.align(t));
        Ok(self.pending_run.is_some())
    }

    fn reset(&mut self) -> Result<(), AccountingError> {
        self.histograms.clear();
        self.bin_start = None;
        self.latest = None;
        if let Some(run) = self.pending_run.take() {
            info!(run, "switched run");
            self.run_number = Some(run);
        }
        Ok(())
    }
}
