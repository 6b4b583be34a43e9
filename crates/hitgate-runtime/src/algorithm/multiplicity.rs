//! Simple majority (multiplicity) trigger.
//!
//! Fires when at least `threshold` usable hits fall inside a sliding window of
//! `timeWindow` ticks. Once on, the trigger keeps absorbing hits until the
//! window has slid down to a single hit, then emits `[first, last]` of every
//! hit it absorbed.

use super::core::AlgorithmCore;
use super::window::{HitCollection, SlidingTimeWindow};
use super::{expect_hit, TriggerAlgorithm};
use crate::error::{ConfigError, TriggerError};
use hitgate_core::{Hit, Payload, SourceId, TriggerKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do with the hit that closed a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerunPolicy {
    /// The closing hit only seeds the window; it can start a trigger only once
    /// another hit joins it.
    #[default]
    Drop,
    /// The closing hit is re-evaluated against the reset trigger state, so with
    /// `threshold == 1` it immediately opens the next trigger.
    Rerun,
}

impl RerunPolicy {
    pub fn from_flag(rerun: bool) -> Self {
        if rerun {
            RerunPolicy::Rerun
        } else {
            RerunPolicy::Drop
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimpleMajorityTrigger {
    core: AlgorithmCore,
    threshold: Option<usize>,
    time_window: Option<i64>,
    rerun: RerunPolicy,
    warned_drop: bool,
    window: SlidingTimeWindow,
    accumulated: HitCollection,
}

impl SimpleMajorityTrigger {
    pub fn new(name: impl Into<String>, config_id: i32, source: SourceId, rerun: RerunPolicy) -> Self {
        Self {
            core: AlgorithmCore::new(name, TriggerKind::SimpleMajority, config_id, source),
            threshold: None,
            time_window: None,
            rerun,
            warned_drop: false,
            window: SlidingTimeWindow::new(0),
            accumulated: HitCollection::new(),
        }
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    pub fn time_window(&self) -> Option<i64> {
        self.time_window
    }

    pub fn rerun_policy(&self) -> RerunPolicy {
        self.rerun
    }

    pub fn window(&self) -> &SlidingTimeWindow {
        &self.window
    }

    /// Hits absorbed by the open trigger, empty when no trigger is open.
    pub fn accumulated(&self) -> &HitCollection {
        &self.accumulated
    }

    pub fn has_trigger(&self) -> bool {
        !self.accumulated.is_empty()
    }

    fn above_threshold(&self) -> bool {
        self.window.len() >= self.threshold.unwrap_or(usize::MAX)
    }

    fn usable(&self, hit: &Hit) -> bool {
        hit.is_spe() && self.core.uses_sensor(hit.sensor)
    }

    fn flush_trigger(&mut self) {
        if self.has_trigger() {
            let hits = self.accumulated.take();
            self.core.form_trigger(hits);
        }
    }

    fn process_hit(&mut self, hit: &Hit) -> Result<(), TriggerError> {
        if !self.is_ready() {
            return Err(TriggerError::NotConfigured {
                algorithm: self.core.name().to_string(),
            });
        }
        let time = self.core.accept_time(hit.time)?;

        if self.rerun == RerunPolicy::Drop && !self.warned_drop {
            self.warned_drop = true;
            warn!(
                algorithm = %self.core.name(),
                "Closing hits are not re-evaluated; set rerun to reuse them"
            );
        }

        if self.window.is_empty() {
            self.core.advance_earliest(time);
        }

        if !self.usable(hit) {
            return Ok(());
        }

        while !self.window.is_empty() && !self.window.in_window(time) {
            if let Some(old) = self.window.slide() {
                // While a trigger is open every evicted hit belongs to it.
                if !self.has_trigger() {
                    if let Some(old_time) = old.time {
                        self.core.advance_earliest(old_time.just_after());
                    }
                }
            }
        }

        self.window.push(*hit);

        if !self.above_threshold() && !self.has_trigger() {
            return Ok(());
        }

        if self.window.len() == 1 && self.has_trigger() {
            debug!(algorithm = %self.core.name(), %time, "window emptied, closing trigger");
            self.flush_trigger();
            if self.rerun == RerunPolicy::Rerun && self.above_threshold() {
                self.accumulated.extend_from(self.window.hits());
            }
            return Ok(());
        }

        if self.has_trigger() {
            self.accumulated.push(*hit);
        } else {
            debug!(
                algorithm = %self.core.name(),
                hits = self.window.len(),
                "threshold reached, trigger on"
            );
            self.accumulated.extend_from(self.window.hits());
        }
        Ok(())
    }
}

impl TriggerAlgorithm for SimpleMajorityTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "threshold" => {
                self.threshold = Some(self.core.parse_u32(name, value)? as usize);
            }
            "timeWindow" => {
                let length = self.core.parse_i64(name, value)?;
                self.time_window = Some(length);
                self.window.set_length(length);
            }
            _ => {
                if !self.core.add_common_parameter(name, value)? {
                    return Err(self.core.unknown(name));
                }
            }
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.threshold.is_some() && self.time_window.is_some()
    }

    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError> {
        let hit = expect_hit(&self.core, payload)?;
        self.process_hit(hit)
    }

    fn flush(&mut self) {
        self.flush_trigger();
        self.window.clear();
        self.accumulated.clear();
        self.core.flush_reset();
    }

    fn reset(&mut self) {
        self.window.clear();
        self.accumulated.clear();
        self.core.reset();
    }
}
