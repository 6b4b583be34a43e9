//! Minimum-bias prescale trigger: every `prescale`th usable hit becomes a
//! single-hit request.

use super::core::AlgorithmCore;
use super::{expect_hit, TriggerAlgorithm};
use crate::error::{ConfigError, TriggerError};
use hitgate_core::{Payload, SourceId, TriggerKind};

#[derive(Debug, Clone)]
pub struct MinBiasTrigger {
    core: AlgorithmCore,
    prescale: Option<u32>,
    counted: u64,
}

impl MinBiasTrigger {
    pub fn new(name: impl Into<String>, config_id: i32, source: SourceId) -> Self {
        Self {
            core: AlgorithmCore::new(name, TriggerKind::MinBias, config_id, source),
            prescale: None,
            counted: 0,
        }
    }

    pub fn prescale(&self) -> Option<u32> {
        self.prescale
    }

    /// Usable hits seen so far.
    pub fn counted(&self) -> u64 {
        self.counted
    }
}

impl TriggerAlgorithm for MinBiasTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "prescale" => {
                let prescale = self.core.parse_u32(name, value)?;
                if prescale == 0 {
                    return Err(self.core.invalid(name, value, "must be at least 1".to_string()));
                }
                self.prescale = Some(prescale);
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
        self.prescale.is_some()
    }

    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError> {
        let hit = expect_hit(&self.core, payload)?;
        let prescale = self.prescale.ok_or_else(|| TriggerError::NotConfigured {
            algorithm: self.core.name().to_string(),
        })?;
        let time = self.core.accept_time(hit.time)?;

        let mut formed = false;
        if self.core.uses_sensor(hit.sensor) {
            self.counted += 1;
            if self.counted % u64::from(prescale) == 0 {
                self.core.form_trigger(vec![*hit]);
                formed = true;
            }
        }

        if !formed {
            self.core.advance_earliest(time.just_after());
        }
        Ok(())
    }

    /// Nothing is ever held back, so flushing only restarts the stream.
    fn flush(&mut self) {
        self.counted = 0;
        self.core.flush_reset();
    }

    fn reset(&mut self) {
        self.counted = 0;
        self.core.reset();
    }
}
