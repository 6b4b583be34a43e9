//! Pass-through trigger for the global collector.
//!
//! Wraps every incoming trigger request into one request of its own, so that
//! the global trigger forwards everything the in-detector triggers found.

use super::core::AlgorithmCore;
use super::TriggerAlgorithm;
use crate::error::{ConfigError, TriggerError};
use hitgate_core::{Payload, PayloadKind, SourceId, TriggerKind, TriggerRequest};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct ThroughputTrigger {
    core: AlgorithmCore,
}

impl ThroughputTrigger {
    pub fn new(name: impl Into<String>, config_id: i32, source: SourceId) -> Self {
        Self {
            core: AlgorithmCore::new(name, TriggerKind::Throughput, config_id, source),
        }
    }
}

impl TriggerAlgorithm for ThroughputTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    /// Takes no parameters.
    fn add_parameter(&mut self, name: &str, _value: &str) -> Result<(), ConfigError> {
        Err(self.core.unknown(name))
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn consumes(&self) -> PayloadKind {
        PayloadKind::Request
    }

    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError> {
        let incoming = match payload {
            Payload::Request(req) => req,
            other => {
                return Err(TriggerError::wrong_payload(
                    self.core.name(),
                    PayloadKind::Request,
                    other.kind(),
                ))
            }
        };
        let start = self.core.accept_time(Some(incoming.interval.start))?;

        let wrapped = TriggerRequest::new(
            0,
            TriggerKind::Throughput,
            self.core.config_id(),
            self.core.source(),
            incoming.interval,
        )
        .with_elements(incoming.elements.clone())
        .with_sub_requests(vec![incoming.clone()]);

        trace!(algorithm = %self.core.name(), request = %wrapped, "wrapped request");
        self.core.push_request(wrapped);
        self.core.advance_earliest(start);
        Ok(())
    }

    fn flush(&mut self) {
        self.core.flush_reset();
    }

    fn reset(&mut self) {
        self.core.reset();
    }
}
