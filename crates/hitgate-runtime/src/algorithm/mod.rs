//! Trigger algorithms.
//!
//! Every algorithm turns an ordered payload stream into candidate
//! [`TriggerRequest`]s and reports the earliest time it may still need to
//! revisit. The known variants are collected in [`Algorithm`], which the
//! collector and the trigger handler drive through [`TriggerAlgorithm`].

pub mod core;
pub mod min_bias;
pub mod multiplicity;
pub mod throughput;
pub mod volume;
pub mod window;

pub use self::core::{AlgorithmCore, ReadoutWindow};
pub use min_bias::MinBiasTrigger;
pub use multiplicity::{RerunPolicy, SimpleMajorityTrigger};
pub use throughput::ThroughputTrigger;
pub use volume::VolumeTrigger;
pub use window::{HitCollection, SlidingTimeWindow};

use crate::error::{ConfigError, TriggerError};
use hitgate_core::{Payload, PayloadKind, SourceId, TriggerKind, TriggerRequest, UtcTime};

/// Capability interface shared by all trigger algorithms.
pub trait TriggerAlgorithm: Send {
    fn core(&self) -> &AlgorithmCore;

    fn core_mut(&mut self) -> &mut AlgorithmCore;

    /// Set one named parameter from its string form.
    fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), ConfigError>;

    /// True once every required parameter has been set.
    fn is_ready(&self) -> bool;

    /// Payload kind this algorithm accepts.
    fn consumes(&self) -> PayloadKind {
        PayloadKind::Hit
    }

    /// Feed the next payload of the stream.
    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError>;

    /// End of stream: emit any open trigger and reset to the initial state.
    fn flush(&mut self);

    /// Return to the initial state, keeping configuration.
    fn reset(&mut self);

    fn name(&self) -> &str {
        self.core().name()
    }

    fn kind(&self) -> TriggerKind {
        self.core().kind()
    }

    fn config_id(&self) -> i32 {
        self.core().config_id()
    }

    fn source(&self) -> SourceId {
        self.core().source()
    }

    /// Drain requests completed since the last call.
    fn take_ready(&mut self) -> Vec<TriggerRequest> {
        self.core_mut().take_ready()
    }

    fn earliest_time_of_interest(&self) -> Option<UtcTime> {
        self.core().earliest_time_of_interest()
    }

    fn trigger_count(&self) -> u64 {
        self.core().trigger_count()
    }

    /// Apply a whole parameter list, stopping at the first failure.
    fn configure<'a, I>(&mut self, params: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
        Self: Sized,
    {
        for (name, value) in params {
            self.add_parameter(name, value)?;
        }
        Ok(())
    }
}

/// Closed set of algorithm variants.
#[derive(Debug)]
pub enum Algorithm {
    SimpleMajority(SimpleMajorityTrigger),
    MinBias(MinBiasTrigger),
    Volume(VolumeTrigger),
    Throughput(ThroughputTrigger),
}

macro_rules! dispatch {
    ($self:ident, $alg:ident => $body:expr) => {
        match $self {
            Algorithm::SimpleMajority($alg) => $body,
            Algorithm::MinBias($alg) => $body,
            Algorithm::Volume($alg) => $body,
            Algorithm::Throughput($alg) => $body,
        }
    };
}

impl TriggerAlgorithm for Algorithm {
    fn core(&self) -> &AlgorithmCore {
        dispatch!(self, a => a.core())
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        dispatch!(self, a => a.core_mut())
    }

    fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        dispatch!(self, a => a.add_parameter(name, value))
    }

    fn is_ready(&self) -> bool {
        dispatch!(self, a => a.is_ready())
    }

    fn consumes(&self) -> PayloadKind {
        dispatch!(self, a => a.consumes())
    }

    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError> {
        dispatch!(self, a => a.process(payload))
    }

    fn flush(&mut self) {
        dispatch!(self, a => a.flush())
    }

    fn reset(&mut self) {
        dispatch!(self, a => a.reset())
    }
}

impl From<SimpleMajorityTrigger> for Algorithm {
    fn from(a: SimpleMajorityTrigger) -> Self {
        Algorithm::SimpleMajority(a)
    }
}

impl From<MinBiasTrigger> for Algorithm {
    fn from(a: MinBiasTrigger) -> Self {
        Algorithm::MinBias(a)
    }
}

impl From<VolumeTrigger> for Algorithm {
    fn from(a: VolumeTrigger) -> Self {
        Algorithm::Volume(a)
    }
}

impl From<ThroughputTrigger> for Algorithm {
    fn from(a: ThroughputTrigger) -> Self {
        Algorithm::Throughput(a)
    }
}

/// Extract the hit from a payload, rejecting the wrong payload kind.
pub(crate) fn expect_hit<'p>(
    core: &AlgorithmCore,
    payload: &'p Payload,
) -> Result<&'p hitgate_core::Hit, TriggerError> {
    match payload {
        Payload::Hit(hit) => Ok(hit),
        other => Err(TriggerError::wrong_payload(
            core.name(),
            PayloadKind::Hit,
            other.kind(),
        )),
    }
}
