//! Sensor hits and algorithm payloads.

use crate::request::TriggerRequest;
use crate::source::SourceId;
use crate::time::UtcTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mainboard id of a single optical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u64);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

/// A qualifying pulse observed by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hit {
    pub sensor: SensorId,
    /// String hub that delivered this hit.
    pub source: SourceId,
    /// `None` marks a malformed hit; algorithms reject it.
    pub time: Option<UtcTime>,
    pub trigger_mode: u32,
}

impl Hit {
    /// Bit of `trigger_mode` set for single photo-electron pulses.
    pub const SPE_BIT: u32 = 0x2;

    pub fn new(sensor: SensorId, source: SourceId, time: UtcTime, trigger_mode: u32) -> Self {
        Self {
            sensor,
            source,
            time: Some(time),
            trigger_mode,
        }
    }

    pub fn untimed(sensor: SensorId, source: SourceId, trigger_mode: u32) -> Self {
        Self {
            sensor,
            source,
            time: None,
            trigger_mode,
        }
    }

    pub fn is_spe(&self) -> bool {
        self.trigger_mode & Self::SPE_BIT == Self::SPE_BIT
    }
}

/// The two kinds of payload an algorithm may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Hit,
    Request,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Hit => f.write_str("hit"),
            PayloadKind::Request => f.write_str("trigger request"),
        }
    }
}

/// An item of the ordered input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Hit(Hit),
    Request(TriggerRequest),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Hit(_) => PayloadKind::Hit,
            Payload::Request(_) => PayloadKind::Request,
        }
    }

    /// Ordering time: the hit time, or the request start.
    pub fn time(&self) -> Option<UtcTime> {
        match self {
            Payload::Hit(hit) => hit.time,
            Payload::Request(req) => Some(req.interval.start),
        }
    }

    pub fn source(&self) -> SourceId {
        match self {
            Payload::Hit(hit) => hit.source,
            Payload::Request(req) => req.source,
        }
    }
}

impl From<Hit> for Payload {
    fn from(hit: Hit) -> Self {
        Payload::Hit(hit)
    }
}

impl From<TriggerRequest> for Payload {
    fn from(req: TriggerRequest) -> Self {
        Payload::Request(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spe_bit() {
        let src = SourceId::string_hub(1);
        assert!(Hit::new(SensorId(1), src, UtcTime::new(0), 0x2).is_spe());
        assert!(Hit::new(SensorId(1), src, UtcTime::new(0), 0x3).is_spe());
        assert!(!Hit::new(SensorId(1), src, UtcTime::new(0), 0x1).is_spe());
    }

    #[test]
    fn test_payload_time_and_kind() {
        let src = SourceId::string_hub(1);
        let p: Payload = Hit::new(SensorId(1), src, UtcTime::new(42), 2).into();
        assert_eq!(p.kind(), PayloadKind::Hit);
        assert_eq!(p.time(), Some(UtcTime::new(42)));
        assert_eq!(p.source(), src);

        let untimed: Payload = Hit::untimed(SensorId(1), src, 2).into();
        assert_eq!(untimed.time(), None);
    }

    #[test]
    fn test_hit_serializes() {
        let hit = Hit::new(SensorId(5), SourceId::string_hub(2), UtcTime::new(7), 2);
        let json = serde_json::to_string(&hit).unwrap();
        assert_eq!(
            json,
            r#"{"sensor":5,"source":12002,"time":7,"trigger_mode":2}"#
        );
    }
}
