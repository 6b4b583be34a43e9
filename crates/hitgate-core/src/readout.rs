//! Readout scopes and readout request elements.
//!
//! An element tells the event builder which slice of detector data to keep:
//! a time interval plus a spatial scope (the whole detector, one string or a
//! single module).

use crate::hit::SensorId;
use crate::source::SourceId;
use crate::time::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial scope of a readout element, in declaration (and tie-break) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadoutScope {
    /// Both in-ice and IceTop; split into the two global scopes before merging.
    Global,
    InIceGlobal,
    InIceString,
    InIceModule,
    IceTopGlobal,
    IceTopModule,
}

impl ReadoutScope {
    pub const ALL: [ReadoutScope; 6] = [
        ReadoutScope::Global,
        ReadoutScope::InIceGlobal,
        ReadoutScope::InIceString,
        ReadoutScope::InIceModule,
        ReadoutScope::IceTopGlobal,
        ReadoutScope::IceTopModule,
    ];

    /// Wire code of the scope.
    pub fn code(self) -> u32 {
        match self {
            ReadoutScope::Global => 0,
            ReadoutScope::InIceGlobal => 1,
            ReadoutScope::InIceString => 2,
            ReadoutScope::InIceModule => 3,
            ReadoutScope::IceTopGlobal => 4,
            ReadoutScope::IceTopModule => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<ReadoutScope> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Merge priority: lower sorts first (global, then string, then module).
    pub fn priority(self) -> u8 {
        match self {
            ReadoutScope::Global | ReadoutScope::InIceGlobal | ReadoutScope::IceTopGlobal => 0,
            ReadoutScope::InIceString => 1,
            ReadoutScope::InIceModule | ReadoutScope::IceTopModule => 2,
        }
    }

    pub fn is_global(self) -> bool {
        self.priority() == 0
    }

    pub fn is_string(self) -> bool {
        self == ReadoutScope::InIceString
    }

    pub fn is_module(self) -> bool {
        self.priority() == 2
    }
}

impl fmt::Display for ReadoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadoutScope::Global => "GLOBAL",
            ReadoutScope::InIceGlobal => "II_GLOBAL",
            ReadoutScope::InIceString => "II_STRING",
            ReadoutScope::InIceModule => "II_MODULE",
            ReadoutScope::IceTopGlobal => "IT_GLOBAL",
            ReadoutScope::IceTopModule => "IT_MODULE",
        };
        f.write_str(name)
    }
}

/// What data to retain for one candidate interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadoutRequestElement {
    pub scope: ReadoutScope,
    pub interval: Interval,
    /// Source whose data is requested; meaningful for string and module scopes.
    pub source: SourceId,
    /// Set only for module scopes.
    pub sensor: Option<SensorId>,
}

/// Homogeneous-merge grouping key of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementKey {
    pub scope: ReadoutScope,
    pub source: Option<SourceId>,
    pub sensor: Option<SensorId>,
}

impl ReadoutRequestElement {
    pub fn global(scope: ReadoutScope, interval: Interval, source: SourceId) -> Self {
        Self {
            scope,
            interval,
            source,
            sensor: None,
        }
    }

    pub fn string(interval: Interval, hub: SourceId) -> Self {
        Self {
            scope: ReadoutScope::InIceString,
            interval,
            source: hub,
            sensor: None,
        }
    }

    pub fn module(scope: ReadoutScope, interval: Interval, hub: SourceId, sensor: SensorId) -> Self {
        Self {
            scope,
            interval,
            source: hub,
            sensor: Some(sensor),
        }
    }

    /// Elements with equal keys merge with each other.
    pub fn key(&self) -> ElementKey {
        ElementKey {
            scope: self.scope,
            source: (!self.scope.is_global()).then_some(self.source),
            sensor: if self.scope.is_module() {
                self.sensor
            } else {
                None
            },
        }
    }

    /// Split a `Global` element into its in-ice and IceTop halves.
    pub fn expand(self) -> Vec<ReadoutRequestElement> {
        match self.scope {
            ReadoutScope::Global => vec![
                ReadoutRequestElement {
                    scope: ReadoutScope::InIceGlobal,
                    ..self
                },
                ReadoutRequestElement {
                    scope: ReadoutScope::IceTopGlobal,
                    ..self
                },
            ],
            _ => vec![self],
        }
    }

    pub fn with_interval(self, interval: Interval) -> Self {
        Self { interval, ..self }
    }
}

impl fmt::Display for ReadoutRequestElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.scope, self.interval, self.source)?;
        if let Some(sensor) = self.sensor {
            write!(f, " dom {sensor}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_codes_roundtrip() {
        for scope in ReadoutScope::ALL {
            assert_eq!(ReadoutScope::from_code(scope.code()), Some(scope));
        }
        assert_eq!(ReadoutScope::from_code(9), None);
    }

    #[test]
    fn test_priority_order() {
        assert!(ReadoutScope::InIceGlobal.priority() < ReadoutScope::InIceString.priority());
        assert!(ReadoutScope::InIceString.priority() < ReadoutScope::IceTopModule.priority());
    }

    #[test]
    fn test_global_expands() {
        let elem = ReadoutRequestElement::global(
            ReadoutScope::Global,
            Interval::ticks(1, 2),
            SourceId::GLOBAL_TRIGGER,
        );
        let parts = elem.expand();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].scope, ReadoutScope::InIceGlobal);
        assert_eq!(parts[1].scope, ReadoutScope::IceTopGlobal);
    }

    #[test]
    fn test_key_ignores_source_for_global() {
        let a = ReadoutRequestElement::global(
            ReadoutScope::InIceGlobal,
            Interval::ticks(1, 2),
            SourceId::INICE_TRIGGER,
        );
        let b = ReadoutRequestElement::global(
            ReadoutScope::InIceGlobal,
            Interval::ticks(5, 6),
            SourceId::GLOBAL_TRIGGER,
        );
        assert_eq!(a.key(), b.key());

        let s1 = ReadoutRequestElement::string(Interval::ticks(1, 2), SourceId::string_hub(1));
        let s2 = ReadoutRequestElement::string(Interval::ticks(1, 2), SourceId::string_hub(2));
        assert_ne!(s1.key(), s2.key());
    }
}
