//! Source identities.
//!
//! Every hit producer (string hub) and every trigger component has a numeric
//! source id. Trigger components use fixed ids; hubs are numbered from
//! [`SourceId::STRING_HUB_BASE`].

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl SourceId {
    pub const INICE_TRIGGER: SourceId = SourceId(4000);
    pub const ICETOP_TRIGGER: SourceId = SourceId(5000);
    pub const GLOBAL_TRIGGER: SourceId = SourceId(6000);
    pub const AMANDA_TRIGGER: SourceId = SourceId(10000);
    pub const STRING_HUB_BASE: u32 = 12000;

    /// Source id of the hub reading out detector string `string`.
    pub const fn string_hub(string: u32) -> SourceId {
        SourceId(Self::STRING_HUB_BASE + string)
    }

    /// True for the global trigger, the only component that performs
    /// multiplicity accounting.
    pub fn is_global(self) -> bool {
        self == Self::GLOBAL_TRIGGER
    }

    /// Detector string number, when this is a string hub.
    pub fn hub_string(self) -> Option<u32> {
        self.0.checked_sub(Self::STRING_HUB_BASE)
    }

    pub fn name(self) -> String {
        match self {
            Self::INICE_TRIGGER => "inIceTrigger".to_string(),
            Self::ICETOP_TRIGGER => "iceTopTrigger".to_string(),
            Self::GLOBAL_TRIGGER => "globalTrigger".to_string(),
            Self::AMANDA_TRIGGER => "amandaTrigger".to_string(),
            other => match other.hub_string() {
                Some(string) => format!("stringHub#{string}"),
                None => format!("source#{}", other.0),
            },
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
