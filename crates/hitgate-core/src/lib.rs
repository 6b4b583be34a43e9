//! # Hitgate Core
//!
//! Value types shared by every stage of the hitgate trigger decision core.
//!
//! ## Modules
//!
//! - [`time`]: DAQ clock ticks and closed intervals
//! - [`hit`]: Sensor hits and the payloads fed to trigger algorithms
//! - [`source`]: Source identities of hit producers and trigger components
//! - [`readout`]: Readout scopes and readout request elements
//! - [`request`]: Trigger kinds and finalized trigger requests
//!
//! ## Quick Start
//!
//! ```rust
//! use hitgate_core::{Hit, Interval, SensorId, SourceId, UtcTime};
//!
//! let hit = Hit::new(SensorId(0x1234), SourceId::string_hub(21), UtcTime::new(10), 0x2);
//! assert!(hit.is_spe());
//!
//! let a = Interval::ticks(11, 15);
//! assert!(!a.overlaps(&Interval::ticks(18, 25)));
//! ```
//!
//! ## See Also
//!
//! - [`hitgate_runtime`](../hitgate_runtime): Algorithms, merging and collection

pub mod hit;
pub mod readout;
pub mod request;
pub mod source;
pub mod time;

pub use hit::{Hit, Payload, PayloadKind, SensorId};
pub use readout::{ReadoutRequestElement, ReadoutScope};
pub use request::{TriggerKind, TriggerRequest};
pub use source::SourceId;
pub use time::{Interval, UtcTime};
