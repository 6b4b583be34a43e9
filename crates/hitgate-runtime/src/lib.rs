//! Trigger decision runtime.
//!
//! Hits flow through a [`TriggerHandler`] into a set of trigger algorithms.
//! Each algorithm keeps its own sliding window and queues candidate requests
//! together with an earliest time of interest. A [`Collector`], usually driven
//! by a [`CollectorThread`], gathers those candidates, waits until the lowest
//! earliest time of interest has passed them, merges overlapping candidates
//! and pushes the final requests to a [`RequestSink`].
//!
//! ```text
//! hits -> TriggerHandler -> algorithms -> RequestBag -> Collector -> sink
//!                                 \-> WatermarkTracker -/
//! ```

pub mod accounting;
pub mod algorithm;
pub mod bag;
pub mod collector;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod merge;
pub mod sink;
pub mod topology;
pub mod watermark;
pub mod worker;

pub use accounting::{MultiplicityBins, MultiplicityDataManager, MultiplicitySummary};
pub use algorithm::{
    Algorithm, MinBiasTrigger, ReadoutWindow, RerunPolicy, SimpleMajorityTrigger,
    ThroughputTrigger, TriggerAlgorithm, VolumeTrigger,
};
pub use bag::{BagEntry, RequestBag};
pub use collector::{Collector, CollectorStats};
pub use config::{LoggingConfig, TriggerConfig};
pub use error::{
    AccountingError, CollectorError, ConfigError, SinkError, TriggerError, WatermarkError,
};
pub use handler::TriggerHandler;
pub use merge::{MergeEngine, MergePolicy};
pub use sink::{BufferCache, ChannelSink, JsonEncoder, MemorySink, RequestEncoder, RequestSink};
pub use topology::{SensorLocation, StaticTopology, Topology};
pub use watermark::WatermarkTracker;
pub use worker::{CollectorSignal, CollectorThread};

pub use hitgate_core::{
    Hit, Interval, Payload, PayloadKind, ReadoutRequestElement, ReadoutScope, SensorId, SourceId,
    TriggerKind, TriggerRequest, UtcTime,
};
