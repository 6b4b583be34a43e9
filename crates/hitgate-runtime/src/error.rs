//! Error types for the trigger runtime.
//!
//! Each concern has its own enum. Configuration and ordering errors surface to
//! the caller; accounting and sink errors are logged by the collector and never
//! abort trigger emission.

use hitgate_core::{PayloadKind, TriggerKind, UtcTime};
use std::path::PathBuf;

/// Configuration-time failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The algorithm does not know this parameter name.
    #[error("Unknown parameter \"{name}\" for {algorithm}")]
    UnknownParameter { algorithm: String, name: String },

    /// The value does not parse or fails the parameter's validity check.
    #[error("Invalid value \"{value}\" for parameter \"{name}\" of {algorithm}: {reason}")]
    InvalidParameter {
        algorithm: String,
        name: String,
        value: String,
        reason: String,
    },

    /// A required parameter is still missing.
    #[error("{algorithm} is not fully configured: missing {missing}")]
    NotReady { algorithm: String, missing: String },

    #[error("Unknown algorithm kind \"{0}\"")]
    UnknownAlgorithm(String),

    #[error("{0} needs a detector topology")]
    MissingTopology(String),

    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Per-payload processing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("{algorithm}: payload at {time} precedes previous payload at {previous}")]
    OutOfOrder {
        algorithm: String,
        time: UtcTime,
        previous: UtcTime,
    },

    #[error("{algorithm}: invalid input: {reason}")]
    InvalidInput { algorithm: String, reason: String },

    #[error("{algorithm}: cannot process before configuration is complete")]
    NotConfigured { algorithm: String },

    #[error("Duplicate algorithm {kind} config {config_id} on {source_name}")]
    DuplicateAlgorithm {
        kind: TriggerKind,
        config_id: i32,
        source_name: String,
    },
}

impl TriggerError {
    pub(crate) fn wrong_payload(algorithm: &str, expected: PayloadKind, got: PayloadKind) -> Self {
        TriggerError::InvalidInput {
            algorithm: algorithm.to_string(),
            reason: format!("expected {expected} payload, got {got}"),
        }
    }

    pub(crate) fn missing_time(algorithm: &str) -> Self {
        TriggerError::InvalidInput {
            algorithm: algorithm.to_string(),
            reason: "hit has no time".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatermarkError {
    #[error("Watermark moved backwards from {previous} to {requested}")]
    Backward {
        previous: UtcTime,
        requested: UtcTime,
    },
}

/// Failures of the multiplicity data manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountingError {
    #[error("Run number has not been set")]
    NoRunNumber,

    #[error("Multiplicity summary channel closed")]
    ChannelClosed,

    #[error("Accounting failed: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Sink {0} is closed")]
    Closed(String),

    #[error("Sink rejected buffer: {0}")]
    Rejected(String),
}

/// Errors that abort a collector cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}
