//! Configuration file support for the trigger runtime
//!
//! Supports both YAML and TOML configuration files.
//!
//! # Example TOML configuration:
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [collector]
//! source = 4000
//! merge_gap = 0
//!
//! [[algorithm]]
//! kind = "simple_majority"
//! name = "InIceSMT8"
//! config_id = 2
//! parameters = { threshold = 8, timeWindow = 50000 }
//! readouts = [{ scope = "in_ice_global", minus = 40000, plus = 60000 }]
//! ```

use crate::algorithm::{
    Algorithm, MinBiasTrigger, ReadoutWindow, RerunPolicy, SimpleMajorityTrigger,
    ThroughputTrigger, TriggerAlgorithm, VolumeTrigger,
};
use crate::error::ConfigError;
use crate::merge::MergePolicy;
use crate::topology::{StaticTopology, Topology};
use hitgate_core::{SensorId, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub logging: LoggingConfig,

    pub collector: CollectorConfig,

    /// Algorithms feeding the collector, in dispatch order
    #[serde(alias = "algorithms")]
    pub algorithm: Vec<AlgorithmConfig>,

    /// Detector layout, needed by volume triggers
    pub topology: Option<TopologyConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Include timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Source id stamped on emitted requests
    pub source: SourceId,

    /// Merge gap in ticks; 0 merges only overlapping intervals
    pub merge_gap: i64,

    /// Sources whose trigger requests the handler accepts
    pub request_sources: Vec<SourceId>,

    /// Width of multiplicity accounting bins in ticks
    pub bin_width: i64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source: SourceId::INICE_TRIGGER,
            merge_gap: 0,
            request_sources: Vec::new(),
            // One second of 0.1 ns ticks.
            bin_width: 10_000_000_000,
        }
    }
}

impl CollectorConfig {
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy::with_gap(self.merge_gap)
    }
}

/// A parameter value as written in the file. Algorithms parse from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// One algorithm entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    /// simple_majority, min_bias, volume or throughput
    pub kind: String,

    /// Defaults to the kind name
    pub name: Option<String>,

    pub config_id: i32,

    /// Defaults to the collector source
    pub source: Option<SourceId>,

    /// Re-evaluate the hit that closed a multiplicity trigger
    pub rerun: bool,

    pub parameters: BTreeMap<String, ParamValue>,

    pub readouts: Vec<ReadoutWindow>,

    /// Restrict the algorithm to these sensors
    pub hit_filter: Option<Vec<SensorId>>,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            kind: String::new(),
            name: None,
            config_id: 0,
            source: None,
            rerun: false,
            parameters: BTreeMap::new(),
            readouts: Vec::new(),
            hit_filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlgorithmKind {
    SimpleMajority,
    MinBias,
    Volume,
    Throughput,
}

impl AlgorithmKind {
    fn parse(kind: &str) -> Option<Self> {
        let normalized: String = kind
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "simplemajority" | "simplemajoritytrigger" | "smt" => Some(Self::SimpleMajority),
            "minbias" | "minbiastrigger" => Some(Self::MinBias),
            "volume" | "volumetrigger" => Some(Self::Volume),
            "throughput" | "throughputtrigger" => Some(Self::Throughput),
            _ => None,
        }
    }

    fn required(self) -> &'static [&'static str] {
        match self {
            Self::SimpleMajority => &["threshold", "timeWindow"],
            Self::MinBias => &["prescale"],
            Self::Volume => &["threshold", "timeWindow", "volumeHeight", "centerShift"],
            Self::Throughput => &[],
        }
    }
}

/// Sensor table entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorEntry {
    pub sensor: SensorId,
    pub string: u32,
    pub position: i32,
}

/// String table entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringEntry {
    pub string: u32,
    pub neighbors: Vec<u32>,
    /// Vertical offset relative to the reference string
    pub offset: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub sensors: Vec<SensorEntry>,
    pub strings: Vec<StringEntry>,
}

impl TopologyConfig {
    pub fn build(&self) -> StaticTopology {
        let mut builder = StaticTopology::builder();
        for s in &self.sensors {
            builder = builder.sensor(s.sensor, s.string, s.position);
        }
        for entry in &self.strings {
            builder = builder.vertical_offset(entry.string, entry.offset);
            for &neighbor in &entry.neighbors {
                builder = builder.adjacent(entry.string, neighbor);
            }
        }
        builder.build()
    }
}

impl TriggerConfig {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Topology from the inline table, if any
    pub fn topology(&self) -> Option<Arc<dyn Topology>> {
        self.topology
            .as_ref()
            .map(|t| Arc::new(t.build()) as Arc<dyn Topology>)
    }

    /// Build every configured algorithm.
    ///
    /// `topology` overrides the inline table. Stops at the first entry that
    /// fails to configure.
    pub fn build_algorithms(
        &self,
        topology: Option<Arc<dyn Topology>>,
    ) -> Result<Vec<Algorithm>, ConfigError> {
        let topology = topology.or_else(|| self.topology());
        self.algorithm
            .iter()
            .map(|entry| build_algorithm(entry, self.collector.source, topology.as_ref()))
            .collect()
    }
}

fn build_algorithm(
    entry: &AlgorithmConfig,
    default_source: SourceId,
    topology: Option<&Arc<dyn Topology>>,
) -> Result<Algorithm, ConfigError> {
    let kind = AlgorithmKind::parse(&entry.kind)
        .ok_or_else(|| ConfigError::UnknownAlgorithm(entry.kind.clone()))?;
    let name = entry.name.clone().unwrap_or_else(|| entry.kind.clone());
    let source = entry.source.unwrap_or(default_source);

    let mut algorithm: Algorithm = match kind {
        AlgorithmKind::SimpleMajority => SimpleMajorityTrigger::new(
            name.clone(),
            entry.config_id,
            source,
            RerunPolicy::from_flag(entry.rerun),
        )
        .into(),
        AlgorithmKind::MinBias => MinBiasTrigger::new(name.clone(), entry.config_id, source).into(),
        AlgorithmKind::Volume => {
            let topology = topology
                .cloned()
                .ok_or_else(|| ConfigError::MissingTopology(name.clone()))?;
            VolumeTrigger::new(name.clone(), entry.config_id, source, topology).into()
        }
        AlgorithmKind::Throughput => {
            ThroughputTrigger::new(name.clone(), entry.config_id, source).into()
        }
    };

    for (param, value) in &entry.parameters {
        algorithm.add_parameter(param, &value.to_string())?;
    }
    for window in &entry.readouts {
        algorithm.core_mut().add_readout(*window);
    }
    if let Some(sensors) = &entry.hit_filter {
        algorithm.core_mut().set_hit_filter(sensors.iter().copied());
    }

    if !algorithm.is_ready() {
        let missing: Vec<&str> = kind
            .required()
            .iter()
            .copied()
            .filter(|p| !entry.parameters.contains_key(*p))
            .collect();
        return Err(ConfigError::NotReady {
            algorithm: name,
            missing: missing.join(", "),
        });
    }
    Ok(algorithm)
}
