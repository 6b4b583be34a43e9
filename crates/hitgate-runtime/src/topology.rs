//! Detector topology lookup used by the volume trigger.
//!
//! The production geometry lives in an external registry; [`StaticTopology`]
//! is an in-memory table built in code or from the `[topology]` section of
//! the configuration file.

use hitgate_core::SensorId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Lowest module position on a string.
pub const MIN_POSITION: i32 = 1;
/// Highest in-ice module position on a string.
pub const MAX_POSITION: i32 = 60;

/// Where a sensor sits: string number and position along the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorLocation {
    pub string: u32,
    pub position: i32,
}

/// Read-only geometry service.
pub trait Topology: Send + Sync {
    fn location(&self, sensor: SensorId) -> Option<SensorLocation>;

    /// Strings adjacent to `string`, not including `string` itself.
    fn neighbors(&self, string: u32) -> Vec<u32>;

    /// Vertical offset of `string`, in module positions.
    fn vertical_offset(&self, string: u32) -> i32;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    sensors: FxHashMap<SensorId, SensorLocation>,
    neighbors: FxHashMap<u32, Vec<u32>>,
    offsets: FxHashMap<u32, i32>,
}

impl StaticTopology {
    pub fn builder() -> StaticTopologyBuilder {
        StaticTopologyBuilder::default()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

impl Topology for StaticTopology {
    fn location(&self, sensor: SensorId) -> Option<SensorLocation> {
        self.sensors.get(&sensor).copied()
    }

    fn neighbors(&self, string: u32) -> Vec<u32> {
        self.neighbors.get(&string).cloned().unwrap_or_default()
    }

    fn vertical_offset(&self, string: u32) -> i32 {
        self.offsets.get(&string).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct StaticTopologyBuilder {
    inner: StaticTopology,
}

impl StaticTopologyBuilder {
    pub fn sensor(mut self, sensor: SensorId, string: u32, position: i32) -> Self {
        self.inner
            .sensors
            .insert(sensor, SensorLocation { string, position });
        self
    }

    /// Declare `a` and `b` as neighbours of each other.
    pub fn adjacent(mut self, a: u32, b: u32) -> Self {
        for (from, to) in [(a, b), (b, a)] {
            let list = self.inner.neighbors.entry(from).or_default();
            if !list.contains(&to) {
                list.push(to);
            }
        }
        self
    }

    pub fn vertical_offset(mut self, string: u32, offset: i32) -> Self {
        self.inner.offsets.insert(string, offset);
        self
    }

    pub fn build(self) -> StaticTopology {
        self.inner
    }
}
