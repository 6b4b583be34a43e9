//! In-ice volume trigger.
//!
//! Collects hits with the same sliding-window mechanics as the majority
//! trigger, then keeps the collected set only if some hit has at least
//! `threshold - 1` other hits inside its local volume: modules within
//! `volumeHeight` positions on the same string, or on a neighbouring string
//! once that string's vertical offset is taken into account.

use super::core::AlgorithmCore;
use super::window::{HitCollection, SlidingTimeWindow};
use super::{expect_hit, TriggerAlgorithm};
use crate::error::{ConfigError, TriggerError};
use crate::topology::{SensorLocation, Topology, MAX_POSITION, MIN_POSITION};
use hitgate_core::{Hit, Payload, SourceId, TriggerKind, UtcTime};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub struct VolumeTrigger {
    core: AlgorithmCore,
    topology: Arc<dyn Topology>,
    threshold: Option<usize>,
    time_window: Option<i64>,
    volume_height: Option<i32>,
    center_shift: Option<i32>,
    window: SlidingTimeWindow,
    accumulated: HitCollection,
    on_trigger: bool,
    started: bool,
}

impl fmt::Debug for VolumeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeTrigger")
            .field("core", &self.core)
            .field("threshold", &self.threshold)
            .field("time_window", &self.time_window)
            .field("volume_height", &self.volume_height)
            .field("center_shift", &self.center_shift)
            .field("window", &self.window.len())
            .field("accumulated", &self.accumulated.len())
            .field("on_trigger", &self.on_trigger)
            .finish()
    }
}

/// Position band `[lo, hi]` of one string inside a volume element.
#[derive(Debug, Clone, Copy)]
struct Band {
    string: u32,
    lo: i32,
    hi: i32,
}

impl Band {
    fn new(string: u32, center: i32, height: i32, shift: i32) -> Self {
        Self {
            string,
            lo: (center - height + shift).max(MIN_POSITION),
            hi: (center + height + shift).min(MAX_POSITION),
        }
    }

    fn contains(&self, loc: &SensorLocation) -> bool {
        loc.string == self.string && self.lo <= loc.position && loc.position <= self.hi
    }
}

impl VolumeTrigger {
    pub fn new(
        name: impl Into<String>,
        config_id: i32,
        source: SourceId,
        topology: Arc<dyn Topology>,
    ) -> Self {
        Self {
            core: AlgorithmCore::new(name, TriggerKind::Volume, config_id, source),
            topology,
            threshold: None,
            time_window: None,
            volume_height: None,
            center_shift: None,
            window: SlidingTimeWindow::new(0),
            accumulated: HitCollection::new(),
            on_trigger: false,
            started: false,
        }
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    pub fn volume_height(&self) -> Option<i32> {
        self.volume_height
    }

    pub fn center_shift(&self) -> Option<i32> {
        self.center_shift
    }

    pub fn is_on_trigger(&self) -> bool {
        self.on_trigger
    }

    pub fn window(&self) -> &SlidingTimeWindow {
        &self.window
    }

    pub fn window_start(&self) -> Option<UtcTime> {
        self.window.start_time()
    }

    fn threshold_value(&self) -> usize {
        self.threshold.unwrap_or(usize::MAX)
    }

    fn above_threshold(&self) -> bool {
        self.window.len() >= self.threshold_value()
    }

    /// Evict the front hit; hits that are not part of the open trigger no
    /// longer need to be revisited.
    fn slide(&mut self) {
        if let Some(old) = self.window.slide() {
            if !self.accumulated.contains(&old) {
                if let Some(t) = old.time {
                    self.core.advance_earliest(t.just_after());
                }
            }
        }
    }

    /// Bands making up the volume element centred on `center`.
    fn volume(&self, center: SensorLocation) -> SmallVec<[Band; 8]> {
        let height = self.volume_height.unwrap_or(0);
        let center_offset = self.topology.vertical_offset(center.string);

        let mut bands = SmallVec::new();
        bands.push(Band::new(center.string, center.position, height, 0));
        for string in self.topology.neighbors(center.string) {
            let shift = self.topology.vertical_offset(string) - center_offset;
            bands.push(Band::new(string, center.position, height, shift));
        }
        bands
    }

    /// Number of hits in the volume centred on `hits[index]`, the centre included.
    fn volume_count(&self, hits: &[(Hit, Option<SensorLocation>)], index: usize) -> usize {
        let Some(center) = hits[index].1 else {
            return 0;
        };
        let bands = self.volume(center);
        let mut count = 1;
        for (j, (_, loc)) in hits.iter().enumerate() {
            if j == index {
                continue;
            }
            let Some(loc) = loc else { continue };
            if loc.string == center.string && loc.position == center.position {
                continue;
            }
            if bands.iter().any(|b| b.contains(loc)) {
                count += 1;
            }
        }
        count
    }

    /// Form a trigger from `hits` if any of them is the centre of a dense
    /// enough volume.
    fn analyze(&mut self, hits: Vec<Hit>) {
        if hits.is_empty() {
            return;
        }
        let located: Vec<(Hit, Option<SensorLocation>)> = hits
            .iter()
            .map(|h| (*h, self.topology.location(h.sensor)))
            .collect();
        let threshold = self.threshold_value();

        let dense = (0..located.len()).find(|&i| self.volume_count(&located, i) >= threshold);
        match dense {
            Some(center) => {
                debug!(
                    algorithm = %self.core.name(),
                    center = %located[center].0.sensor,
                    hits = hits.len(),
                    "volume criterion met"
                );
                self.core.form_trigger(hits);
            }
            None => {
                debug!(algorithm = %self.core.name(), hits = hits.len(), "no dense volume");
            }
        }
    }

    fn process_hit(&mut self, hit: &Hit) -> Result<(), TriggerError> {
        if !self.is_ready() {
            return Err(TriggerError::NotConfigured {
                algorithm: self.core.name().to_string(),
            });
        }
        let time = self.core.accept_time(hit.time)?;

        if !hit.is_spe() || !self.core.uses_sensor(hit.sensor) {
            return Ok(());
        }

        if !self.started {
            self.started = true;
            self.window.push(*hit);
            self.core.advance_earliest(time);
            return Ok(());
        }

        if self.window.in_window(time) {
            self.window.push(*hit);
            if self.on_trigger {
                self.accumulated.push(*hit);
            }
            return Ok(());
        }

        if self.above_threshold() {
            if !self.on_trigger {
                self.accumulated.extend_from(self.window.hits());
                debug!(
                    algorithm = %self.core.name(),
                    hits = self.accumulated.len(),
                    "trigger on"
                );
            }
            self.on_trigger = true;
        }

        while !self.window.in_window(time) && self.window.len() > 1 {
            self.slide();
        }
        if !self.window.in_window(time) {
            self.slide();
        }
        self.window.push(*hit);

        if self.on_trigger {
            let threshold = self.threshold_value();
            let finished = (!self.above_threshold() && !self.window.overlaps(&self.accumulated))
                || (self.window.len() == 1 && threshold == 1);
            if finished {
                let hits = self.accumulated.take();
                self.on_trigger = false;
                self.analyze(hits);
            } else {
                self.accumulated.push(*hit);
            }
        }
        Ok(())
    }

    fn clear_state(&mut self) {
        self.window.clear();
        self.accumulated.clear();
        self.on_trigger = false;
        self.started = false;
    }

    #[cfg(test)]
    fn count_for(&self, hits: &[Hit], index: usize) -> usize {
        let located: Vec<_> = hits
            .iter()
            .map(|h| (*h, self.topology.location(h.sensor)))
            .collect();
        self.volume_count(&located, index)
    }
}

impl TriggerAlgorithm for VolumeTrigger {
    fn core(&self) -> &AlgorithmCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgorithmCore {
        &mut self.core
    }

    fn add_parameter(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "threshold" => {
                self.threshold = Some(self.core.parse_u32(name, value)? as usize);
            }
            "timeWindow" => {
                let length = self.core.parse_i64(name, value)?;
                self.time_window = Some(length);
                self.window.set_length(length);
            }
            "volumeHeight" => {
                let height = self.core.parse_u32(name, value)?;
                let height = i32::try_from(height)
                    .map_err(|e| self.core.invalid(name, value, e.to_string()))?;
                self.volume_height = Some(height);
            }
            "centerShift" => {
                let shift = value
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| self.core.invalid(name, value, e.to_string()))?;
                self.center_shift = Some(shift);
            }
            _ => {
                if !self.core.add_common_parameter(name, value)? {
                    return Err(self.core.unknown(name));
                }
            }
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.threshold.is_some()
            && self.time_window.is_some()
            && self.volume_height.is_some()
            && self.center_shift.is_some()
    }

    fn process(&mut self, payload: &Payload) -> Result<(), TriggerError> {
        let hit = expect_hit(&self.core, payload)?;
        self.process_hit(hit)
    }

    fn flush(&mut self) {
        if self.on_trigger {
            let hits = self.accumulated.take();
            self.analyze(hits);
        } else if self.above_threshold() {
            let hits = self.window.hits().to_vec();
            self.analyze(hits);
        }
        self.clear_state();
        self.core.flush_reset();
    }

    fn reset(&mut self) {
        self.clear_state();
        self.core.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::StaticTopology;
    use hitgate_core::{Interval, SensorId};

    fn topology() -> Arc<dyn Topology> {
        let mut builder = StaticTopology::builder()
            .adjacent(1, 2)
            .vertical_offset(1, 0)
            .vertical_offset(2, 3);
        for pos in 1..=60 {
            builder = builder
                .sensor(SensorId(100 + pos as u64), 1, pos)
                .sensor(SensorId(200 + pos as u64), 2, pos)
                .sensor(SensorId(300 + pos as u64), 3, pos);
        }
        Arc::new(builder.build())
    }

    fn volume(threshold: u32, window: i64, height: u32) -> VolumeTrigger {
        let mut v = VolumeTrigger::new("vol", 3, SourceId::INICE_TRIGGER, topology());
        v.configure([
            ("threshold", threshold.to_string().as_str()),
            ("timeWindow", window.to_string().as_str()),
            ("volumeHeight", height.to_string().as_str()),
            ("centerShift", "0"),
        ])
        .unwrap();
        v
    }

    fn hit(sensor: u64, t: i64) -> Hit {
        let string = (sensor / 100) as u32;
        Hit::new(SensorId(sensor), SourceId::string_hub(string), UtcTime::new(t), 2)
    }

    #[test]
    fn test_requires_all_parameters() {
        let mut v = VolumeTrigger::new("vol", 3, SourceId::INICE_TRIGGER, topology());
        v.configure([("threshold", "3"), ("timeWindow", "10"), ("volumeHeight", "2")])
            .unwrap();
        assert!(!v.is_ready());
        v.add_parameter("centerShift", "-4").unwrap();
        assert!(v.is_ready());
        assert_eq!(v.center_shift(), Some(-4));
        assert!(matches!(
            v.add_parameter("volumeHeight", "-1"),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_same_string_neighbourhood() {
        let v = volume(3, 100, 2);
        let hits = [hit(130, 0), hit(131, 1), hit(132, 2), hit(133, 3)];
        // 130 sees 131 and 132; 133 is three positions away.
        assert_eq!(v.count_for(&hits, 0), 3);
        assert_eq!(v.count_for(&hits, 3), 3);
    }

    #[test]
    fn test_neighbour_string_uses_relative_offset() {
        let v = volume(2, 100, 1);
        // String 2 sits three positions lower relative to string 1.
        let centre = hit(130, 0);
        assert_eq!(v.count_for(&[centre, hit(233, 1)], 0), 2);
        assert_eq!(v.count_for(&[centre, hit(230, 1)], 0), 1);
        // String 3 is not adjacent to string 1.
        assert_eq!(v.count_for(&[centre, hit(330, 1)], 0), 1);
    }

    #[test]
    fn test_count_is_order_independent() {
        let v = volume(2, 100, 1);
        let a = [hit(130, 0), hit(233, 1), hit(131, 2)];
        let b = [hit(233, 1), hit(131, 2), hit(130, 0)];
        assert_eq!(v.count_for(&a, 0), v.count_for(&b, 2));
    }

    #[test]
    fn test_same_module_twice_is_not_a_neighbour() {
        let v = volume(2, 100, 3);
        assert_eq!(v.count_for(&[hit(130, 0), hit(130, 5)], 0), 1);
    }

    #[test]
    fn test_dense_cluster_forms_trigger() {
        let mut v = volume(3, 100, 2);
        for (s, t) in [(130, 10), (131, 20), (132, 30)] {
            v.process(&Payload::Hit(hit(s, t))).unwrap();
        }
        assert!(!v.is_on_trigger());
        v.process(&Payload::Hit(hit(150, 200))).unwrap();
        // The trigger turned on and closed on the same out-of-window hit.
        assert!(!v.is_on_trigger());
        let ready = v.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].interval, Interval::ticks(10, 30));
        assert_eq!(ready[0].kind, TriggerKind::Volume);
    }

    #[test]
    fn test_sparse_cluster_is_discarded() {
        let mut v = volume(3, 100, 1);
        for (s, t) in [(110, 10), (130, 20), (150, 30)] {
            v.process(&Payload::Hit(hit(s, t))).unwrap();
        }
        v.process(&Payload::Hit(hit(120, 500))).unwrap();
        assert!(v.take_ready().is_empty());
        assert_eq!(v.trigger_count(), 0);
    }

    #[test]
    fn test_flush_analyzes_full_window() {
        let mut v = volume(2, 100, 1);
        v.process(&Payload::Hit(hit(130, 10))).unwrap();
        v.process(&Payload::Hit(hit(131, 15))).unwrap();
        v.flush();
        let ready = v.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].interval, Interval::ticks(10, 15));
        assert!(v.window().is_empty());
        assert!(v.is_ready());
        assert_eq!(v.earliest_time_of_interest(), None);
        assert_eq!(v.window_start(), None);
    }
}
