//! Configuration file through handler and collector to the sink.

use anyhow::Result;
use hitgate_runtime::{
    Collector, Hit, Interval, MemorySink, Payload, ReadoutScope, SensorId, SourceId,
    TriggerConfig, TriggerHandler, TriggerKind, UtcTime,
};
use std::sync::Arc;

const CONFIG: &str = r#"
logging:
  level: debug
collector:
  source: 4000
  merge_gap: 0
algorithms:
  - kind: simple_majority
    name: InIceSMT2
    config_id: 2
    parameters:
      threshold: 2
      timeWindow: 100
    readouts:
      - scope: in_ice_global
        minus: 5
        plus: 5
"#;

fn hit(sensor: u64, t: i64) -> Payload {
    Payload::Hit(Hit::new(
        SensorId(sensor),
        SourceId::string_hub(1),
        UtcTime::new(t),
        2,
    ))
}

#[test]
fn test_config_file_drives_pipeline() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("trigger.yaml");
    std::fs::write(&path, CONFIG)?;

    let config = TriggerConfig::load(&path)?;
    let sink = MemorySink::new("pipeline");
    let mut collector = Collector::new(
        config.collector.source,
        config.collector.merge_policy(),
        Arc::new(sink.clone()),
    );
    let mut handler = TriggerHandler::new(config.collector.source);
    for algorithm in config.build_algorithms(None)? {
        handler.add_algorithm(algorithm)?;
    }

    for (sensor, t) in [(1, 10), (2, 20), (3, 150), (4, 300)] {
        handler.add_payload(hit(sensor, t));
    }
    assert_eq!(handler.process_queue(), 4);

    let algorithms = handler.algorithms();
    {
        let mut guard = algorithms.lock().unwrap();
        assert_eq!(collector.run_cycle(guard.as_mut_slice())?, 1);
    }

    handler.flush();
    {
        let mut guard = algorithms.lock().unwrap();
        assert_eq!(collector.flush(guard.as_mut_slice()), 0);
    }

    let out = sink.requests()?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, TriggerKind::SimpleMajority);
    assert_eq!(out[0].config_id, 2);
    assert_eq!(out[0].interval, Interval::ticks(10, 20));
    assert_eq!(out[0].elements.len(), 1);
    assert_eq!(out[0].elements[0].scope, ReadoutScope::InIceGlobal);
    assert_eq!(out[0].elements[0].interval, Interval::ticks(5, 25));
    Ok(())
}

#[test]
fn test_toml_and_yaml_agree() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let toml_path = dir.path().join("trigger.toml");
    std::fs::write(
        &toml_path,
        r#"
[collector]
source = 4000

[[algorithm]]
kind = "simple_majority"
name = "InIceSMT2"
config_id = 2
parameters = { threshold = 2, timeWindow = 100 }
readouts = [{ scope = "in_ice_global", minus = 5, plus = 5 }]
"#,
    )?;

    let from_toml = TriggerConfig::load(&toml_path)?;
    let from_yaml = TriggerConfig::from_yaml(CONFIG)?;
    assert_eq!(from_toml.algorithm.len(), from_yaml.algorithm.len());
    assert_eq!(from_toml.algorithm[0].parameters, from_yaml.algorithm[0].parameters);
    assert_eq!(from_toml.algorithm[0].readouts, from_yaml.algorithm[0].readouts);
    Ok(())
}
