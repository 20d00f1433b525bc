//! Dashboard assembly: one parse per configured sensor, in config order.
//!
//! The assembled [`DashboardData`] is handed unmodified to either the HTML
//! renderer or the JSON serializer.

#![allow(missing_docs)]

pub mod render;

use serde::Serialize;
use serde::ser::SerializeMap;
use tracing::error;

use crate::core::config::{Config, SensorSource};
use crate::core::errors::Result;
use crate::parser::log_parser::{LogParser, SensorLogResult};

/// Parse outcome for one sensor as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPanel {
    #[serde(flatten)]
    pub result: SensorLogResult,
    /// Read fault on an opened source; the panel is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SensorPanel {
    pub fn name(&self) -> &str {
        &self.result.sensor
    }

    /// Whether there is nothing to chart.
    pub fn is_empty(&self) -> bool {
        self.result.records.is_empty()
    }
}

/// Sensor name to parse outcome, serialized as a JSON object in config order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardData {
    pub panels: Vec<SensorPanel>,
}

impl DashboardData {
    pub fn panel(&self, name: &str) -> Option<&SensorPanel> {
        self.panels.iter().find(|p| p.name() == name)
    }

    pub fn total_records(&self) -> usize {
        self.panels.iter().map(|p| p.result.records.len()).sum()
    }
}

impl Serialize for DashboardData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.panels.len()))?;
        for panel in &self.panels {
            map.serialize_entry(panel.name(), panel)?;
        }
        map.end()
    }
}

/// Parses every configured sensor log on demand. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct DashboardAssembler {
    parser: LogParser,
    sensors: Vec<SensorSource>,
}

impl DashboardAssembler {
    pub fn new(parser: LogParser, sensors: Vec<SensorSource>) -> Self {
        Self { parser, sensors }
    }

    /// Build from config: resolved sensor paths plus the configured merge policy.
    pub fn from_config(config: &Config) -> Result<Self> {
        let parser = LogParser::new(config.dashboard.timestamp_merge)?;
        Ok(Self::new(parser, config.resolved_sensors()))
    }

    pub fn sensors(&self) -> &[SensorSource] {
        &self.sensors
    }

    /// Parse every sensor. A failing sensor gets an empty panel carrying the
    /// error; the others are unaffected.
    pub fn assemble(&self) -> DashboardData {
        assemble(&self.parser, &self.sensors)
    }
}

/// Parse `sensors` in order with `parser`.
pub fn assemble(parser: &LogParser, sensors: &[SensorSource]) -> DashboardData {
    assemble_with(sensors, |sensor| parser.parse_file(&sensor.path, Some(&sensor.name)))
}

fn assemble_with<F>(sensors: &[SensorSource], mut parse: F) -> DashboardData
where
    F: FnMut(&SensorSource) -> Result<SensorLogResult>,
{
    let panels = sensors
        .iter()
        .map(|sensor| panel_for(sensor, parse(sensor)))
        .collect();
    DashboardData { panels }
}

fn panel_for(sensor: &SensorSource, outcome: Result<SensorLogResult>) -> SensorPanel {
    match outcome {
        Ok(result) => SensorPanel {
            result,
            error: None,
        },
        Err(err) => {
            error!(sensor = %sensor.name, path = %sensor.path.display(), "{err}");
            SensorPanel {
                result: SensorLogResult {
                    sensor: sensor.name.clone(),
                    source: sensor.path.clone(),
                    ..SensorLogResult::default()
                },
                error: Some(err.detail()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ThError;
    use crate::parser::log_parser::TimestampMerge;
    use serde_json::json;
    use std::fs;
    use std::io;

    fn parser() -> LogParser {
        LogParser::new(TimestampMerge::default()).unwrap()
    }

    #[test]
    fn missing_logs_yield_empty_panels() {
        let dir = tempfile::tempdir().unwrap();
        let sensors = vec![
            SensorSource::new("BH1750", dir.path().join("bh1750.log")),
            SensorSource::new("DHT22", dir.path().join("dht22.log")),
        ];
        let data = assemble(&parser(), &sensors);
        assert_eq!(data.panels.len(), 2);
        assert!(data.panels.iter().all(SensorPanel::is_empty));
        assert!(data.panels.iter().all(|p| p.result.source_unavailable.is_some()));
        assert!(data.panels.iter().all(|p| p.error.is_none()));
    }

    #[test]
    fn panels_follow_config_order_and_parse_independently() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("mq135.log"),
            "10:00 {\"ppm\": 400}\nnoise\n10:01 {\"ppm\": 410}\n",
        )
        .unwrap();
        let sensors = vec![
            SensorSource::new("QMC5883L", dir.path().join("absent.log")),
            SensorSource::new("MQ135", dir.path().join("mq135.log")),
        ];
        let data = assemble(&parser(), &sensors);

        let names: Vec<&str> = data.panels.iter().map(SensorPanel::name).collect();
        assert_eq!(names, ["QMC5883L", "MQ135"]);
        let mq = data.panel("MQ135").unwrap();
        assert_eq!(mq.result.records.len(), 2);
        assert_eq!(mq.result.skipped_lines(), 1);
        assert_eq!(data.total_records(), 2);
    }

    #[test]
    fn directory_as_source_is_unavailable_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sensors = vec![SensorSource::new("MPU6050", dir.path())];
        let data = assemble(&parser(), &sensors);
        assert!(data.panels[0].is_empty());
        assert!(data.panels[0].result.source_unavailable.is_some());
    }

    #[test]
    fn serializes_as_ordered_object() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.log"), "t1 {\"lux\": 1.5}\n").unwrap();
        let sensors = vec![
            SensorSource::new("ZED", dir.path().join("z.log")),
            SensorSource::new("ALPHA", dir.path().join("b.log")),
        ];
        let text = serde_json::to_string(&assemble(&parser(), &sensors)).unwrap();
        assert!(text.find("\"ZED\"").unwrap() < text.find("\"ALPHA\"").unwrap());

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["ALPHA"]["records"],
            json!([{"timestamp": "t1", "lux": 1.5}])
        );
        assert_eq!(value["ZED"]["records"], json!([]));
    }

    #[test]
    fn assembling_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("d.log"), "a {\"t\": 1}\nb {bad}\n").unwrap();
        let assembler = DashboardAssembler::new(
            parser(),
            vec![SensorSource::new("DHT22", dir.path().join("d.log"))],
        );
        assert_eq!(assembler.assemble(), assembler.assemble());
    }

    #[test]
    fn from_config_resolves_against_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bh1750.log"), "x {\"lux\": 2}\n").unwrap();
        let mut config = Config::default();
        config.dashboard.log_dir = dir.path().to_path_buf();
        let assembler = DashboardAssembler::from_config(&config).unwrap();
        assert_eq!(assembler.sensors().len(), 5);
        let data = assembler.assemble();
        assert_eq!(data.panel("BH1750").unwrap().result.records.len(), 1);
    }

    #[test]
    fn read_fault_empties_only_that_panel() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dht22.log"), "t1 {\"temp\": 21.5}\n").unwrap();
        let sensors = vec![
            SensorSource::new("BH1750", dir.path().join("bh1750.log")),
            SensorSource::new("DHT22", dir.path().join("dht22.log")),
        ];
        let real = parser();
        let data = assemble_with(&sensors, |sensor| {
            if sensor.name == "BH1750" {
                Err(ThError::SourceRead {
                    path: sensor.path.clone(),
                    source: io::Error::other("device went away"),
                })
            } else {
                real.parse_file(&sensor.path, Some(&sensor.name))
            }
        });

        let names: Vec<&str> = data.panels.iter().map(SensorPanel::name).collect();
        assert_eq!(names, ["BH1750", "DHT22"]);

        let faulted = data.panel("BH1750").unwrap();
        assert!(faulted.is_empty());
        assert_eq!(faulted.result.source, dir.path().join("bh1750.log"));
        let message = faulted.error.as_deref().unwrap();
        assert!(message.contains("device went away"), "{message}");
        assert!(!message.starts_with("[TH-"), "{message}");

        let healthy = data.panel("DHT22").unwrap();
        assert_eq!(healthy.error, None);
        assert_eq!(healthy.result.records.len(), 1);

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["BH1750"]["records"], json!([]));
        assert!(value["BH1750"]["error"].is_string());
        assert!(value["DHT22"].get("error").is_none());
    }
}
