//! HTML rendering of [`DashboardData`] through a Tera template.

#![allow(missing_docs)]

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use crate::core::errors::Result;
use crate::dashboard::{DashboardData, SensorPanel};
use crate::parser::log_parser::TIMESTAMP_KEY;

const TEMPLATE_NAME: &str = "dashboard.html";
const TEMPLATE_SOURCE: &str = include_str!("../../templates/dashboard.html");

/// Page served at `GET /dashboard` when no static page is configured.
pub const BUILTIN_STATIC_PAGE: &str = include_str!("../../static/dashboard.html");

/// Table view of one sensor panel.
#[derive(Debug, Serialize)]
struct PanelView<'a> {
    index: usize,
    name: &'a str,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    skipped: usize,
    unavailable: Option<&'a str>,
    error: Option<&'a str>,
}

impl<'a> PanelView<'a> {
    fn new(index: usize, panel: &'a SensorPanel) -> Self {
        let merged: Vec<_> = panel.result.records.iter().map(|r| r.merged()).collect();

        let mut columns = vec![TIMESTAMP_KEY.to_string()];
        for record in &merged {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = merged
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            index,
            name: panel.name(),
            columns,
            rows,
            skipped: panel.result.skipped_lines(),
            unavailable: panel.result.source_unavailable.as_deref(),
            error: panel.error.as_deref(),
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// JSON safe to place inside a `<script>` element.
pub fn script_safe_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// Compiled dashboard template. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct DashboardRenderer {
    tera: Tera,
}

impl DashboardRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE_SOURCE)?;
        Ok(Self { tera })
    }

    pub fn render(&self, data: &DashboardData) -> Result<String> {
        let panels: Vec<PanelView<'_>> = data
            .panels
            .iter()
            .enumerate()
            .map(|(index, panel)| PanelView::new(index, panel))
            .collect();

        let mut ctx = Context::new();
        ctx.insert("sensors", &panels);
        ctx.insert("total_records", &data.total_records());
        ctx.insert("dashboard_json", &script_safe_json(data)?);
        Ok(self.tera.render(TEMPLATE_NAME, &ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SensorSource;
    use crate::dashboard::assemble;
    use crate::parser::log_parser::{LogParser, TimestampMerge};
    use std::fs;

    fn data_from(lines: &str) -> (tempfile::TempDir, DashboardData) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dht22.log"), lines).unwrap();
        let sensors = vec![
            SensorSource::new("DHT22", dir.path().join("dht22.log")),
            SensorSource::new("BH1750", dir.path().join("missing.log")),
        ];
        let parser = LogParser::new(TimestampMerge::default()).unwrap();
        let data = assemble(&parser, &sensors);
        (dir, data)
    }

    #[test]
    fn renders_every_sensor_including_empty_ones() {
        let (_dir, data) = data_from("12:00 {\"temp\": 21.5, \"hum\": 40}\n");
        let html = DashboardRenderer::new().unwrap().render(&data).unwrap();
        assert!(html.contains("DHT22"));
        assert!(html.contains("BH1750"));
        assert!(html.contains("21.5"));
        assert!(html.contains("No data available"));
    }

    #[test]
    fn table_cells_are_html_escaped() {
        let (_dir, data) = data_from("<b>t</b> {\"note\": \"<script>x</script>\"}\n");
        let html = DashboardRenderer::new().unwrap().render(&data).unwrap();
        assert!(html.contains("&lt;b&gt;t&lt;&#x2F;b&gt;"));
        assert!(!html.contains("<script>x</script>"));
    }

    #[test]
    fn embedded_json_cannot_close_the_script_element() {
        let (_dir, data) = data_from("t {\"note\": \"</script><p>\"}\n");
        let embedded = script_safe_json(&data).unwrap();
        assert!(!embedded.contains("</"));
        let decoded: Value = serde_json::from_str(&embedded).unwrap();
        assert_eq!(decoded["DHT22"]["records"][0]["note"], "</script><p>");
    }

    #[test]
    fn columns_start_with_timestamp_and_fill_gaps() {
        let (_dir, data) = data_from("a {\"x\": 1}\nb {\"y\": \"two\"}\n");
        let view = PanelView::new(0, &data.panels[0]);
        assert_eq!(view.columns, ["timestamp", "x", "y"]);
        assert_eq!(view.rows[0], ["a", "1", ""]);
        assert_eq!(view.rows[1], ["b", "", "two"]);
    }

    #[test]
    fn builtin_static_page_is_html() {
        assert!(BUILTIN_STATIC_PAGE.contains("<html"));
    }
}
