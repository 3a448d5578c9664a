use std::io;
use std::path::Path;

use serde_json::{json, Value};

/// Metrics that get a panel, in display order. Exported metrics not listed here are ignored.
pub const DASHBOARD_METRICS: &[&str] = &[
    "http_req_duration",
    "http_reqs",
    "vus",
    "errors",
    "flow_completion",
    "step_response_time",
];

const PANEL_WIDTH: u64 = 12;
const PANEL_HEIGHT: u64 = 8;

/// Build a Grafana dashboard with one time-series panel per known exported metric,
/// laid out two per row. Each panel reads from a CSV datasource named `CSV - <metric>`.
pub fn build_dashboard(exported_metrics: &[String]) -> Value {
    let panels: Vec<Value> = DASHBOARD_METRICS
        .iter()
        .filter(|m| exported_metrics.iter().any(|e| e == *m))
        .enumerate()
        .map(|(i, metric)| panel(i as u64, metric))
        .collect();

    json!({
        "dashboard": {
            "id": null,
            "title": "K6 Load Test Results (CSV)",
            "tags": ["k6", "csv", "load-testing"],
            "timezone": "browser",
            "refresh": "5s",
            "time": { "from": "now-1h", "to": "now" },
            "panels": panels,
            "templating": { "list": [] },
            "annotations": { "list": [] },
            "schemaVersion": 30,
            "version": 1
        }
    })
}

fn panel(index: u64, metric: &str) -> Value {
    json!({
        "id": index + 1,
        "title": format!("📊 {}", title_case(metric)),
        "type": "timeseries",
        "gridPos": {
            "h": PANEL_HEIGHT,
            "w": PANEL_WIDTH,
            "x": (index % 2) * PANEL_WIDTH,
            "y": (index / 2) * PANEL_HEIGHT
        },
        "targets": [{ "datasource": format!("CSV - {metric}"), "refId": "A" }],
        "fieldConfig": {
            "defaults": {
                "custom": {
                    "drawStyle": "line",
                    "lineInterpolation": "linear",
                    "barAlignment": 0,
                    "lineWidth": 1,
                    "fillOpacity": 0,
                    "gradientMode": "none",
                    "spanNulls": false,
                    "insertNulls": false,
                    "showPoints": "auto",
                    "pointSize": 5
                }
            }
        }
    })
}

/// `http_req_duration` -> `Http Req Duration`
pub fn title_case(metric: &str) -> String {
    metric
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn write_dashboard(path: &Path, exported_metrics: &[String]) -> io::Result<()> {
    let dashboard = build_dashboard(exported_metrics);
    let body = serde_json::to_string_pretty(&dashboard).map_err(io::Error::other)?;
    std::fs::write(path, body)
}
