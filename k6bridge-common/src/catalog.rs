use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BridgeError, Result, Tags};

/// Which metric names and tag keys get special treatment in the run summary.
///
/// Kept as data so that tracking a new metric is a configuration change. Any field
/// omitted from a JSON catalog file falls back to the k6 built-in names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricCatalog {
    /// Values of this metric feed the response-time percentiles.
    pub response_time_metric: String,
    /// Values of this metric are summed into the error total.
    pub error_metric: String,
    /// Values of this metric are summed into the request total.
    pub request_metric: String,
    /// Tag keys naming the scenario, highest priority first.
    pub scenario_tags: Vec<String>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self {
            response_time_metric: "http_req_duration".to_string(),
            error_metric: "errors".to_string(),
            request_metric: "http_reqs".to_string(),
            scenario_tags: vec!["scenario_name".to_string(), "scenario".to_string()],
        }
    }
}

impl MetricCatalog {
    /// Load a catalog from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let catalog: MetricCatalog =
            serde_json::from_str(raw).map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;
        if catalog.scenario_tags.iter().any(|t| t.is_empty()) {
            return Err(BridgeError::InvalidConfig(
                "scenario_tags must not contain empty keys".to_string(),
            ));
        }
        Ok(catalog)
    }

    /// First configured scenario tag present on `tags`.
    pub fn scenario_of<'a>(&self, tags: &'a Tags) -> Option<&'a str> {
        self.scenario_tags
            .iter()
            .find_map(|key| tags.get(key))
            .map(String::as_str)
    }
}
