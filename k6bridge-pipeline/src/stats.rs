use std::collections::{BTreeMap, BTreeSet};

use k6bridge_common::{MetricCatalog, Sample};

/// Running counters for the run summary.
///
/// Response times are kept in full and sorted once in [`StatsCollector::summarize`];
/// this is an offline pass over a finished test, so exact nearest-rank percentiles
/// are preferred over a streaming approximation.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    catalog: MetricCatalog,
    metric_counts: BTreeMap<String, u64>,
    response_times: Vec<f64>,
    error_total: f64,
    request_total: f64,
    scenarios: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimeSummary {
    pub count: usize,
    pub mean: f64,
    /// Upper-middle element for even counts; not interpolated.
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Points per metric, ordered by metric name.
    pub metric_counts: BTreeMap<String, u64>,
    pub total_points: u64,
    /// Distinct scenario names, sorted.
    pub scenarios: Vec<String>,
    /// `None` when no response-time samples were seen.
    pub response_times: Option<ResponseTimeSummary>,
    pub request_total: f64,
    pub error_total: f64,
    /// `error_total / request_total`; `None` when no requests were recorded.
    pub error_rate: Option<f64>,
}

impl StatsCollector {
    pub fn new(catalog: MetricCatalog) -> Self {
        Self {
            catalog,
            metric_counts: BTreeMap::new(),
            response_times: Vec::new(),
            error_total: 0.0,
            request_total: 0.0,
            scenarios: BTreeSet::new(),
        }
    }

    pub fn observe(&mut self, sample: &Sample) {
        *self.metric_counts.entry(sample.metric.clone()).or_insert(0) += 1;

        let metric = sample.metric.as_str();
        if metric == self.catalog.response_time_metric {
            self.response_times.push(sample.value);
        } else if metric == self.catalog.error_metric {
            self.error_total += sample.value;
        } else if metric == self.catalog.request_metric {
            self.request_total += sample.value;
        }

        if let Some(scenario) = self.catalog.scenario_of(&sample.tags) {
            if !self.scenarios.contains(scenario) {
                self.scenarios.insert(scenario.to_string());
            }
        }
    }

    pub fn summarize(&mut self) -> Summary {
        self.response_times.sort_by(f64::total_cmp);

        let response_times = summarize_sorted(&self.response_times);
        let error_rate = if self.request_total > 0.0 {
            Some(self.error_total / self.request_total)
        } else {
            None
        };

        Summary {
            metric_counts: self.metric_counts.clone(),
            total_points: self.metric_counts.values().sum(),
            scenarios: self.scenarios.iter().cloned().collect(),
            response_times,
            request_total: self.request_total,
            error_total: self.error_total,
            error_rate,
        }
    }
}

fn summarize_sorted(sorted: &[f64]) -> Option<ResponseTimeSummary> {
    let count = sorted.len();
    if count == 0 {
        return None;
    }
    let mean = sorted.iter().sum::<f64>() / count as f64;
    Some(ResponseTimeSummary {
        count,
        mean,
        median: percentile(sorted, 0.50)?,
        p95: percentile(sorted, 0.95)?,
        p99: percentile(sorted, 0.99)?,
    })
}

/// Nearest-rank percentile of an ascending slice: the element at `floor(p * n)`.
/// Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (p * sorted.len() as f64).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}
