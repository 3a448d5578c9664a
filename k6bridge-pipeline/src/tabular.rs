use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, TimeZone, Utc};
use indexmap::{IndexMap, IndexSet};
use k6bridge_common::Sample;

/// Prefix applied to tag columns in combined mode so they cannot shadow fixed columns.
pub const COMBINED_TAG_PREFIX: &str = "tag_";

const PER_METRIC_COLUMNS: [&str; 2] = ["timestamp", "value"];
const COMBINED_COLUMNS: [&str; 3] = ["timestamp", "metric", "value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularMode {
    /// One table per metric name.
    PerMetric,
    /// A single table holding every metric.
    Combined,
}

/// Samples grouped by metric name; metrics keep first-seen order, samples keep input order.
pub type MetricGroups = IndexMap<String, Vec<Sample>>;

/// Accumulates samples and materializes them as time-sorted tables.
#[derive(Debug)]
pub struct TabularAggregator {
    store: Store,
}

#[derive(Debug)]
enum Store {
    PerMetric(MetricGroups),
    Combined(Vec<Sample>),
}

/// An in-memory table ready to be written as CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A CSV file written by [`TabularAggregator::write_files`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    /// `None` for the combined file.
    pub metric: Option<String>,
    pub path: PathBuf,
    pub rows: usize,
}

impl TabularAggregator {
    pub fn new(mode: TabularMode) -> Self {
        let store = match mode {
            TabularMode::PerMetric => Store::PerMetric(MetricGroups::new()),
            TabularMode::Combined => Store::Combined(Vec::new()),
        };
        Self { store }
    }

    pub fn mode(&self) -> TabularMode {
        match self.store {
            Store::PerMetric(_) => TabularMode::PerMetric,
            Store::Combined(_) => TabularMode::Combined,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        match &mut self.store {
            Store::PerMetric(groups) => {
                groups.entry(sample.metric.clone()).or_default().push(sample);
            }
            Store::Combined(all) => all.push(sample),
        }
    }

    /// Total samples held.
    pub fn len(&self) -> usize {
        match &self.store {
            Store::PerMetric(groups) => groups.values().map(Vec::len).sum(),
            Store::Combined(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort and flatten into tables keyed by metric name.
    ///
    /// Per-metric mode skips groups with no samples. Combined mode always yields exactly
    /// one table named `combined`, header-only when nothing was collected.
    pub fn into_tables(self) -> Vec<(String, Table)> {
        match self.store {
            Store::PerMetric(groups) => groups
                .into_iter()
                .filter(|(_, samples)| !samples.is_empty())
                .map(|(metric, samples)| {
                    let table = per_metric_table(samples);
                    (metric, table)
                })
                .collect(),
            Store::Combined(all) => vec![("combined".to_string(), combined_table(all))],
        }
    }

    /// Write `<prefix>_<metric>.csv` per metric, or `<prefix>-combined.csv` in combined mode.
    ///
    /// The metric part of a file name goes through [`file_name_component`], so a metric
    /// name can never point outside the prefix's directory. Errors name the failing path.
    pub fn write_files(self, prefix: &str) -> io::Result<Vec<ExportedFile>> {
        let mode = self.mode();
        let mut exported = Vec::new();

        for (name, table) in self.into_tables() {
            let (metric, path) = match mode {
                TabularMode::PerMetric => {
                    let file_name = file_name_component(&name);
                    let path = PathBuf::from(format!("{prefix}_{file_name}.csv"));
                    (Some(name), path)
                }
                TabularMode::Combined => (None, PathBuf::from(format!("{prefix}-combined.csv"))),
            };

            write_table(&path, &table)
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;

            exported.push(ExportedFile { metric, path, rows: table.rows.len() });
        }

        Ok(exported)
    }
}

fn write_table(path: &Path, table: &Table) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    table.write_csv(&mut writer)?;
    writer.flush()
}

/// Replace path separators, `:` and control characters in `name` with `_`.
///
/// `group/login` becomes `group_login`; `../x` becomes `.._x`, which stays a plain file name.
pub fn file_name_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

impl Table {
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_record(writer, &self.columns)?;
        for row in &self.rows {
            write_record(writer, row)?;
        }
        Ok(())
    }
}

fn per_metric_table(mut samples: Vec<Sample>) -> Table {
    let tag_keys: IndexSet<String> = samples
        .iter()
        .flat_map(|s| s.tags.keys())
        .filter(|k| !PER_METRIC_COLUMNS.contains(&k.as_str()))
        .cloned()
        .collect();

    // Stable: equal timestamps keep input order.
    samples.sort_by_key(|s| s.timestamp_nanos);

    let rows = samples
        .iter()
        .map(|s| {
            let mut row = vec![format_timestamp(s.timestamp_nanos), s.value.to_string()];
            row.extend(tag_keys.iter().map(|k| s.tags.get(k).cloned().unwrap_or_default()));
            row
        })
        .collect();

    let columns = PER_METRIC_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(tag_keys)
        .collect();

    Table { columns, rows }
}

fn combined_table(mut samples: Vec<Sample>) -> Table {
    let tag_keys: IndexSet<String> = samples
        .iter()
        .flat_map(|s| s.tags.keys())
        .cloned()
        .collect();

    samples.sort_by_key(|s| s.timestamp_nanos);

    let rows = samples
        .iter()
        .map(|s| {
            let mut row = vec![
                format_timestamp(s.timestamp_nanos),
                s.metric.clone(),
                s.value.to_string(),
            ];
            row.extend(tag_keys.iter().map(|k| s.tags.get(k).cloned().unwrap_or_default()));
            row
        })
        .collect();

    let columns = COMBINED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(tag_keys.iter().map(|k| format!("{COMBINED_TAG_PREFIX}{k}")))
        .collect();

    Table { columns, rows }
}

/// RFC 3339 in UTC with only as many fractional digits as needed.
pub fn format_timestamp(nanos: i64) -> String {
    Utc.timestamp_nanos(nanos)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn write_record<W: Write>(writer: &mut W, fields: &[String]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| escape_csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{line}")
}

/// Quote a CSV field if it contains a separator, quote or line break.
pub fn escape_csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
