use std::fmt::Write;

use k6bridge_client::InfluxConfig;
use k6bridge_pipeline::{RunOutcome, Summary};

use crate::commands::CsvOutcome;

const LABEL_WIDTH: usize = 22;

/// Human-readable size with one decimal: `512.0 B`, `1.5 KB`, ... `2.0 TB`.
pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Percentage with two decimals, or `N/A` when undefined.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "N/A".to_string(),
    }
}

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let label = format!("{label}:");
    let _ = writeln!(out, "{label:<width$} {value}", width = LABEL_WIDTH);
}

pub fn format_analysis(summary: &Summary, file_size: Option<u64>) -> String {
    let mut out = String::new();
    out.push_str("File Analysis\n=============\n");
    line(&mut out, "File size", file_size.map_or_else(|| "Unknown".to_string(), format_file_size));
    line(&mut out, "Metrics found", summary.metric_counts.len());
    line(&mut out, "Total data points", summary.total_points);
    line(&mut out, "Scenarios", summary.scenarios.len());

    if let Some(rt) = &summary.response_times {
        out.push_str("\nResponse Time Analysis\n");
        line(&mut out, "Count", rt.count);
        line(&mut out, "Average", format!("{:.2} ms", rt.mean));
        line(&mut out, "Median", format!("{:.2} ms", rt.median));
        line(&mut out, "P95", format!("{:.2} ms", rt.p95));
        line(&mut out, "P99", format!("{:.2} ms", rt.p99));
    }

    out.push_str("\nRequest Analysis\n");
    line(&mut out, "Total requests", summary.request_total);
    line(&mut out, "Total errors", summary.error_total);
    line(&mut out, "Error rate", format_rate(summary.error_rate));

    if !summary.metric_counts.is_empty() {
        out.push_str("\nAvailable Metrics\n");
        for (metric, count) in &summary.metric_counts {
            let _ = writeln!(out, "  {metric}: {count} points");
        }
    }

    if !summary.scenarios.is_empty() {
        out.push_str("\nTest Scenarios\n");
        for scenario in &summary.scenarios {
            let _ = writeln!(out, "  {scenario}");
        }
    }

    out
}

pub fn format_import_summary(run: &RunOutcome) -> String {
    let mut out = String::new();
    out.push_str("Import Summary\n==============\n");
    line(&mut out, "Total data points", run.ingest.samples);
    line(&mut out, "Errors", run.error_count());
    let success = run
        .success_rate()
        .map_or_else(|| "N/A".to_string(), |r| format!("{r:.1}%"));
    line(&mut out, "Success rate", success);
    line(&mut out, "Undecodable points", run.ingest.decode_errors);

    if let Some(writer) = &run.writer {
        line(&mut out, "Points written", writer.points_written);
        line(
            &mut out,
            "Batches",
            format!("{} written, {} failed", writer.batches_written, writer.batches_failed),
        );
        if writer.points_dead_lettered > 0 {
            line(&mut out, "Dead-lettered points", writer.points_dead_lettered);
        }
    }

    out
}

pub fn format_import_next_steps(influx: &InfluxConfig) -> String {
    let mut out = String::new();
    out.push_str("Import completed. Data is now available in Grafana.\n");
    out.push_str("Next steps:\n");
    out.push_str("  1. Open Grafana\n");
    let _ = writeln!(out, "  2. Add InfluxDB data source: {}", influx.base_url);
    out.push_str("  3. Import your dashboard\n");
    let _ = writeln!(out, "  4. Select database: {}", influx.database);
    out
}

pub fn format_csv_result(outcome: &CsvOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Conversion completed: {} CSV file(s)", outcome.files.len());
    for file in &outcome.files {
        let _ = writeln!(out, "  {} ({} rows)", file.path.display(), file.rows);
    }
    if let Some(path) = &outcome.dashboard {
        let _ = writeln!(out, "Dashboard: {}", path.display());
    }
    line(&mut out, "Undecodable points", outcome.ingest.decode_errors);

    out.push_str("\nNext steps:\n");
    out.push_str("  1. Install the Grafana CSV plugin (marcusolsson-csv-datasource)\n");
    out.push_str("  2. Add a CSV data source for each file\n");
    if outcome.dashboard.is_some() {
        out.push_str("  3. Import the dashboard JSON\n");
    } else {
        out.push_str("  3. Create visualizations\n");
    }
    out
}
