use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use k6bridge_cli::commands::{run_csv, run_import, CsvOptions, ImportOptions};
use k6bridge_client::{InfluxClient, InfluxConfig};
use k6bridge_common::MetricCatalog;
use k6bridge_pipeline::lineproto;
use k6bridge_pipeline::{
    BatchWriter, FailurePolicy, FlushOutcome, NoProgress, Pipeline, ProgressEvent, TabularMode,
};

const POINTS: usize = 2500;

// k6 output for a short run: metric declarations, progress noise and POINTS points
// spread over two scenarios.
fn k6_output() -> String {
    let mut out = String::new();
    out.push_str("{\"type\":\"Metric\",\"metric\":\"http_req_duration\",\"data\":{\"type\":\"trend\"}}\n");
    out.push_str("running (0m01.0s), 10/10 VUs, 12 complete and 0 interrupted iterations\n");
    for i in 0..POINTS {
        let scenario = if i % 2 == 0 { "browse" } else { "checkout" };
        let (metric, value) = match i % 5 {
            0 => ("http_reqs", 1.0),
            1 => ("errors", if i % 25 == 1 { 1.0 } else { 0.0 }),
            _ => ("http_req_duration", (i % 100) as f64 + 0.5),
        };
        let seconds = i % 60;
        let millis = i % 1000;
        out.push_str(&format!(
            "{{\"type\":\"Point\",\"metric\":\"{metric}\",\"data\":{{\"time\":\"2024-03-01T10:00:{seconds:02}.{millis:03}+00:00\",\"value\":{value},\"tags\":{{\"scenario\":\"{scenario}\",\"name\":\"GET /api items\",\"status\":\"200\"}}}}}}\n"
        ));
    }
    out
}

fn influx_config(base_url: &str) -> InfluxConfig {
    InfluxConfig {
        base_url: base_url.to_string(),
        database: "k6".to_string(),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_import_end_to_end_in_full_batches() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("results.json");
    std::fs::write(&input, k6_output()).unwrap();

    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/ping").with_status(204).create_async().await;
    let write = server
        .mock("POST", "/write")
        .match_query(mockito::Matcher::Any)
        .with_status(204)
        .expect(3)
        .create_async()
        .await;

    let opts = ImportOptions {
        input,
        influx: influx_config(&server.url()),
        batch_size: 1000,
        analyze_only: false,
        failure_policy: FailurePolicy::default(),
        catalog: MetricCatalog::default(),
    };
    let run = run_import(&opts, &mut NoProgress).await.unwrap();

    write.assert_async().await;
    assert_eq!(run.ingest.samples, POINTS as u64);
    assert_eq!(run.ingest.skipped_not_json, 1);
    assert_eq!(run.ingest.skipped_not_point, 1);

    let writer = run.writer.unwrap();
    assert_eq!(writer.points_written, POINTS as u64);
    assert_eq!(writer.batches_written, 3);

    let summary = run.summary.unwrap();
    assert_eq!(summary.total_points, POINTS as u64);
    assert_eq!(summary.scenarios, vec!["browse".to_string(), "checkout".to_string()]);
    assert_eq!(summary.request_total, (POINTS / 5) as f64);
    assert_eq!(summary.error_total, (POINTS / 25) as f64);
    assert_eq!(summary.error_rate, Some(0.2));
    assert_eq!(summary.response_times.unwrap().count, POINTS * 3 / 5);
}

#[tokio::test]
async fn test_rejected_batches_reach_dead_letter_file_intact() {
    let dir = tempfile::tempdir().unwrap();
    let dead_letter = dir.path().join("failed.lp");

    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/ping").with_status(204).create_async().await;
    let write = server
        .mock("POST", "/write")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .with_body("overloaded")
        .expect(4)
        .create_async()
        .await;

    let sink = Arc::new(InfluxClient::new(influx_config(&server.url())).unwrap());
    let policy = FailurePolicy {
        max_retries: 1,
        retry_backoff: Duration::from_millis(1),
        dead_letter: Some(dead_letter.clone()),
    };
    let writer = BatchWriter::new(sink, 2000, policy).unwrap();

    let mut outcomes = Vec::new();
    let mut observer = |event: &ProgressEvent| {
        if let ProgressEvent::BatchFlushed { outcome, .. } = event {
            outcomes.push(outcome.clone());
        }
    };
    let run = Pipeline::new()
        .with_writer(writer)
        .run(Cursor::new(k6_output().into_bytes()), &mut observer)
        .await
        .unwrap();

    // Two batches, each tried twice.
    write.assert_async().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| matches!(o, FlushOutcome::DeadLettered { .. })));

    let stats = run.writer.unwrap();
    assert_eq!(stats.points_written, 0);
    assert_eq!(stats.points_failed, POINTS as u64);
    assert_eq!(stats.points_dead_lettered, POINTS as u64);

    let saved = std::fs::read_to_string(&dead_letter).unwrap();
    let records: Vec<_> = saved.lines().map(lineproto::parse).collect();
    assert_eq!(records.len(), POINTS);

    let first = records[0].as_ref().unwrap();
    assert_eq!(first.metric, "http_reqs");
    assert_eq!(
        first.tags,
        vec![
            ("scenario".to_string(), "browse".to_string()),
            ("name".to_string(), "GET /api items".to_string()),
            ("status".to_string(), "200".to_string()),
        ]
    );
    assert_eq!(first.value, 1.0);
}

#[tokio::test]
async fn test_progress_events_during_analysis() {
    let mut lines_seen = Vec::new();
    let mut observer = |event: &ProgressEvent| {
        if let ProgressEvent::LinesProcessed { lines } = event {
            lines_seen.push(*lines);
        }
    };

    let run = Pipeline::new()
        .with_stats(MetricCatalog::default())
        .with_progress_interval(1000)
        .run(Cursor::new(k6_output().into_bytes()), &mut observer)
        .await
        .unwrap();

    assert_eq!(run.ingest.lines, POINTS as u64 + 2);
    assert_eq!(lines_seen, vec![1000, 2000]);
}

#[tokio::test]
async fn test_csv_export_matches_decoded_points() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("results.json");
    std::fs::write(&input, k6_output()).unwrap();

    let opts = CsvOptions {
        input,
        output_prefix: dir.path().join("k6").to_string_lossy().into_owned(),
        single_csv: false,
        create_dashboard: true,
        dashboard_output: dir.path().join("dashboard.json"),
    };
    let outcome = run_csv(&opts, &mut NoProgress).await.unwrap();

    let total_rows: usize = outcome.files.iter().map(|f| f.rows).sum();
    assert_eq!(total_rows, POINTS);
    assert_eq!(outcome.files.len(), 3);

    let duration = std::fs::read_to_string(dir.path().join("k6_http_req_duration.csv")).unwrap();
    let mut lines = duration.lines();
    assert_eq!(lines.next(), Some("timestamp,value,scenario,name,status"));

    // Rows come out in time order even though the input wraps around each minute.
    let stamps: Vec<&str> = lines.map(|l| l.split(',').next().unwrap()).collect();
    assert_eq!(stamps.len(), POINTS * 3 / 5);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    let dashboard: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("dashboard.json")).unwrap()).unwrap();
    let titles: Vec<&str> = dashboard["dashboard"]["panels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["📊 Http Req Duration", "📊 Http Reqs", "📊 Errors"]);
}

#[tokio::test]
async fn test_combined_csv_from_in_memory_input() {
    let run = Pipeline::new()
        .with_tabular(TabularMode::Combined)
        .run(Cursor::new(k6_output().into_bytes()), &mut NoProgress)
        .await
        .unwrap();

    let tables = run.tabular.unwrap().into_tables();
    assert_eq!(tables.len(), 1);
    let (name, table) = &tables[0];
    assert_eq!(name, "combined");
    assert_eq!(
        table.columns,
        vec!["timestamp", "metric", "value", "tag_scenario", "tag_name", "tag_status"]
    );
    assert_eq!(table.rows.len(), POINTS);
}
