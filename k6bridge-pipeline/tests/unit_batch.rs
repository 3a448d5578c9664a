mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedSink;
use k6bridge_common::BridgeError;
use k6bridge_pipeline::batch::{BatchWriter, FailurePolicy, FlushOutcome};

fn no_wait_retries(max_retries: u32) -> FailurePolicy {
    FailurePolicy { max_retries, retry_backoff: Duration::ZERO, dead_letter: None }
}

#[test]
fn test_zero_capacity_rejected() {
    let result = BatchWriter::new(Arc::new(ScriptedSink::ok()), 0, FailurePolicy::default());
    assert!(matches!(result, Err(BridgeError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_flush_calls_ceil_n_over_k() {
    for (n, k) in [(10usize, 3usize), (9, 3), (1, 1000), (0, 5), (1000, 1000), (1001, 1000)] {
        let sink = Arc::new(ScriptedSink::ok());
        let mut writer = BatchWriter::new(sink.clone(), k, FailurePolicy::default()).unwrap();
        for i in 0..n {
            writer.offer(format!("m value=1 {i}")).await;
        }
        writer.flush().await;

        assert_eq!(sink.write_calls(), n.div_ceil(k), "n={n} k={k}");
        assert_eq!(writer.stats().points_written, n as u64);
        assert_eq!(writer.pending(), 0);
    }
}

#[tokio::test]
async fn test_offer_flushes_exactly_at_capacity() {
    let sink = Arc::new(ScriptedSink::ok());
    let mut writer = BatchWriter::new(sink.clone(), 2, FailurePolicy::default()).unwrap();

    assert_eq!(writer.offer("a value=1 1".to_string()).await, None);
    assert_eq!(writer.pending(), 1);
    assert_eq!(
        writer.offer("b value=2 2".to_string()).await,
        Some(FlushOutcome::Written { points: 2, attempts: 1 })
    );
    assert_eq!(sink.payloads(), vec!["a value=1 1\nb value=2 2"]);
}

#[tokio::test]
async fn test_flush_empty_does_not_call_sink() {
    let sink = Arc::new(ScriptedSink::ok());
    let mut writer = BatchWriter::new(sink.clone(), 10, FailurePolicy::default()).unwrap();
    assert_eq!(writer.flush().await, FlushOutcome::Empty);
    assert_eq!(sink.write_calls(), 0);
}

#[tokio::test]
async fn test_failed_batch_is_dropped_and_run_continues() {
    let err = BridgeError::HttpError(500, "internal error".to_string());
    let sink = Arc::new(ScriptedSink::with_results(vec![Err(err.clone()), Ok(())]));
    let mut writer = BatchWriter::new(sink.clone(), 2, FailurePolicy::default()).unwrap();

    writer.offer("a value=1 1".to_string()).await;
    let first = writer.offer("b value=1 2".to_string()).await;
    assert_eq!(first, Some(FlushOutcome::Dropped { points: 2, error: err }));
    assert_eq!(writer.pending(), 0);

    writer.offer("c value=1 3".to_string()).await;
    let last = writer.flush().await;
    assert_eq!(last, FlushOutcome::Written { points: 1, attempts: 1 });

    let stats = writer.stats();
    assert_eq!(stats.points_written, 1);
    assert_eq!(stats.points_failed, 2);
    assert_eq!(stats.batches_written, 1);
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(sink.write_calls(), 2);
}

#[tokio::test]
async fn test_retry_recovers_batch() {
    let sink = Arc::new(ScriptedSink::with_results(vec![
        Err(BridgeError::Timeout(30)),
        Err(BridgeError::NetworkError("reset".to_string())),
        Ok(()),
    ]));
    let mut writer = BatchWriter::new(sink.clone(), 5, no_wait_retries(2)).unwrap();
    writer.offer("a value=1 1".to_string()).await;

    assert_eq!(writer.flush().await, FlushOutcome::Written { points: 1, attempts: 3 });
    assert_eq!(sink.write_calls(), 3);
    assert_eq!(writer.stats().points_failed, 0);
}

#[tokio::test]
async fn test_retries_exhausted_drops_batch() {
    let sink = Arc::new(ScriptedSink::with_results(vec![
        Err(BridgeError::Timeout(30)),
        Err(BridgeError::Timeout(30)),
    ]));
    let mut writer = BatchWriter::new(sink.clone(), 5, no_wait_retries(1)).unwrap();
    writer.offer("a value=1 1".to_string()).await;

    assert_eq!(
        writer.flush().await,
        FlushOutcome::Dropped { points: 1, error: BridgeError::Timeout(30) }
    );
    assert_eq!(sink.write_calls(), 2);
}

#[tokio::test]
async fn test_dead_letter_appends_failed_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let dead_letter = dir.path().join("failed.lp");
    let sink = Arc::new(ScriptedSink::with_results(vec![
        Err(BridgeError::HttpError(400, "bad".to_string())),
        Ok(()),
        Err(BridgeError::HttpError(503, "busy".to_string())),
    ]));
    let policy = FailurePolicy { dead_letter: Some(dead_letter.clone()), ..no_wait_retries(0) };
    let mut writer = BatchWriter::new(sink, 2, policy).unwrap();

    for i in 0..5 {
        writer.offer(format!("m value={i} {i}")).await;
    }
    let last = writer.flush().await;
    assert!(matches!(last, FlushOutcome::DeadLettered { points: 1, .. }));
    assert!(last.is_failure());

    let contents = std::fs::read_to_string(&dead_letter).unwrap();
    assert_eq!(contents, "m value=0 0\nm value=1 1\nm value=4 4\n");

    let stats = writer.stats();
    assert_eq!(stats.points_written, 2);
    assert_eq!(stats.points_failed, 3);
    assert_eq!(stats.points_dead_lettered, 3);
}

#[test]
fn test_is_failure_only_for_undelivered_batches() {
    let error = BridgeError::HttpError(400, "bad".to_string());
    assert!(!FlushOutcome::Empty.is_failure());
    assert!(!FlushOutcome::Written { points: 1, attempts: 1 }.is_failure());
    assert!(FlushOutcome::Dropped { points: 1, error: error.clone() }.is_failure());
    assert!(FlushOutcome::DeadLettered { points: 1, error }.is_failure());
}

#[tokio::test]
async fn test_unwritable_dead_letter_falls_back_to_drop() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(ScriptedSink::with_results(vec![Err(BridgeError::Timeout(1))]));
    // A directory cannot be opened for appending.
    let policy = FailurePolicy { dead_letter: Some(dir.path().to_path_buf()), ..no_wait_retries(0) };
    let mut writer = BatchWriter::new(sink, 1, policy).unwrap();

    let outcome = writer.offer("m value=1 1".to_string()).await;
    assert!(matches!(outcome, Some(FlushOutcome::Dropped { points: 1, .. })));
    assert_eq!(writer.stats().points_dead_lettered, 0);
}

#[tokio::test]
async fn test_preflight_maps_errors_to_sink_unavailable() {
    let writer = BatchWriter::new(Arc::new(ScriptedSink::unreachable()), 1, FailurePolicy::default()).unwrap();
    assert_eq!(
        writer.preflight().await,
        Err(BridgeError::SinkUnavailable("Network error: connection refused".to_string()))
    );

    let writer = BatchWriter::new(Arc::new(ScriptedSink::ok()), 1, FailurePolicy::default()).unwrap();
    assert_eq!(writer.preflight().await, Ok(()));
}
