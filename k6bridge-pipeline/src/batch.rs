use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use k6bridge_common::{BridgeError, Result, Sink};
use rand::Rng;
use tracing::{error, info, warn};

/// What happens to a batch whose write fails.
///
/// The default drops it after one attempt: the failure is counted and the run moves on.
/// Retries and a dead-letter file are opt-in.
#[derive(Debug, Clone, PartialEq)]
pub struct FailurePolicy {
    /// Extra attempts after the first failed write.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n * retry_backoff` plus up to half of it in jitter.
    pub retry_backoff: Duration,
    /// Failed payloads are appended here instead of being discarded.
    pub dead_letter: Option<PathBuf>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            dead_letter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was buffered; the sink was not called.
    Empty,
    Written { points: usize, attempts: u32 },
    Dropped { points: usize, error: BridgeError },
    DeadLettered { points: usize, error: BridgeError },
}

impl FlushOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FlushOutcome::Dropped { .. } | FlushOutcome::DeadLettered { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub points_written: u64,
    /// Points in batches that were not delivered (dropped or dead-lettered).
    pub points_failed: u64,
    /// Subset of `points_failed` that reached the dead-letter file.
    pub points_dead_lettered: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
}

/// Buffers encoded records and writes them to a [`Sink`] in bounded batches.
pub struct BatchWriter {
    sink: Arc<dyn Sink>,
    capacity: usize,
    batch: Vec<String>,
    policy: FailurePolicy,
    stats: WriterStats,
}

impl BatchWriter {
    pub fn new(sink: Arc<dyn Sink>, capacity: usize, policy: FailurePolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            sink,
            capacity,
            batch: Vec::with_capacity(capacity),
            policy,
            stats: WriterStats::default(),
        })
    }

    /// Records buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Verify the sink is reachable. Any failure is reported as `SinkUnavailable`.
    pub async fn preflight(&self) -> Result<()> {
        self.sink.ping().await.map_err(|e| match e {
            BridgeError::SinkUnavailable(_) => e,
            other => BridgeError::SinkUnavailable(other.to_string()),
        })
    }

    /// Buffer one record, flushing automatically once the batch is full.
    pub async fn offer(&mut self, record: String) -> Option<FlushOutcome> {
        self.batch.push(record);
        if self.batch.len() >= self.capacity {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Write everything buffered. The batch is cleared whatever the outcome.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let records = std::mem::replace(&mut self.batch, Vec::with_capacity(self.capacity));
        let points = records.len();
        let payload = records.join("\n");

        let mut attempt: u32 = 0;
        let error = loop {
            attempt += 1;
            match self.sink.write(&payload).await {
                Ok(()) => {
                    self.stats.points_written += points as u64;
                    self.stats.batches_written += 1;
                    info!(
                        points,
                        attempts = attempt,
                        total_written = self.stats.points_written,
                        "batch written"
                    );
                    return FlushOutcome::Written { points, attempts: attempt };
                }
                Err(e) if attempt <= self.policy.max_retries => {
                    let delay = backoff_delay(self.policy.retry_backoff, attempt);
                    warn!(points, attempt, error = %e, ?delay, "batch write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e,
            }
        };

        self.stats.points_failed += points as u64;
        self.stats.batches_failed += 1;
        error!(points, attempts = attempt, error = %error, "batch write failed");

        if let Some(path) = &self.policy.dead_letter {
            match append_dead_letter(path, &payload) {
                Ok(()) => {
                    self.stats.points_dead_lettered += points as u64;
                    return FlushOutcome::DeadLettered { points, error };
                }
                Err(io_err) => {
                    warn!(
                        path = %path.display(),
                        error = %io_err,
                        "dead-letter write failed, batch dropped"
                    );
                }
            }
        }

        FlushOutcome::Dropped { points, error }
    }
}

/// Linear backoff with up to 50% random jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let scaled = base.saturating_mul(attempt);
    let max_jitter_ms = (base.as_millis() / 2) as u64;
    let jitter_ms = if max_jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max_jitter_ms)
    };
    scaled + Duration::from_millis(jitter_ms)
}

fn append_dead_letter(path: &Path, payload: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(payload.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}
