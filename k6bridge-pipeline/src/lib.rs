//! Streaming conversion of k6 JSON output.
//!
//! A [`Pipeline`] reads the input once, line by line, decodes each line into a
//! [`Sample`] and fans it out to whichever consumers are enabled:
//!
//! ```text
//! line --> decode --+--> StatsCollector
//!                   +--> lineproto::encode --> BatchWriter --> Sink
//!                   +--> TabularAggregator --> CSV
//! ```
//!
//! Per-line and per-batch failures are counted, never propagated. Only an unreachable
//! sink at pre-flight or an I/O error on the input aborts a run.

use std::io::BufRead;

use k6bridge_common::config::{MAX_LOGGED_DECODE_ERRORS, PROGRESS_INTERVAL_LINES};
use k6bridge_common::{MetricCatalog, Result, Sample};
use tracing::{debug, warn};

pub mod batch;
pub mod decode;
pub mod lineproto;
pub mod progress;
pub mod stats;
pub mod tabular;

pub use batch::{BatchWriter, FailurePolicy, FlushOutcome, WriterStats};
pub use decode::{decode, Decoded, Skip};
pub use progress::{NoProgress, ProgressEvent, ProgressObserver, TracingProgress};
pub use stats::{StatsCollector, Summary};
pub use tabular::{TabularAggregator, TabularMode};

/// Line-level counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub lines: u64,
    pub samples: u64,
    pub skipped_not_json: u64,
    pub skipped_not_point: u64,
    /// Point records that failed to decode.
    pub decode_errors: u64,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub ingest: IngestCounters,
    /// Handed back unsorted; sorting happens on export.
    pub tabular: Option<TabularAggregator>,
    pub summary: Option<Summary>,
    pub writer: Option<WriterStats>,
}

impl RunOutcome {
    /// Decode errors plus records the sink never accepted.
    pub fn error_count(&self) -> u64 {
        self.ingest.decode_errors + self.writer.as_ref().map_or(0, |w| w.points_failed)
    }

    /// Percentage of decoded points not lost to errors; `None` when nothing was decoded.
    pub fn success_rate(&self) -> Option<f64> {
        if self.ingest.samples == 0 {
            return None;
        }
        let ok = self.ingest.samples.saturating_sub(self.error_count());
        Some(ok as f64 / self.ingest.samples as f64 * 100.0)
    }
}

/// Single-pass fan-out of decoded samples.
pub struct Pipeline {
    tabular: Option<TabularAggregator>,
    writer: Option<BatchWriter>,
    stats: Option<StatsCollector>,
    progress_interval: u64,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            tabular: None,
            writer: None,
            stats: None,
            progress_interval: PROGRESS_INTERVAL_LINES,
        }
    }

    pub fn with_tabular(mut self, mode: TabularMode) -> Self {
        self.tabular = Some(TabularAggregator::new(mode));
        self
    }

    pub fn with_writer(mut self, writer: BatchWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_stats(mut self, catalog: MetricCatalog) -> Self {
        self.stats = Some(StatsCollector::new(catalog));
        self
    }

    /// Emit `LinesProcessed` every `lines` lines (0 disables it).
    pub fn with_progress_interval(mut self, lines: u64) -> Self {
        self.progress_interval = lines;
        self
    }

    /// Consume `reader` to the end.
    ///
    /// When a writer is configured the sink is pinged first; failure returns
    /// `SinkUnavailable` before any line is read.
    pub async fn run<R: BufRead>(
        mut self,
        mut reader: R,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunOutcome> {
        if let Some(writer) = &self.writer {
            writer.preflight().await?;
            debug!("sink pre-flight succeeded");
        }

        let mut counters = IngestCounters::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            counters.lines += 1;
            let line_no = counters.lines;

            let decoded = match std::str::from_utf8(&buf) {
                Ok(line) => decode(line),
                Err(_) => Ok(Decoded::Skip(Skip::NotJson)),
            };

            match decoded {
                Ok(Decoded::Sample(sample)) => {
                    counters.samples += 1;
                    self.dispatch(sample, observer).await;
                }
                Ok(Decoded::Skip(Skip::NotJson)) => counters.skipped_not_json += 1,
                Ok(Decoded::Skip(Skip::NotPoint)) => counters.skipped_not_point += 1,
                Err(e) => {
                    counters.decode_errors += 1;
                    if counters.decode_errors <= MAX_LOGGED_DECODE_ERRORS {
                        warn!(line = line_no, error = %e, "skipping undecodable point");
                    } else {
                        debug!(line = line_no, error = %e, "skipping undecodable point");
                    }
                }
            }

            if self.progress_interval > 0 && line_no % self.progress_interval == 0 {
                observer.on_event(&ProgressEvent::LinesProcessed { lines: line_no });
            }
        }

        let writer = match self.writer.as_mut() {
            Some(writer) => {
                let outcome = writer.flush().await;
                notify_flush(writer, outcome, observer);
                Some(writer.stats().clone())
            }
            None => None,
        };

        Ok(RunOutcome {
            ingest: counters,
            tabular: self.tabular,
            summary: self.stats.as_mut().map(StatsCollector::summarize),
            writer,
        })
    }

    async fn dispatch(&mut self, sample: Sample, observer: &mut dyn ProgressObserver) {
        if let Some(stats) = self.stats.as_mut() {
            stats.observe(&sample);
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Some(outcome) = writer.offer(lineproto::encode(&sample)).await {
                notify_flush(writer, outcome, observer);
            }
        }
        if let Some(tabular) = self.tabular.as_mut() {
            tabular.push(sample);
        }
    }
}

fn notify_flush(writer: &BatchWriter, outcome: FlushOutcome, observer: &mut dyn ProgressObserver) {
    if outcome == FlushOutcome::Empty {
        return;
    }
    observer.on_event(&ProgressEvent::BatchFlushed {
        outcome,
        points_written: writer.stats().points_written,
    });
}
