use tracing::info;

use crate::batch::FlushOutcome;

/// Notifications emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    LinesProcessed { lines: u64 },
    /// Fired after every flush that actually called the sink.
    BatchFlushed { outcome: FlushOutcome, points_written: u64 },
}

/// Receives [`ProgressEvent`]s. Implemented for any `FnMut(&ProgressEvent)`.
pub trait ProgressObserver {
    fn on_event(&mut self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressEvent),
{
    fn on_event(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::LinesProcessed { lines } => info!(lines, "lines processed"),
            // Failures are already logged at error level by the writer.
            ProgressEvent::BatchFlushed { outcome, .. } if outcome.is_failure() => {}
            ProgressEvent::BatchFlushed { points_written, .. } => {
                info!(points_written, "imported batch")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_event(&mut self, _event: &ProgressEvent) {}
}
