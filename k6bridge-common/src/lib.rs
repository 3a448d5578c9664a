use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;
pub mod config;

pub use catalog::MetricCatalog;

/// Tag set of a sample, in the order the load-testing tool emitted it.
pub type Tags = IndexMap<String, String>;

/// One timestamped, tagged numeric observation decoded from a `Point` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: String,
    /// Nanoseconds since the Unix epoch (UTC).
    pub timestamp_nanos: i64,
    pub value: f64,
    pub tags: Tags,
}

impl Sample {
    pub fn new(metric: impl Into<String>, timestamp_nanos: i64, value: f64) -> Self {
        Self {
            metric: metric.into(),
            timestamp_nanos,
            value,
            tags: Tags::new(),
        }
    }

    /// Add or replace the tag `key`, keeping its original position if it already existed.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Error types for k6bridge operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}

/// A line that parsed as a JSON `Point` record but could not be turned into a [`Sample`].
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("Missing or invalid field: {0}")]
    MissingField(String),

    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),
}

/// Result type for k6bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Write boundary of the time-series sink.
///
/// Implementations only move bytes; batching, retry and drop decisions belong to the caller.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Connectivity check performed once before any data is read.
    async fn ping(&self) -> Result<()>;

    /// Deliver one newline-joined line-protocol payload.
    async fn write(&self, payload: &str) -> Result<()>;
}
