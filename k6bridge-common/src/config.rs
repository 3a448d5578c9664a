use std::time::Duration;

/// Records per sink write when `--batch-size` is not given.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Upper bound for a single sink request.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_INFLUX_URL: &str = "http://127.0.0.1:8086";
pub const DEFAULT_DATABASE: &str = "k6";
pub const DEFAULT_OUTPUT_PREFIX: &str = "k6-metrics";
pub const DEFAULT_DASHBOARD_OUTPUT: &str = "grafana-csv-dashboard.json";

/// Decode errors past this count are still counted but only logged at debug level.
pub const MAX_LOGGED_DECODE_ERRORS: u64 = 10;

/// A `LinesProcessed` progress event fires every this many input lines.
pub const PROGRESS_INTERVAL_LINES: u64 = 10_000;

/// The only status the sink answers with on a successful ping or write.
pub const SINK_SUCCESS_STATUS: u16 = 204;

/// Characters of a failed response body kept in `HttpError`.
pub const ERROR_BODY_EXCERPT: usize = 100;
