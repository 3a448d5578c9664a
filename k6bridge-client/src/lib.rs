use std::time::Duration;

use async_trait::async_trait;
use k6bridge_common::config::{
    DEFAULT_DATABASE, DEFAULT_INFLUX_URL, DEFAULT_WRITE_TIMEOUT, ERROR_BODY_EXCERPT,
    SINK_SUCCESS_STATUS,
};
use k6bridge_common::{BridgeError, Result, Sink};
use tracing::debug;

/// InfluxDB (1.x HTTP API) client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxConfig {
    /// Scheme, host and port, e.g. `http://127.0.0.1:8086`. A trailing slash is ignored.
    pub base_url: String,
    pub database: String,
    /// Applies to each ping and write request.
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INFLUX_URL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// InfluxDB line-protocol sink
pub struct InfluxClient {
    pub config: InfluxConfig,
    http_client: reqwest::Client,
}

impl InfluxClient {
    /// Create a new client with the given configuration
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;
        Ok(Self { config, http_client })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn build_ping_url(&self) -> String {
        format!("{}/ping", self.base())
    }

    /// Write endpoint with nanosecond precision, matching the encoder's timestamps.
    pub fn build_write_url(&self) -> String {
        format!("{}/write?db={}&precision=ns", self.base(), self.config.database)
    }

    fn map_send_error(&self, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(self.config.timeout.as_secs())
        } else {
            BridgeError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl Sink for InfluxClient {
    /// `GET /ping`; anything but 204 means the sink is unavailable.
    async fn ping(&self) -> Result<()> {
        let url = self.build_ping_url();

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                BridgeError::SinkUnavailable(format!("{url}: {}", self.map_send_error(e)))
            })?;

        let status = response.status().as_u16();
        if status != SINK_SUCCESS_STATUS {
            return Err(BridgeError::SinkUnavailable(format!(
                "{url} returned status {status}"
            )));
        }

        debug!(url = %url, "influxdb ping ok");
        Ok(())
    }

    /// `POST /write` with a newline-joined line-protocol body.
    async fn write(&self, payload: &str) -> Result<()> {
        let response = self
            .http_client
            .post(self.build_write_url())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.as_u16() == SINK_SUCCESS_STATUS {
            return Ok(());
        }

        Err(parse_error_response(status, response).await)
    }
}

async fn parse_error_response(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> BridgeError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    BridgeError::HttpError(status.as_u16(), excerpt)
}
