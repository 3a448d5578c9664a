#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use k6bridge_common::{BridgeError, Result, Sink};

/// In-memory sink that records payloads and answers writes from a script.
#[derive(Default)]
pub struct ScriptedSink {
    pub ping_error: Option<BridgeError>,
    /// Consumed front to back; an exhausted script means success.
    pub write_results: Mutex<VecDeque<Result<()>>>,
    pub payloads: Mutex<Vec<String>>,
}

impl ScriptedSink {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            ping_error: Some(BridgeError::NetworkError("connection refused".to_string())),
            ..Self::default()
        }
    }

    pub fn with_results(results: Vec<Result<()>>) -> Self {
        Self {
            write_results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for ScriptedSink {
    async fn ping(&self) -> Result<()> {
        match &self.ping_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn write(&self, payload: &str) -> Result<()> {
        self.payloads.lock().unwrap().push(payload.to_string());
        self.write_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub fn point_line(metric: &str, time: &str, value: f64) -> String {
    format!(r#"{{"type":"Point","metric":"{metric}","data":{{"time":"{time}","value":{value}}}}}"#)
}

pub fn tagged_point_line(metric: &str, time: &str, value: f64, tags: &str) -> String {
    format!(r#"{{"type":"Point","metric":"{metric}","data":{{"time":"{time}","value":{value},"tags":{tags}}}}}"#)
}
