use chrono::{DateTime, NaiveDateTime, Utc};
use k6bridge_common::{DecodeError, Sample, Tags};
use serde_json::{Map, Value};

/// Why a line produced no sample without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Blank line or console noise that is not JSON.
    NotJson,
    /// Valid JSON, but not a `"type": "Point"` record (e.g. a `Metric` declaration).
    NotPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Sample(Sample),
    Skip(Skip),
}

/// Turn one raw line of k6 JSON output into a [`Sample`].
///
/// Required shape: `{"type":"Point","metric":..,"data":{"time":..,"value":..,"tags":{..}}}`.
/// `tags` may be absent.
pub fn decode(line: &str) -> Result<Decoded, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Decoded::Skip(Skip::NotJson));
    }

    let root: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return Ok(Decoded::Skip(Skip::NotJson)),
    };

    if root.get("type").and_then(Value::as_str) != Some("Point") {
        return Ok(Decoded::Skip(Skip::NotPoint));
    }

    let metric = root
        .get("metric")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| missing("metric"))?;

    let data = root
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| missing("data"))?;

    let value = data
        .get("value")
        .and_then(Value::as_f64)
        .ok_or_else(|| missing("data.value"))?;

    let time = data
        .get("time")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("data.time"))?;

    let timestamp_nanos = parse_timestamp(time)?;
    let tags = extract_tags(data)?;

    Ok(Decoded::Sample(Sample {
        metric: metric.to_string(),
        timestamp_nanos,
        value,
        tags,
    }))
}

/// Parse an ISO-8601 time into nanoseconds since the epoch.
///
/// Accepts a `Z` suffix or an explicit offset; a time without an offset is read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<i64, DecodeError> {
    let malformed = || DecodeError::MalformedTimestamp(raw.to_string());

    let utc = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| malformed())?
            .and_utc(),
    };

    utc.timestamp_nanos_opt().ok_or_else(malformed)
}

fn extract_tags(data: &Map<String, Value>) -> Result<Tags, DecodeError> {
    let raw = match data.get("tags") {
        None | Some(Value::Null) => return Ok(Tags::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(missing("data.tags")),
    };

    Ok(raw
        .iter()
        .map(|(k, v)| (k.clone(), tag_value_to_string(v)))
        .collect())
}

fn tag_value_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn missing(field: &str) -> DecodeError {
    DecodeError::MissingField(field.to_string())
}
