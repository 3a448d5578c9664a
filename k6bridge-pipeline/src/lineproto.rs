//! InfluxDB line protocol: `metric[,tag=val...] value=<f64> <timestamp_ns>`.
//!
//! Only tag values are escaped (space, comma, equals). Metric names and tag keys are
//! written verbatim; k6 never emits those characters in them.

use k6bridge_common::Sample;

/// Encode one sample as a single line-protocol record (no trailing newline).
///
/// Tags whose value is empty or whitespace-only are omitted. When no tag survives,
/// the record has no tag segment at all.
///
/// Backslashes and line breaks in tag values are written as-is. A value ending in `\`
/// escapes the separator space and one containing `\n` splits the record, so either
/// yields a record the sink (and [`parse`]) will reject.
pub fn encode(sample: &Sample) -> String {
    let mut out = String::with_capacity(sample.metric.len() + 48);
    out.push_str(&sample.metric);

    for (key, value) in &sample.tags {
        if value.trim().is_empty() {
            continue;
        }
        out.push(',');
        out.push_str(key);
        out.push('=');
        out.push_str(&escape_tag_value(value));
    }

    out.push_str(" value=");
    out.push_str(&sample.value.to_string());
    out.push(' ');
    out.push_str(&sample.timestamp_nanos.to_string());
    out
}

pub fn escape_tag_value(raw: &str) -> String {
    raw.replace(' ', "\\ ")
        .replace(',', "\\,")
        .replace('=', "\\=")
}

/// Inverse of [`escape_tag_value`].
pub fn unescape_tag_value(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ' ' | ',' | '=') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// A record read back from its wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub metric: String,
    /// Unescaped tag pairs in wire order.
    pub tags: Vec<(String, String)>,
    pub value: f64,
    pub timestamp_nanos: i64,
}

/// Parse a record produced by [`encode`]. Returns `None` for anything else.
pub fn parse(line: &str) -> Option<ParsedRecord> {
    let sections = split_unescaped(line, ' ');
    let [key, field, timestamp] = sections.as_slice() else {
        return None;
    };

    let mut key_parts = split_unescaped(key, ',').into_iter();
    let metric = key_parts.next().filter(|m| !m.is_empty())?.to_string();
    let mut tags = Vec::new();
    for pair in key_parts {
        let mut kv = split_unescaped(pair, '=').into_iter();
        let (k, v) = (kv.next()?, kv.next()?);
        if kv.next().is_some() {
            return None;
        }
        tags.push((k.to_string(), unescape_tag_value(v)));
    }

    let value = field.strip_prefix("value=")?.parse::<f64>().ok()?;
    let timestamp_nanos = timestamp.parse::<i64>().ok()?;

    Some(ParsedRecord { metric, tags, value, timestamp_nanos })
}

/// Split on `sep` wherever it is not preceded by a backslash.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}
