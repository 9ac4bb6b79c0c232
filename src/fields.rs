// helpers for reading typed values out of records, so every aggregation agrees on what "empty" means

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// A single record as handed to us by the record source.
pub type Record = Map<String, Value>;

/// Timestamp layouts the record source is known to emit, tried in order after RFC 3339.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// simple recursive algo to fetch the value from a record when our key.is.formatted.like.this
pub fn get_root_elem<'a>(data: &'a Record, nested_key: &str) -> Option<&'a Value> {
    // a literal key wins, so flat records with dotted names still resolve
    if let Some(val) = data.get(nested_key) {
        return Some(val);
    }

    let (child_key, rest) = nested_key.split_once('.')?;
    match data.get(child_key)? {
        Value::Object(child) => get_root_elem(child, rest),
        _ => None,
    }
}

/// Turn a field value into the label used to bucket a record.
///
/// A relational reference `[id, "label"]` yields its label. Absent, `null`, `false`,
/// empty strings and zero all count as missing, since that's how the source encodes empty fields.
pub fn group_label(value: &Value) -> Option<String> {
    match value {
        Value::Array(reference) => reference.get(1).and_then(group_label),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Bool(false) | Value::Null => None,
        Value::Object(_) => {
            debug!("cannot use an object as a group label");
            None
        }
    }
}

/// The id of a relational reference `[id, "label"]`
pub fn reference_id(value: &Value) -> Option<f64> {
    match value {
        Value::Array(reference) => reference.first().and_then(Value::as_f64),
        _ => None,
    }
}

/// Fetch the group label for `field`, if the record has one.
pub fn field_label(record: &Record, field: &str) -> Option<String> {
    get_root_elem(record, field).and_then(group_label)
}

/// Coerce a value to a number. Numeric strings are accepted, everything else is missing.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub fn field_number(record: &Record, field: &str) -> Option<f64> {
    get_root_elem(record, field).and_then(numeric)
}

/// Parse a timestamp. Naive timestamps are read as UTC, plain dates as midnight,
/// and numbers as seconds since the epoch.
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp(raw.trim()),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        }
        _ => None,
    }
}

pub fn field_timestamp(record: &Record, field: &str) -> Option<DateTime<Utc>> {
    get_root_elem(record, field).and_then(timestamp)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(parsed.and_utc());
        }
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Err(_) => {
            debug!("could not parse timestamp {}", raw);
            None
        }
    }
}

/// Fractional hours between two timestamps. Negative spans are returned as-is.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}
