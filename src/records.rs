//! Flexible JSON record extraction.
//!
//! The API-ledger export arrives in one of several shapes: a JSON array of
//! objects, a single object wrapping one array under an arbitrary key (the
//! shape a SQL exporter produces, `{"SELECT ...": [ ... ]}`), a bare object,
//! or newline-delimited JSON where each line may itself be any of those.
//! This module flattens all of them into one `Vec` of record values.

use serde_json::Value;
use tracing::debug;

/// Extract a flat list of record objects from raw file content.
///
/// Never fails: unparsable lines are skipped and counted via the returned
/// diagnostics, matching the skip-and-continue policy for per-record errors.
pub fn extract_records(content: &str) -> (Vec<Value>, usize) {
    let content = content.trim();
    if content.is_empty() {
        return (Vec::new(), 0);
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(content) {
        let mut records = Vec::new();
        unwrap_into(parsed, &mut records);
        return (records, 0);
    }

    // Newline-delimited JSON, with the same unwrapping per line.
    let mut records = Vec::new();
    let mut skipped = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(parsed) => unwrap_into(parsed, &mut records),
            Err(err) => {
                debug!(%err, "skipping unparsable JSON line");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

/// Flatten one parsed value into record objects, auto-unwrapping the
/// single-key-object-around-array shape.
fn unwrap_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => out.extend(items),
        Value::Object(map)
            if map.len() == 1 && map.values().next().is_some_and(Value::is_array) =>
        {
            let (_, inner) = map.into_iter().next().expect("len checked");
            if let Value::Array(items) = inner {
                debug!(records = items.len(), "unwrapped single-key array payload");
                out.extend(items);
            }
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let (records, skipped) = extract_records(r#"[{"email":"a@x.com"},{"email":"b@x.com"}]"#);
        assert_eq!(records.len(), 2);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn unwraps_sql_export_shape() {
        let (records, _) =
            extract_records(r#"{"SELECT * FROM usage": [{"email":"a@x.com"},{"email":"b@x.com"}]}"#);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["email"], "a@x.com");
    }

    #[test]
    fn parses_ndjson_and_skips_bad_lines() {
        let content = "{\"email\":\"a@x.com\"}\nnot json\n{\"email\":\"b@x.com\"}";
        let (records, skipped) = extract_records(content);
        assert_eq!(records.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn ndjson_lines_may_wrap_arrays() {
        let content = "{\"q\": [{\"email\":\"a@x.com\"},{\"email\":\"b@x.com\"}]}\n{\"email\":\"c@x.com\"}";
        let (records, _) = extract_records(content);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn empty_input_yields_no_records() {
        let (records, skipped) = extract_records("   \n  ");
        assert!(records.is_empty());
        assert_eq!(skipped, 0);
    }
}
