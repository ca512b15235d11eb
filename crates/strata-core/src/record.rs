//! Record helpers
//!
//! Data rows are dynamically shaped, so a record is just an ordered JSON
//! map. The helpers here cover the handful of system-field accesses the
//! pipeline needs.

use serde_json::{Map, Value};

/// A single data row, keyed by column name in column order
pub type Record = Map<String, Value>;

/// Extract the record id as a string, if present and non-null
pub fn record_id(record: &Record) -> Option<&str> {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Collect the ids of a batch, skipping records without one
pub fn record_ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| record_id(r).map(str::to_string))
        .collect()
}

/// Read an `access_*` array as a string list; absent or null means empty
pub fn access_list(record: &Record, field: &str) -> Vec<String> {
    match record.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_record_id() {
        let r = record(json!({"id": "abc", "name": "x"}));
        assert_eq!(record_id(&r), Some("abc"));

        let r = record(json!({"id": null}));
        assert_eq!(record_id(&r), None);

        let r = record(json!({"name": "x"}));
        assert_eq!(record_id(&r), None);
    }

    #[test]
    fn test_record_ids_skips_missing() {
        let batch = vec![
            record(json!({"id": "a"})),
            record(json!({"name": "no id"})),
            record(json!({"id": "b"})),
        ];
        assert_eq!(record_ids(&batch), vec!["a", "b"]);
    }

    #[test]
    fn test_access_list() {
        let r = record(json!({"access_read": ["u1", "u2"], "access_deny": null}));
        assert_eq!(access_list(&r, "access_read"), vec!["u1", "u2"]);
        assert!(access_list(&r, "access_deny").is_empty());
        assert!(access_list(&r, "access_edit").is_empty());
    }
}
