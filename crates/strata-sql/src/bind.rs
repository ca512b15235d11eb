//! Dynamic parameter binding
//!
//! Record payloads are untyped JSON, so parameters are bound by inspecting
//! each value. Strings are sniffed for UUID and RFC 3339 timestamp shapes
//! so comparisons against `UUID` and `TIMESTAMPTZ` columns type-check on
//! PostgreSQL; SQLite's dynamic typing needs no such help.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use uuid::Uuid;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;
type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Parse a string that looks like a UUID; hyphenated form only
fn sniff_uuid(s: &str) -> Option<Uuid> {
    if s.len() == 36 && s.as_bytes().get(8) == Some(&b'-') {
        Uuid::parse_str(s).ok()
    } else {
        None
    }
}

/// Parse a string that looks like an RFC 3339 timestamp
fn sniff_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.len() >= 19 && s.as_bytes().get(4) == Some(&b'-') && s.as_bytes().get(10) == Some(&b'T') {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    } else {
        None
    }
}

pub fn bind_pg<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => {
            if let Some(uuid) = sniff_uuid(s) {
                query.bind(uuid)
            } else if let Some(ts) = sniff_timestamp(s) {
                query.bind(ts)
            } else {
                query.bind(s.clone())
            }
        }
        Value::Array(items) => {
            // String arrays bind as text[] (the access_* columns and the
            // $any/$all operators); anything else goes through jsonb
            if items.iter().all(Value::is_string) {
                let strings: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                query.bind(strings)
            } else {
                query.bind(value.clone())
            }
        }
        Value::Object(_) => query.bind(value.clone()),
    }
}

pub fn bind_sqlite<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        // SQLite has no array or json parameter types; store JSON text
        Value::Array(_) | Value::Object(_) => {
            query.bind(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_sniffing() {
        assert!(sniff_uuid("0b9bf3ed-53b2-4b45-9ac4-7a5e389a3f0d").is_some());
        assert!(sniff_uuid("not-a-uuid").is_none());
        assert!(sniff_uuid("0b9bf3ed53b24b459ac47a5e389a3f0d").is_none());
    }

    #[test]
    fn test_timestamp_sniffing() {
        assert!(sniff_timestamp("2026-08-01T12:00:00Z").is_some());
        assert!(sniff_timestamp("2026-08-01T12:00:00.123+02:00").is_some());
        assert!(sniff_timestamp("2026-08-01").is_none());
        assert!(sniff_timestamp("yesterday").is_none());
    }
}
