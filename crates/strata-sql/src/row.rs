//! Dynamic row decoding
//!
//! Result rows carry user-defined columns the compile-time layer cannot
//! know, so decoding is driven by the driver's reported column type and
//! produces ordered JSON maps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use strata_core::error::{Error, Result};
use strata_core::record::Record;
use tracing::warn;
use uuid::Uuid;

fn number_from_f64(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn decode_error(column: &str, err: sqlx::Error) -> Error {
    Error::adapter(format!("failed to decode column {column:?}: {err}"))
}

/// Decode one PostgreSQL row into a record, keyed in column order
pub fn decode_pg_row(row: &PgRow) -> Result<Record> {
    let mut record = Map::with_capacity(row.columns().len());

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_error(name, e))?;
        if raw.is_null() {
            record.insert(name.to_string(), Value::Null);
            continue;
        }

        let type_name = column.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                Value::String(row.try_get::<String, _>(index).map_err(|e| decode_error(name, e))?)
            }
            "UUID" => Value::String(
                row.try_get::<Uuid, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .to_string(),
            ),
            "INT2" => Value::from(row.try_get::<i16, _>(index).map_err(|e| decode_error(name, e))?),
            "INT4" => Value::from(row.try_get::<i32, _>(index).map_err(|e| decode_error(name, e))?),
            "INT8" => Value::from(row.try_get::<i64, _>(index).map_err(|e| decode_error(name, e))?),
            "FLOAT4" => number_from_f64(
                row.try_get::<f32, _>(index).map_err(|e| decode_error(name, e))? as f64,
            ),
            "FLOAT8" => number_from_f64(
                row.try_get::<f64, _>(index).map_err(|e| decode_error(name, e))?,
            ),
            "NUMERIC" => {
                let decimal: Decimal =
                    row.try_get(index).map_err(|e| decode_error(name, e))?;
                decimal.to_f64().map(number_from_f64).unwrap_or(Value::Null)
            }
            "BOOL" => Value::Bool(row.try_get::<bool, _>(index).map_err(|e| decode_error(name, e))?),
            "TIMESTAMPTZ" => Value::String(
                row.try_get::<DateTime<Utc>, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .to_rfc3339(),
            ),
            "TIMESTAMP" => Value::String(
                row.try_get::<NaiveDateTime, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .and_utc()
                    .to_rfc3339(),
            ),
            "DATE" => Value::String(
                row.try_get::<NaiveDate, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .to_string(),
            ),
            "JSON" | "JSONB" => row
                .try_get::<Value, _>(index)
                .map_err(|e| decode_error(name, e))?,
            "TEXT[]" | "VARCHAR[]" => Value::Array(
                row.try_get::<Vec<String>, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            "UUID[]" => Value::Array(
                row.try_get::<Vec<Uuid>, _>(index)
                    .map_err(|e| decode_error(name, e))?
                    .into_iter()
                    .map(|u| Value::String(u.to_string()))
                    .collect(),
            ),
            other => {
                // Last-resort attempts for types the registry never emits
                if let Ok(s) = row.try_get::<String, _>(index) {
                    Value::String(s)
                } else if let Ok(i) = row.try_get::<i64, _>(index) {
                    Value::from(i)
                } else if let Ok(f) = row.try_get::<f64, _>(index) {
                    number_from_f64(f)
                } else {
                    warn!(column = name, pg_type = other, "undecodable column, emitting null");
                    Value::Null
                }
            }
        };
        record.insert(name.to_string(), value);
    }

    Ok(record)
}

/// Decode one SQLite row into a record, keyed in column order
pub fn decode_sqlite_row(row: &SqliteRow) -> Result<Record> {
    let mut record = Map::with_capacity(row.columns().len());

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_error(name, e))?;
        if raw.is_null() {
            record.insert(name.to_string(), Value::Null);
            continue;
        }

        let type_name = column.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index).map_err(|e| decode_error(name, e))?),
            "INTEGER" | "INT4" | "INT8" | "BIGINT" => {
                Value::from(row.try_get::<i64, _>(index).map_err(|e| decode_error(name, e))?)
            }
            "REAL" | "NUMERIC" => number_from_f64(
                row.try_get::<f64, _>(index).map_err(|e| decode_error(name, e))?,
            ),
            "BLOB" => Value::String(hex::encode(
                row.try_get::<Vec<u8>, _>(index).map_err(|e| decode_error(name, e))?,
            )),
            "TEXT" | "DATETIME" | "DATE" => {
                Value::String(row.try_get::<String, _>(index).map_err(|e| decode_error(name, e))?)
            }
            other => {
                if let Ok(s) = row.try_get::<String, _>(index) {
                    Value::String(s)
                } else if let Ok(i) = row.try_get::<i64, _>(index) {
                    Value::from(i)
                } else if let Ok(f) = row.try_get::<f64, _>(index) {
                    number_from_f64(f)
                } else {
                    warn!(column = name, sqlite_type = other, "undecodable column, emitting null");
                    Value::Null
                }
            }
        };
        record.insert(name.to_string(), value);
    }

    Ok(record)
}
