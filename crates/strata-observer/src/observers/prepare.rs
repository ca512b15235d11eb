//! Ring 0 — data preparation
//!
//! Pre-image materialization, input type coercion, and system-field
//! stamping. Everything later rings rely on is normalized here: ids are
//! known to exist for id-addressed operations, and access arrays are
//! arrays regardless of what the driver returned.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use strata_core::definition::PropertyType;
use strata_core::error::{Error, Result};
use strata_core::record::{record_id, Record};
use strata_core::types::Operation;
use strata_filter::{compile, Filter, FilterOptions};

const ACCESS_FIELDS: [&str; 4] = ["access_read", "access_edit", "access_full", "access_deny"];

/// SQLite hands access arrays back as JSON text; normalize in place so the
/// security ring and the access persistence see real arrays
pub(crate) fn normalize_access_fields(record: &mut Record) {
    for field in ACCESS_FIELDS {
        if let Some(Value::String(raw)) = record.get(field) {
            if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
                record.insert(field.to_string(), parsed);
            }
        }
    }
}

/// Load the current rows for id-addressed operations into the pre-image
/// slot, trashed rows included (revert needs them), expired rows never.
pub struct LoadPreImages;

#[async_trait]
impl Observer for LoadPreImages {
    fn name(&self) -> &'static str {
        "load_pre_images"
    }

    fn ring(&self) -> Ring {
        Ring::DataPreparation
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[
            Operation::Update,
            Operation::Delete,
            Operation::Revert,
            Operation::Expire,
            Operation::Access,
        ])
    }

    fn order(&self) -> i32 {
        -10
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let mut ids = Vec::with_capacity(ctx.records.len());
        let mut missing = Vec::new();
        for (index, record) in ctx.records.iter().enumerate() {
            match record_id(record) {
                Some(id) => ids.push(id.to_string()),
                None => missing.push(index),
            }
        }
        for index in missing {
            ctx.fail(Error::bad_request(
                "OPERATION_MISSING_ID",
                format!("record {index} has no id for {}", ctx.operation),
            ));
        }
        if ctx.has_errors() || ids.is_empty() {
            return Ok(());
        }

        let compiled = compile(
            &Filter::by_ids(&ids),
            &FilterOptions::default().include_trashed(),
        )?;
        let sql = format!(
            r#"SELECT * FROM "{}"{}"#,
            ctx.table_name(),
            compiled.where_sql()
        );

        let mut adapter = ctx.adapter.lock().await;
        let result = adapter.query(&sql, &compiled.params).await?;
        drop(adapter);

        let mut pre_images = result.rows;
        for image in &mut pre_images {
            normalize_access_fields(image);
        }

        // Updates and access changes address specific rows; a missing row
        // is an error. The lifecycle transitions tolerate absent rows for
        // idempotence.
        if matches!(ctx.operation, Operation::Update | Operation::Access) {
            let found: std::collections::HashSet<&str> =
                pre_images.iter().filter_map(record_id).collect();
            for id in &ids {
                if !found.contains(id.as_str()) {
                    ctx.fail(Error::record_not_found(format!(
                        "record not found: {id}"
                    )));
                }
            }
        }

        ctx.pre_images = pre_images;
        Ok(())
    }
}

/// Coerce stringly-typed input toward the declared property types
pub struct CoerceTypes;

#[async_trait]
impl Observer for CoerceTypes {
    fn name(&self) -> &'static str {
        "coerce_types"
    }

    fn ring(&self) -> Ring {
        Ring::DataPreparation
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create, Operation::Update])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let properties = ctx.schema.definition.parsed_properties()?;
        for record in &mut ctx.records {
            normalize_access_fields(record);
            for (name, prop) in &properties {
                let Some(value) = record.get(name) else {
                    continue;
                };
                let Value::String(raw) = value else { continue };
                let coerced = match prop.prop_type {
                    PropertyType::Integer => raw.parse::<i64>().ok().map(Value::from),
                    PropertyType::Number => raw
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number),
                    PropertyType::Boolean => match raw.as_str() {
                        "true" => Some(Value::Bool(true)),
                        "false" => Some(Value::Bool(false)),
                        _ => None,
                    },
                    _ => None,
                };
                if let Some(coerced) = coerced {
                    record.insert(name.clone(), coerced);
                }
            }
        }
        Ok(())
    }
}

/// Stamp `created_at`/`updated_at` on new records
pub struct StampTimestamps;

#[async_trait]
impl Observer for StampTimestamps {
    fn name(&self) -> &'static str {
        "stamp_timestamps"
    }

    fn ring(&self) -> Ring {
        Ring::DataPreparation
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create])
    }

    fn order(&self) -> i32 {
        10
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for record in &mut ctx.records {
            let missing = |r: &Record, k: &str| matches!(r.get(k), None | Some(Value::Null));
            if missing(record, "created_at") {
                record.insert("created_at".to_string(), Value::String(now.clone()));
            }
            if missing(record, "updated_at") {
                record.insert(
                    "updated_at".to_string(),
                    record
                        .get("created_at")
                        .cloned()
                        .unwrap_or_else(|| Value::String(now.clone())),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_access_fields() {
        let mut record = json!({
            "access_read": "[\"u1\",\"u2\"]",
            "access_edit": ["already"],
            "name": "[\"not touched\"]"
        })
        .as_object()
        .unwrap()
        .clone();

        normalize_access_fields(&mut record);
        assert_eq!(record["access_read"], json!(["u1", "u2"]));
        assert_eq!(record["access_edit"], json!(["already"]));
        assert_eq!(record["name"], json!("[\"not touched\"]"));
    }
}
