//! The `schemas` and `columns` registry tables
//!
//! Row-level plumbing for the registry: bootstrap DDL, statement builders,
//! and the row → `Model` mapping. All writes here run inside whatever
//! transaction the caller holds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use strata_core::definition::{ModelDefinition, PropertyDef, PropertyType};
use strata_core::error::{Error, Result};
use strata_core::model::{ColumnRecord, Model, ModelStatus};
use strata_core::record::Record;
use strata_core::types::is_system_field;
use strata_sql::{DatabaseKind, SqlAdapter};
use uuid::Uuid;

use crate::ddl::sql_type;

const BOOTSTRAP_PG: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "schemas" (
    "id" UUID PRIMARY KEY,
    "name" TEXT NOT NULL UNIQUE,
    "table_name" TEXT NOT NULL,
    "status" TEXT NOT NULL DEFAULT 'pending',
    "definition" JSONB NOT NULL,
    "field_count" INTEGER NOT NULL DEFAULT 0,
    "json_checksum" TEXT,
    "access_read" TEXT[] NOT NULL DEFAULT '{}',
    "access_edit" TEXT[] NOT NULL DEFAULT '{}',
    "access_full" TEXT[] NOT NULL DEFAULT '{}',
    "access_deny" TEXT[] NOT NULL DEFAULT '{}',
    "created_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updated_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "trashed_at" TIMESTAMPTZ,
    "deleted_at" TIMESTAMPTZ
)"#,
    r#"CREATE TABLE IF NOT EXISTS "columns" (
    "id" UUID PRIMARY KEY,
    "schema_name" TEXT NOT NULL,
    "column_name" TEXT NOT NULL,
    "pg_type" TEXT NOT NULL,
    "is_required" BOOLEAN NOT NULL DEFAULT FALSE,
    "default_value" TEXT,
    "minimum" DECIMAL,
    "maximum" DECIMAL,
    "pattern_regex" TEXT,
    "enum_values" TEXT[],
    "is_array" BOOLEAN NOT NULL DEFAULT FALSE,
    "description" TEXT,
    "relationship_type" TEXT,
    "related_schema" TEXT,
    "related_column" TEXT,
    "relationship_name" TEXT,
    "cascade_delete" BOOLEAN NOT NULL DEFAULT FALSE,
    "required_relationship" BOOLEAN NOT NULL DEFAULT FALSE,
    "access_read" TEXT[] NOT NULL DEFAULT '{}',
    "access_edit" TEXT[] NOT NULL DEFAULT '{}',
    "access_full" TEXT[] NOT NULL DEFAULT '{}',
    "access_deny" TEXT[] NOT NULL DEFAULT '{}',
    "created_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updated_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE ("schema_name", "column_name")
)"#,
];

const BOOTSTRAP_SQLITE: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "schemas" (
    "id" TEXT PRIMARY KEY,
    "name" TEXT NOT NULL UNIQUE,
    "table_name" TEXT NOT NULL,
    "status" TEXT NOT NULL DEFAULT 'pending',
    "definition" TEXT NOT NULL,
    "field_count" INTEGER NOT NULL DEFAULT 0,
    "json_checksum" TEXT,
    "access_read" TEXT NOT NULL DEFAULT '[]',
    "access_edit" TEXT NOT NULL DEFAULT '[]',
    "access_full" TEXT NOT NULL DEFAULT '[]',
    "access_deny" TEXT NOT NULL DEFAULT '[]',
    "created_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    "updated_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    "trashed_at" TEXT,
    "deleted_at" TEXT
)"#,
    r#"CREATE TABLE IF NOT EXISTS "columns" (
    "id" TEXT PRIMARY KEY,
    "schema_name" TEXT NOT NULL,
    "column_name" TEXT NOT NULL,
    "pg_type" TEXT NOT NULL,
    "is_required" BOOLEAN NOT NULL DEFAULT FALSE,
    "default_value" TEXT,
    "minimum" REAL,
    "maximum" REAL,
    "pattern_regex" TEXT,
    "enum_values" TEXT,
    "is_array" BOOLEAN NOT NULL DEFAULT FALSE,
    "description" TEXT,
    "relationship_type" TEXT,
    "related_schema" TEXT,
    "related_column" TEXT,
    "relationship_name" TEXT,
    "cascade_delete" BOOLEAN NOT NULL DEFAULT FALSE,
    "required_relationship" BOOLEAN NOT NULL DEFAULT FALSE,
    "access_read" TEXT NOT NULL DEFAULT '[]',
    "access_edit" TEXT NOT NULL DEFAULT '[]',
    "access_full" TEXT NOT NULL DEFAULT '[]',
    "access_deny" TEXT NOT NULL DEFAULT '[]',
    "created_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    "updated_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    UNIQUE ("schema_name", "column_name")
)"#,
];

/// Create the registry tables for a fresh tenant
pub async fn bootstrap(adapter: &mut SqlAdapter) -> Result<()> {
    let statements = match adapter.kind() {
        DatabaseKind::Postgres => BOOTSTRAP_PG,
        DatabaseKind::Sqlite => BOOTSTRAP_SQLITE,
    };
    for statement in statements {
        adapter.query(statement, &[]).await?;
    }
    Ok(())
}

/// Emit a placeholder for a non-null value, a literal NULL otherwise.
/// Nulls are never bound: a text-typed null parameter fails assignment
/// casts on typed PostgreSQL columns.
fn fragment(params: &mut Vec<Value>, value: Value) -> String {
    if value.is_null() {
        "NULL".to_string()
    } else {
        params.push(value);
        format!("${}", params.len())
    }
}

/// Insert the `schemas` row for a newly registered model
pub async fn insert_model(adapter: &mut SqlAdapter, model: &Model) -> Result<()> {
    let definition = serde_json::to_value(&model.definition)?;
    let params = vec![
        Value::String(model.id.to_string()),
        Value::String(model.name.clone()),
        Value::String(model.table_name.clone()),
        Value::String(model.status.as_str().to_string()),
        definition,
        Value::from(model.field_count),
        Value::String(model.checksum.clone()),
        Value::String(model.created_at.to_rfc3339()),
        Value::String(model.updated_at.to_rfc3339()),
    ];
    adapter
        .query(
            r#"INSERT INTO "schemas"
               ("id", "name", "table_name", "status", "definition",
                "field_count", "json_checksum", "created_at", "updated_at")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            &params,
        )
        .await?;
    Ok(())
}

/// Rewrite the definition block of an existing `schemas` row
pub async fn update_model(adapter: &mut SqlAdapter, model: &Model) -> Result<()> {
    let definition = serde_json::to_value(&model.definition)?;
    let params = vec![
        definition,
        Value::from(model.field_count),
        Value::String(model.checksum.clone()),
        Value::String(Utc::now().to_rfc3339()),
        Value::String(model.name.clone()),
    ];
    let result = adapter
        .query(
            r#"UPDATE "schemas"
               SET "definition" = $1, "field_count" = $2,
                   "json_checksum" = $3, "updated_at" = $4
               WHERE "name" = $5 AND "trashed_at" IS NULL"#,
            &params,
        )
        .await?;
    if result.row_count == 0 {
        return Err(Error::schema_not_found(&model.name));
    }
    Ok(())
}

/// Soft-delete a `schemas` row; the data table is left in place
pub async fn trash_model(adapter: &mut SqlAdapter, name: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = adapter
        .query(
            r#"UPDATE "schemas" SET "trashed_at" = $1, "updated_at" = $1
               WHERE "name" = $2 AND "trashed_at" IS NULL"#,
            &[Value::String(now), Value::String(name.to_string())],
        )
        .await?;
    if result.row_count == 0 {
        return Err(Error::schema_not_found(name));
    }
    Ok(())
}

/// Fetch one live `schemas` row by name
pub async fn select_model(adapter: &mut SqlAdapter, name: &str) -> Result<Option<Model>> {
    let result = adapter
        .query(
            r#"SELECT * FROM "schemas"
               WHERE "name" = $1 AND "trashed_at" IS NULL AND "deleted_at" IS NULL"#,
            &[Value::String(name.to_string())],
        )
        .await?;
    match result.rows.first() {
        Some(row) => Ok(Some(model_from_row(row)?)),
        None => Ok(None),
    }
}

/// Build the `columns` registry record for one property
pub fn column_record(
    schema_name: &str,
    column_name: &str,
    prop: &PropertyDef,
    required: bool,
    kind: DatabaseKind,
) -> ColumnRecord {
    let enum_values = prop.enum_values.as_ref().map(|values| {
        values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    });
    let rel = prop.relationship.as_ref();
    ColumnRecord {
        schema_name: schema_name.to_string(),
        column_name: column_name.to_string(),
        pg_type: sql_type(prop, kind),
        is_required: required,
        default_value: prop
            .default
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_default()),
        minimum: prop.minimum,
        maximum: prop.maximum,
        pattern_regex: prop.pattern.clone(),
        enum_values,
        is_array: prop.prop_type == PropertyType::Array,
        description: prop.description.clone(),
        relationship_type: rel.map(|r| r.rel_type),
        related_schema: rel.map(|r| r.schema.clone()),
        related_column: rel.map(|r| r.related_column().to_string()),
        relationship_name: rel.and_then(|r| r.name.clone()),
        cascade_delete: rel.map(|r| r.cascade_delete).unwrap_or(false),
        required_relationship: rel.map(|r| r.required).unwrap_or(false),
    }
}

/// Insert one `columns` row
pub async fn insert_column(adapter: &mut SqlAdapter, column: &ColumnRecord) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let mut params = Vec::new();
    let fragments = [
        fragment(&mut params, Value::String(Uuid::new_v4().to_string())),
        fragment(&mut params, Value::String(column.schema_name.clone())),
        fragment(&mut params, Value::String(column.column_name.clone())),
        fragment(&mut params, Value::String(column.pg_type.clone())),
        fragment(&mut params, Value::Bool(column.is_required)),
        fragment(
            &mut params,
            column
                .default_value
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column.minimum.map(Value::from).unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column.maximum.map(Value::from).unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .pattern_regex
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .enum_values
                .clone()
                .map(|v| Value::Array(v.into_iter().map(Value::String).collect()))
                .unwrap_or(Value::Null),
        ),
        fragment(&mut params, Value::Bool(column.is_array)),
        fragment(
            &mut params,
            column
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .relationship_type
                .map(|r| Value::String(r.as_str().to_string()))
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .related_schema
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .related_column
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(
            &mut params,
            column
                .relationship_name
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        fragment(&mut params, Value::Bool(column.cascade_delete)),
        fragment(&mut params, Value::Bool(column.required_relationship)),
        fragment(&mut params, Value::String(now.clone())),
        fragment(&mut params, Value::String(now)),
    ];

    let sql = format!(
        r#"INSERT INTO "columns"
           ("id", "schema_name", "column_name", "pg_type", "is_required",
            "default_value", "minimum", "maximum", "pattern_regex",
            "enum_values", "is_array", "description", "relationship_type",
            "related_schema", "related_column", "relationship_name",
            "cascade_delete", "required_relationship", "created_at", "updated_at")
           VALUES ({})"#,
        fragments.join(", ")
    );
    adapter.query(&sql, &params).await?;
    Ok(())
}

/// Insert `columns` rows for every non-system property of a model
pub async fn insert_columns(adapter: &mut SqlAdapter, model: &Model) -> Result<()> {
    let kind = adapter.kind();
    for (name, prop) in model.definition.parsed_properties()? {
        if is_system_field(&name) {
            continue;
        }
        let record = column_record(
            &model.name,
            &name,
            &prop,
            model.definition.is_required(&name),
            kind,
        );
        insert_column(adapter, &record).await?;
    }
    Ok(())
}

/// Remove `columns` rows for properties dropped from a model
pub async fn delete_columns(
    adapter: &mut SqlAdapter,
    schema_name: &str,
    names: &[String],
) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    let mut params = vec![Value::String(schema_name.to_string())];
    let placeholders: Vec<String> = names
        .iter()
        .map(|name| {
            params.push(Value::String(name.clone()));
            format!("${}", params.len())
        })
        .collect();
    let sql = format!(
        r#"DELETE FROM "columns" WHERE "schema_name" = $1 AND "column_name" IN ({})"#,
        placeholders.join(", ")
    );
    adapter.query(&sql, &params).await?;
    Ok(())
}

/// Parse a timestamp column decoded as RFC 3339 (PostgreSQL) or
/// `YYYY-MM-DD HH:MM:SS` (SQLite's CURRENT_TIMESTAMP)
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Map a `schemas` row onto a `Model`
pub fn model_from_row(row: &Record) -> Result<Model> {
    let get_str = |field: &str| -> Result<String> {
        row.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::internal(format!("schemas row missing {field}")))
    };

    let definition_value = match row.get("definition") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        // SQLite stores the definition as JSON text
        Some(Value::String(s)) => serde_json::from_str(s)?,
        other => {
            return Err(Error::internal(format!(
                "schemas row has malformed definition: {other:?}"
            )))
        }
    };
    let definition = ModelDefinition::from_value(definition_value)?;

    let id = Uuid::parse_str(&get_str("id")?)
        .map_err(|e| Error::internal(format!("schemas row has malformed id: {e}")))?;
    let status: ModelStatus = get_str("status")?.parse()?;

    Ok(Model {
        id,
        name: get_str("name")?,
        table_name: get_str("table_name")?,
        status,
        field_count: row
            .get("field_count")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32,
        checksum: get_str("json_checksum").unwrap_or_default(),
        definition,
        created_at: row
            .get("created_at")
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get("updated_at")
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now),
        trashed_at: row.get("trashed_at").and_then(parse_timestamp),
        deleted_at: row.get("deleted_at").and_then(parse_timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp(&json!("2026-08-01T12:00:00+00:00")).is_some());
        assert!(parse_timestamp(&json!("2026-08-01 12:00:00")).is_some());
        assert!(parse_timestamp(&json!("not a time")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_column_record_carries_constraints() {
        let prop: PropertyDef = serde_json::from_value(json!({
            "type": "string",
            "pattern": "^[a-z]+$",
            "enum": ["a", "b"],
            "minLength": 1
        }))
        .unwrap();
        let record = column_record("account", "code", &prop, true, DatabaseKind::Postgres);
        assert_eq!(record.pg_type, "TEXT");
        assert!(record.is_required);
        assert_eq!(record.pattern_regex.as_deref(), Some("^[a-z]+$"));
        assert_eq!(record.enum_values.as_ref().unwrap().len(), 2);
        assert!(!record.is_array);
    }

    #[test]
    fn test_fragment_emits_null_literal() {
        let mut params = Vec::new();
        let a = fragment(&mut params, json!("x"));
        let b = fragment(&mut params, Value::Null);
        let c = fragment(&mut params, json!(2));
        assert_eq!(a, "$1");
        assert_eq!(b, "NULL");
        assert_eq!(c, "$2");
        assert_eq!(params.len(), 2);
    }
}
