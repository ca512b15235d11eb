//! DDL generation
//!
//! Maps a model definition onto CREATE TABLE / ALTER TABLE statements.
//! Every data table starts with the fixed system preamble; user columns
//! follow in definition order. Properties whose name collides with a
//! system field are skipped (the caller logs them) so the stored
//! definition stays untouched while the physical table stays consistent.

use serde_json::Value;
use strata_core::definition::{ModelDefinition, PropertyDef, PropertyType, RelationshipDef};
use strata_core::error::{Error, Result};
use strata_core::types::is_system_field;
use strata_sql::DatabaseKind;

/// SQL type for one property
pub fn sql_type(def: &PropertyDef, kind: DatabaseKind) -> String {
    match def.prop_type {
        PropertyType::String => match (def.format.as_deref(), def.max_length) {
            (Some("uuid"), _) => match kind {
                DatabaseKind::Postgres => "UUID".to_string(),
                DatabaseKind::Sqlite => "TEXT".to_string(),
            },
            (Some("date-time"), _) => match kind {
                DatabaseKind::Postgres => "TIMESTAMPTZ".to_string(),
                DatabaseKind::Sqlite => "TEXT".to_string(),
            },
            (_, Some(n)) if n <= 255 => format!("VARCHAR({n})"),
            _ => "TEXT".to_string(),
        },
        PropertyType::Integer => "INTEGER".to_string(),
        PropertyType::Number => match kind {
            DatabaseKind::Postgres => "DECIMAL".to_string(),
            DatabaseKind::Sqlite => "REAL".to_string(),
        },
        PropertyType::Boolean => "BOOLEAN".to_string(),
        PropertyType::Array | PropertyType::Object => match kind {
            DatabaseKind::Postgres => "JSONB".to_string(),
            DatabaseKind::Sqlite => "TEXT".to_string(),
        },
    }
}

/// Render a JSON default as a DEFAULT literal; single quotes are doubled
fn default_literal(value: &Value, kind: DatabaseKind) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Array(_) | Value::Object(_) => {
            let json = serde_json::to_string(value)?.replace('\'', "''");
            Ok(match kind {
                DatabaseKind::Postgres => format!("'{json}'::jsonb"),
                DatabaseKind::Sqlite => format!("'{json}'"),
            })
        }
    }
}

/// One column definition line
pub fn column_sql(
    name: &str,
    def: &PropertyDef,
    required: bool,
    kind: DatabaseKind,
) -> Result<String> {
    let mut sql = format!(r#""{name}" {}"#, sql_type(def, kind));
    if required {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &def.default {
        sql.push_str(&format!(" DEFAULT {}", default_literal(default, kind)?));
    }
    Ok(sql)
}

/// The fixed column block every data table carries
fn preamble(kind: DatabaseKind) -> &'static str {
    match kind {
        DatabaseKind::Postgres => {
            r#""id" UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "access_read" TEXT[] NOT NULL DEFAULT '{}',
    "access_edit" TEXT[] NOT NULL DEFAULT '{}',
    "access_full" TEXT[] NOT NULL DEFAULT '{}',
    "access_deny" TEXT[] NOT NULL DEFAULT '{}',
    "created_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updated_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "trashed_at" TIMESTAMPTZ,
    "deleted_at" TIMESTAMPTZ"#
        }
        DatabaseKind::Sqlite => {
            r#""id" TEXT PRIMARY KEY,
    "access_read" TEXT NOT NULL DEFAULT '[]',
    "access_edit" TEXT NOT NULL DEFAULT '[]',
    "access_full" TEXT NOT NULL DEFAULT '[]',
    "access_deny" TEXT NOT NULL DEFAULT '[]',
    "created_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    "updated_at" TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    "trashed_at" TEXT,
    "deleted_at" TEXT"#
        }
    }
}

/// A generated CREATE TABLE plus its trailing constraint statements and
/// the property names that were skipped for colliding with system fields
#[derive(Debug)]
pub struct TableDdl {
    pub create: String,
    pub constraints: Vec<String>,
    pub skipped: Vec<String>,
}

/// Generate the CREATE TABLE statement for a model
pub fn create_table(
    table: &str,
    definition: &ModelDefinition,
    kind: DatabaseKind,
) -> Result<TableDdl> {
    let mut columns = vec![preamble(kind).to_string()];
    let mut constraints = Vec::new();
    let mut skipped = Vec::new();

    for (name, prop) in definition.parsed_properties()? {
        if is_system_field(&name) {
            skipped.push(name);
            continue;
        }
        columns.push(format!(
            "    {}",
            column_sql(&name, &prop, definition.is_required(&name), kind)?
        ));
        if let Some(rel) = &prop.relationship {
            if let Some(sql) = foreign_key(table, &name, rel, kind) {
                constraints.push(sql);
            }
        }
    }

    let create = format!(
        "CREATE TABLE \"{table}\" (\n    {}\n)",
        columns.join(",\n")
    );
    Ok(TableDdl {
        create,
        constraints,
        skipped,
    })
}

/// FK constraint for an `x-relationship` property. SQLite cannot add
/// constraints after table creation, so relationship metadata is
/// registry-only there.
fn foreign_key(
    table: &str,
    column: &str,
    rel: &RelationshipDef,
    kind: DatabaseKind,
) -> Option<String> {
    if kind == DatabaseKind::Sqlite {
        return None;
    }
    let on_delete = if rel.cascade_delete {
        "CASCADE"
    } else {
        "RESTRICT"
    };
    Some(format!(
        "ALTER TABLE \"{table}\" ADD CONSTRAINT \"fk_{table}_{column}\" \
         FOREIGN KEY (\"{column}\") REFERENCES \"{}\" (\"{}\") ON DELETE {on_delete}",
        rel.schema,
        rel.related_column(),
    ))
}

/// ALTER statements to evolve a live table from `old` to `new`:
/// added properties become ADD COLUMN, removed ones DROP COLUMN.
/// Type changes on surviving columns are not supported in this revision.
pub fn alter_table(
    table: &str,
    old: &ModelDefinition,
    new: &ModelDefinition,
    kind: DatabaseKind,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();

    for (name, prop) in new.parsed_properties()? {
        if is_system_field(&name) || old.properties.contains_key(&name) {
            continue;
        }
        // Added columns on a live table cannot be NOT NULL without a
        // default; requiredness is still enforced at validation time
        let required = new.is_required(&name) && prop.default.is_some();
        statements.push(format!(
            "ALTER TABLE \"{table}\" ADD COLUMN {}",
            column_sql(&name, &prop, required, kind)?
        ));
    }

    for name in old.properties.keys() {
        if is_system_field(name) || new.properties.contains_key(name) {
            continue;
        }
        statements.push(format!("ALTER TABLE \"{table}\" DROP COLUMN \"{name}\""));
    }

    Ok(statements)
}

/// Reject names the identifier rule or reserved words make unusable as a
/// table name
pub fn ensure_table_name(name: &str) -> Result<()> {
    strata_core::types::ensure_identifier(name, "table name")?;
    if name.eq_ignore_ascii_case("select") || name.eq_ignore_ascii_case("table") {
        return Err(Error::bad_request(
            "INVALID_IDENTIFIER",
            format!("reserved table name: {name:?}"),
        ));
    }
    Ok(())
}
