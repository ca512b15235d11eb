//! Select statement assembly
//!
//! Non-mutating reads go straight from the filter compiler to the
//! adapter. This module adds the two overlays the compiler does not know
//! about: trashed-only visibility and the ACL read overlay for
//! API-origin callers.

use serde_json::Value;
use strata_core::error::Result;
use strata_core::model::Model;
use strata_core::record::{access_list, Record};
use strata_core::types::{RequestOrigin, TrashedVisibility};
use strata_filter::{compile, CompiledFilter, Filter, FilterOptions};
use strata_sql::DatabaseKind;

/// Read-path options; `System` origin bypasses the ACL overlay
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions {
    pub origin: RequestOrigin,
    pub trashed: TrashedVisibility,
}

impl SelectOptions {
    pub fn system() -> Self {
        Self {
            origin: RequestOrigin::System,
            ..Default::default()
        }
    }

    pub fn with_trashed(mut self, trashed: TrashedVisibility) -> Self {
        self.trashed = trashed;
        self
    }
}

/// A fully assembled SELECT plus a flag for dialects where the ACL
/// overlay could not be expressed in SQL and must run in memory
pub struct SelectStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub needs_memory_acl: bool,
}

fn acl_applies(options: &SelectOptions, sudo: bool) -> bool {
    options.origin == RequestOrigin::Api && !sudo
}

/// PostgreSQL ACL read overlay. Empty access arrays leave a row
/// unrestricted; a deny overlap always hides it. The principal id array
/// rides in a single parameter reused across the overlap tests.
fn pg_acl_overlay(param: String) -> String {
    format!(
        "(COALESCE(array_length(\"access_deny\", 1), 0) = 0 OR NOT (\"access_deny\" && {param})) \
         AND ((COALESCE(array_length(\"access_read\", 1), 0) = 0 \
         AND COALESCE(array_length(\"access_edit\", 1), 0) = 0 \
         AND COALESCE(array_length(\"access_full\", 1), 0) = 0) \
         OR \"access_read\" && {param} OR \"access_edit\" && {param} OR \"access_full\" && {param})"
    )
}

/// Assemble a SELECT over one model
pub fn build_select(
    model: &Model,
    filter: &Filter,
    options: &SelectOptions,
    access_ids: &[String],
    sudo: bool,
    kind: DatabaseKind,
) -> Result<SelectStatement> {
    let columns = match filter.select_list()? {
        Some(fields) => fields
            .iter()
            .map(|f| format!(r#""{f}""#))
            .collect::<Vec<_>>()
            .join(", "),
        None => "*".to_string(),
    };

    let compile_options = FilterOptions {
        starting_param_index: 0,
        include_trashed: options.trashed != TrashedVisibility::Exclude,
        // Expired records are invisible to every standard read
        include_deleted: false,
    };
    let compiled = compile(filter, &compile_options)?;

    let mut where_clause = compiled.where_clause.clone();
    let mut params = compiled.params.clone();

    if options.trashed == TrashedVisibility::Only {
        push_predicate(&mut where_clause, r#""trashed_at" IS NOT NULL"#.to_string());
    }

    let mut needs_memory_acl = false;
    if acl_applies(options, sudo) {
        match kind {
            DatabaseKind::Postgres => {
                params.push(Value::Array(
                    access_ids.iter().cloned().map(Value::String).collect(),
                ));
                let param = format!("${}", params.len());
                push_predicate(&mut where_clause, pg_acl_overlay(param));
            }
            // SQLite stores the access arrays as JSON text; the caller
            // applies the same predicate in memory after the fetch
            DatabaseKind::Sqlite => needs_memory_acl = true,
        }
    }

    let tail = CompiledFilter {
        where_clause: where_clause.clone(),
        params: Vec::new(),
        order_by: compiled.order_by.clone(),
        limit: compiled.limit,
        offset: compiled.offset,
    };
    let where_sql = if where_clause.is_empty() {
        String::new()
    } else {
        format!(" WHERE {where_clause}")
    };
    let sql = format!(
        r#"SELECT {columns} FROM "{}"{}{}"#,
        model.table_name,
        where_sql,
        tail.tail_sql()
    );

    Ok(SelectStatement {
        sql,
        params,
        needs_memory_acl,
    })
}

/// Assemble a COUNT over the same predicate set (no order/limit/offset)
pub fn build_count(
    model: &Model,
    filter: &Filter,
    options: &SelectOptions,
    access_ids: &[String],
    sudo: bool,
    kind: DatabaseKind,
) -> Result<SelectStatement> {
    let statement = build_select(model, filter, options, access_ids, sudo, kind)?;
    // Re-derive without projection or tail clauses
    let compile_options = FilterOptions {
        starting_param_index: 0,
        include_trashed: options.trashed != TrashedVisibility::Exclude,
        include_deleted: false,
    };
    let compiled = compile(filter, &compile_options)?;
    let mut where_clause = compiled.where_clause;
    let mut params = compiled.params;

    if options.trashed == TrashedVisibility::Only {
        push_predicate(&mut where_clause, r#""trashed_at" IS NOT NULL"#.to_string());
    }
    if acl_applies(options, sudo) && kind == DatabaseKind::Postgres {
        params.push(Value::Array(
            access_ids.iter().cloned().map(Value::String).collect(),
        ));
        let param = format!("${}", params.len());
        push_predicate(&mut where_clause, pg_acl_overlay(param));
    }

    let where_sql = if where_clause.is_empty() {
        String::new()
    } else {
        format!(" WHERE {where_clause}")
    };
    Ok(SelectStatement {
        sql: format!(
            r#"SELECT COUNT(*) AS "count" FROM "{}"{}"#,
            model.table_name, where_sql
        ),
        params,
        needs_memory_acl: statement.needs_memory_acl,
    })
}

fn push_predicate(where_clause: &mut String, predicate: String) {
    if where_clause.is_empty() {
        *where_clause = predicate;
    } else {
        where_clause.push_str(" AND ");
        where_clause.push_str(&predicate);
    }
}

/// The in-memory twin of the SQL overlay, used on SQLite
pub fn can_read(record: &Record, principal_ids: &[String]) -> bool {
    let overlaps = |list: Vec<String>| list.iter().any(|id| principal_ids.contains(id));

    let deny = access_list(record, "access_deny");
    if !deny.is_empty() && overlaps(deny) {
        return false;
    }
    let read = access_list(record, "access_read");
    let edit = access_list(record, "access_edit");
    let full = access_list(record, "access_full");
    if read.is_empty() && edit.is_empty() && full.is_empty() {
        return true;
    }
    overlaps(read) || overlaps(edit) || overlaps(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use strata_core::definition::ModelDefinition;
    use strata_core::model::ModelStatus;

    fn model() -> Model {
        let definition = ModelDefinition::from_value(json!({
            "title": "account",
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }))
        .unwrap();
        Model {
            id: uuid::Uuid::new_v4(),
            name: "account".into(),
            table_name: "account".into(),
            status: ModelStatus::Active,
            checksum: Model::checksum_of(&definition),
            field_count: 1,
            definition,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            trashed_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_basic_select_shape() {
        let filter = Filter::from_value(json!({
            "where": {"name": "x"},
            "order": "name",
            "limit": 5
        }))
        .unwrap();
        let statement = build_select(
            &model(),
            &filter,
            &SelectOptions::system(),
            &[],
            false,
            DatabaseKind::Postgres,
        )
        .unwrap();

        assert!(statement.sql.starts_with(r#"SELECT * FROM "account" WHERE"#));
        assert!(statement.sql.contains(r#""trashed_at" IS NULL"#));
        assert!(statement.sql.ends_with(r#"ORDER BY "name" ASC LIMIT 5"#));
        assert_eq!(statement.params, vec![json!("x")]);
        assert!(!statement.needs_memory_acl);
    }

    #[test]
    fn test_projection_is_quoted() {
        let filter = Filter::from_value(json!({"select": ["name", "id"]})).unwrap();
        let statement = build_select(
            &model(),
            &filter,
            &SelectOptions::system(),
            &[],
            false,
            DatabaseKind::Postgres,
        )
        .unwrap();
        assert!(statement.sql.starts_with(r#"SELECT "name", "id" FROM"#));
    }

    #[test]
    fn test_api_origin_adds_pg_acl_overlay() {
        let filter = Filter::default();
        let statement = build_select(
            &model(),
            &filter,
            &SelectOptions::default(),
            &["u1".into()],
            false,
            DatabaseKind::Postgres,
        )
        .unwrap();
        assert!(statement.sql.contains("access_deny"));
        assert!(statement.sql.contains("&&"));
        assert_eq!(statement.params.len(), 1);
        assert_eq!(statement.params[0], json!(["u1"]));
    }

    #[test]
    fn test_sudo_bypasses_overlay() {
        let statement = build_select(
            &model(),
            &Filter::default(),
            &SelectOptions::default(),
            &["u1".into()],
            true,
            DatabaseKind::Postgres,
        )
        .unwrap();
        assert!(!statement.sql.contains("access_deny"));
    }

    #[test]
    fn test_sqlite_api_origin_defers_to_memory() {
        let statement = build_select(
            &model(),
            &Filter::default(),
            &SelectOptions::default(),
            &["u1".into()],
            false,
            DatabaseKind::Sqlite,
        )
        .unwrap();
        assert!(statement.needs_memory_acl);
        assert!(!statement.sql.contains("&&"));
    }

    #[test]
    fn test_trashed_only_inverts_predicate() {
        let statement = build_select(
            &model(),
            &Filter::default(),
            &SelectOptions::system().with_trashed(TrashedVisibility::Only),
            &[],
            false,
            DatabaseKind::Postgres,
        )
        .unwrap();
        assert!(statement.sql.contains(r#""trashed_at" IS NOT NULL"#));
        assert!(!statement.sql.contains(r#""trashed_at" IS NULL"#));
        // Expired rows stay invisible even in trashed-only mode
        assert!(statement.sql.contains(r#""deleted_at" IS NULL"#));
    }

    #[test]
    fn test_can_read_mirror() {
        let open = json!({"id": "a"}).as_object().unwrap().clone();
        assert!(can_read(&open, &["u1".into()]));

        let denied = json!({"id": "a", "access_deny": ["u1"]})
            .as_object()
            .unwrap()
            .clone();
        assert!(!can_read(&denied, &["u1".into()]));

        let restricted = json!({"id": "a", "access_read": ["u2"]})
            .as_object()
            .unwrap()
            .clone();
        assert!(!can_read(&restricted, &["u1".into()]));
        assert!(can_read(&restricted, &["u2".into()]));
    }
}
