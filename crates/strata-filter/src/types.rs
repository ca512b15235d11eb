//! Filter document types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::error::{Error, Result};
use strata_core::types::ensure_identifier;

/// A declarative filter document:
///
/// ```json
/// {
///   "select": ["name", "email"],
///   "where": {"age": {"$gte": 18}, "status": "active"},
///   "order": [{"name": "asc"}],
///   "limit": 10,
///   "offset": 0
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Column projection; `"*"` or absent selects everything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,

    /// Condition tree; see the operator catalog in [`crate::compile`]
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Value>,

    /// `"field"`, `"field desc"`, or `[{"field": "asc"}, …]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl Filter {
    /// Parse a filter out of a raw JSON document
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::bad_request("FILTER_INVALID_DOCUMENT", e.to_string()))
    }

    /// Shorthand for `{where: …}`
    pub fn where_clause(condition: Value) -> Self {
        Self {
            r#where: Some(condition),
            ..Default::default()
        }
    }

    /// Shorthand for `{where: {id: id}}`
    pub fn by_id(id: &str) -> Self {
        Self::where_clause(serde_json::json!({ "id": id }))
    }

    /// Shorthand for `{where: {id: {"$in": ids}}}`
    pub fn by_ids(ids: &[String]) -> Self {
        Self::where_clause(serde_json::json!({ "id": { "$in": ids } }))
    }

    /// The validated projection list, or `None` for select-all. Every
    /// projected name must satisfy the identifier rule.
    pub fn select_list(&self) -> Result<Option<Vec<String>>> {
        match &self.select {
            None => Ok(None),
            Some(Value::String(s)) if s == "*" => Ok(None),
            Some(Value::Array(items)) => {
                let mut fields = Vec::with_capacity(items.len());
                for item in items {
                    let name = item.as_str().ok_or_else(|| {
                        Error::bad_request(
                            "FILTER_INVALID_SELECT",
                            "select entries must be strings",
                        )
                    })?;
                    ensure_identifier(name, "select field")?;
                    fields.push(name.to_string());
                }
                Ok(Some(fields))
            }
            Some(other) => Err(Error::bad_request(
                "FILTER_INVALID_SELECT",
                format!("select must be \"*\" or an array of fields, got {other}"),
            )),
        }
    }
}

/// Compiler options; `starting_param_index` offsets the emitted `$n`
/// placeholders so the clause can follow preceding `UPDATE … SET` params.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    pub starting_param_index: usize,
    pub include_trashed: bool,
    pub include_deleted: bool,
}

impl FilterOptions {
    pub fn starting_at(index: usize) -> Self {
        Self {
            starting_param_index: index,
            ..Default::default()
        }
    }

    pub fn include_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// Output of [`crate::compile`]: a parameterized WHERE body plus the
/// trailing clauses. `where_clause` never contains a value from the filter
/// document; everything rides in `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub where_clause: String,
    pub params: Vec<Value>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl CompiledFilter {
    /// Render the `WHERE …` fragment, empty when no predicate applies
    pub fn where_sql(&self) -> String {
        if self.where_clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.where_clause)
        }
    }

    /// Render `ORDER BY/LIMIT/OFFSET`, each omitted when unset
    pub fn tail_sql(&self) -> String {
        let mut sql = String::new();
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}
