//! Aggregation statement assembly
//!
//! Accepts `{aggregate: {<alias>: {$count|$sum|$avg|$min|$max: <field-or-*>}},
//! where?, groupBy?}` and compiles it into a single SELECT. Aliases, group
//! fields, and aggregated fields all pass the identifier rule; the WHERE
//! predicate rides through the filter compiler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_core::error::{Error, Result};
use strata_core::model::Model;
use strata_core::types::ensure_identifier;
use strata_filter::{compile, Filter, FilterOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateBody {
    pub aggregate: Map<String, Value>,

    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Value>,

    #[serde(rename = "groupBy", skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Value>,
}

impl AggregateBody {
    /// Parse an aggregation body. Callers that pass a filter-shaped
    /// document (`{aggregate, filter: {where: …}}`) are folded into the
    /// canonical `{aggregate, where, groupBy}` shape.
    pub fn from_value(mut value: Value) -> Result<Self> {
        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("where") {
                if let Some(mut filter) = obj.remove("filter") {
                    if let Some(where_doc) = filter.get_mut("where") {
                        obj.insert("where".to_string(), where_doc.take());
                    }
                }
            }
        }
        serde_json::from_value(value)
            .map_err(|e| Error::bad_request("INVALID_AGGREGATE", e.to_string()))
    }

    fn group_fields(&self) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        match &self.group_by {
            None => {}
            Some(Value::String(s)) => fields.push(s.clone()),
            Some(Value::Array(items)) => {
                for item in items {
                    match item.as_str() {
                        Some(s) => fields.push(s.to_string()),
                        None => {
                            return Err(Error::bad_request(
                                "INVALID_AGGREGATE",
                                "groupBy entries must be strings",
                            ))
                        }
                    }
                }
            }
            Some(other) => {
                return Err(Error::bad_request(
                    "INVALID_AGGREGATE",
                    format!("groupBy must be a string or array, got {other}"),
                ))
            }
        }
        for field in &fields {
            ensure_identifier(field, "groupBy field")?;
        }
        Ok(fields)
    }
}

fn aggregate_expr(alias: &str, spec: &Value) -> Result<String> {
    ensure_identifier(alias, "aggregate alias")?;
    let ops = spec.as_object().filter(|m| m.len() == 1).ok_or_else(|| {
        Error::bad_request(
            "INVALID_AGGREGATE",
            format!("aggregate {alias:?} must be a single-operator object"),
        )
    })?;
    let (op, arg) = ops.iter().next().expect("len checked");
    let field = arg.as_str().ok_or_else(|| {
        Error::bad_request(
            "INVALID_AGGREGATE",
            format!("aggregate {alias:?} takes a field name or \"*\""),
        )
    })?;

    let sql_fn = match op.as_str() {
        "$count" => "COUNT",
        "$sum" => "SUM",
        "$avg" => "AVG",
        "$min" => "MIN",
        "$max" => "MAX",
        other => {
            return Err(Error::unprocessable(
                "FILTER_UNSUPPORTED_OPERATOR",
                format!("unsupported aggregate operator: {other}"),
            ))
        }
    };

    let target = if field == "*" {
        if sql_fn != "COUNT" {
            return Err(Error::bad_request(
                "INVALID_AGGREGATE",
                format!("{op} requires a field name"),
            ));
        }
        "*".to_string()
    } else {
        ensure_identifier(field, "aggregate field")?;
        format!(r#""{field}""#)
    };

    Ok(format!(r#"{sql_fn}({target}) AS "{alias}""#))
}

/// Assemble the aggregation SELECT
pub fn build_aggregate(model: &Model, body: &AggregateBody) -> Result<(String, Vec<Value>)> {
    if body.aggregate.is_empty() {
        return Err(Error::bad_request(
            "INVALID_AGGREGATE",
            "aggregate requires at least one aggregation",
        ));
    }

    let groups = body.group_fields()?;
    let mut select_list: Vec<String> = groups.iter().map(|g| format!(r#""{g}""#)).collect();
    for (alias, spec) in &body.aggregate {
        select_list.push(aggregate_expr(alias, spec)?);
    }

    let filter = Filter {
        r#where: body.r#where.clone(),
        ..Default::default()
    };
    let compiled = compile(&filter, &FilterOptions::default())?;

    let mut sql = format!(
        r#"SELECT {} FROM "{}"{}"#,
        select_list.join(", "),
        model.table_name,
        compiled.where_sql()
    );
    if !groups.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(
            &groups
                .iter()
                .map(|g| format!(r#""{g}""#))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    Ok((sql, compiled.params))
}
