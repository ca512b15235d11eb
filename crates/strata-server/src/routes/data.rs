//! Record routes
//!
//! Each handler calls a single Database method and wraps the result in
//! the canonical envelope.

use crate::auth::AuthPrincipal;
use crate::error::{ok, ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use strata_core::error::Error;
use strata_core::record::Record;
use strata_core::types::ensure_identifier;
use strata_filter::Filter;
use strata_observer::AccessChange;

fn as_record(value: Value) -> Result<Record, ApiError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError(Error::bad_request("INVALID_BODY", "expected a JSON object")))
}

/// `POST /api/data/:model` — create one record or a batch
pub async fn create(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    match body {
        Value::Array(items) => {
            let records = items
                .into_iter()
                .map(as_record)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ok(db.create_all(&model, records).await?))
        }
        other => Ok(ok(db.create_one(&model, as_record(other)?).await?)),
    }
}

/// `POST /api/data/:model/:id` — create one record with the given id
pub async fn create_at(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let mut rows = db
        .create_ids(&model, &[id], as_record(body)?)
        .await?;
    let record = rows
        .pop()
        .ok_or_else(|| Error::internal("create produced no record"))?;
    Ok(ok(record))
}

/// Body for filter-scoped creation
#[derive(Debug, Deserialize)]
pub struct CreateMatching {
    #[serde(default, rename = "where")]
    pub r#where: Option<Value>,
    pub data: Value,
}

/// `POST /api/create/:model` — create with ids resolved from a filter;
/// `?strict=true` turns an empty resolution into `RECORD_NOT_FOUND`
pub async fn create_matching(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<CreateMatching>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let filter = match body.r#where {
        Some(where_doc) => Filter::where_clause(where_doc),
        None => Filter::default(),
    };
    let record = as_record(body.data)?;
    let strict = params
        .get("strict")
        .map(|v| v.as_str() == "true" || v.is_empty())
        .unwrap_or(false);
    let rows = if strict {
        db.create_404(&model, &filter, record, None).await?
    } else {
        db.create_any(&model, &filter, record).await?
    };
    Ok(ok(rows))
}

/// `GET /api/data/:model` — list live records
pub async fn list(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    Ok(ok(db.select_any(&model, &Filter::default()).await?))
}

/// `POST /api/find/:model` — select with a filter document
pub async fn find(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let filter = Filter::from_value(body)?;
    Ok(ok(db.select_any(&model, &filter).await?))
}

/// `GET /api/data/:model/:id`
pub async fn get_one(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let record = db.select_404(&model, &Filter::by_id(&id), None).await?;
    Ok(ok(record))
}

/// `PUT /api/data/:model/:id` — update one record
pub async fn update_one(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let record = db
        .update_one(&model, &id, as_record(body)?)
        .await?
        .ok_or_else(|| Error::record_not_found(format!("record not found: {id}")))?;
    Ok(ok(record))
}

/// `PUT /api/data/:model/:id/:field` — path-addressed field overwrite
pub async fn store_field(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id, field)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    ensure_identifier(&field, "field name")?;
    let db = state.database(&principal).await?;
    let mut changes = Record::new();
    changes.insert(field, body);
    let record = db
        .update_one(&model, &id, changes)
        .await?
        .ok_or_else(|| Error::record_not_found(format!("record not found: {id}")))?;
    Ok(ok(record))
}

/// `DELETE /api/data/:model/:id` — soft delete, or expire with
/// `?permanent=true`
pub async fn delete_one(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let permanent = params
        .get("permanent")
        .map(|v| v.as_str() == "true" || v.is_empty())
        .unwrap_or(false);
    let record = if permanent {
        db.expire_one(&model, &id).await?
    } else {
        db.delete_one(&model, &id).await?
    };
    Ok(ok(record))
}

/// `PATCH /api/data/:model/:id/revert`
pub async fn revert_one(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    Ok(ok(db.revert_one(&model, &id).await?))
}

/// `PATCH /api/data/:model/:id/access` — change the access arrays
pub async fn access_one(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((model, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let change = AccessChange::from_value(body)?;
    let record = db
        .access_one(&model, &id, change)
        .await?
        .ok_or_else(|| Error::record_not_found(format!("record not found: {id}")))?;
    Ok(ok(record))
}

/// `POST /api/aggregate/:model`
pub async fn aggregate(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    Ok(ok(db.aggregate(&model, body).await?))
}
