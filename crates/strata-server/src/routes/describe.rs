//! Model definition routes

use crate::auth::AuthPrincipal;
use crate::error::{ok, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

/// `POST /api/describe/:model` — register a model
pub async fn create(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let created = db
        .system()
        .metabase
        .create_one(&principal, &model, body)
        .await?;
    Ok(ok(created))
}

/// `GET /api/describe/:model` — the stored JSON Schema
pub async fn get(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let found = db.system().metabase.select_one(&model).await?;
    Ok(ok(&found.definition))
}

/// `PUT /api/describe/:model` — evolve a model
pub async fn update(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    let updated = db
        .system()
        .metabase
        .update_one(&principal, &model, body)
        .await?;
    Ok(ok(updated))
}

/// `DELETE /api/describe/:model` — soft-delete a model
pub async fn remove(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(model): Path<String>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    db.system().metabase.delete_one(&principal, &model).await?;
    Ok(ok(serde_json::json!({ "name": model })))
}
