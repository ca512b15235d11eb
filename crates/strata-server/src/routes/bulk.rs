//! Bulk route

use crate::auth::AuthPrincipal;
use crate::error::{ok, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use strata_db::BulkRequest;

/// `POST /api/bulk` — mixed operations, one transaction
pub async fn execute(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(requests): Json<Vec<BulkRequest>>,
) -> ApiResult<Json<Value>> {
    let db = state.database(&principal).await?;
    Ok(ok(db.bulk(requests).await?))
}
