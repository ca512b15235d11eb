//! Route table

use crate::state::AppState;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub mod bulk;
pub mod data;
pub mod describe;

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/describe/:model",
            post(describe::create)
                .get(describe::get)
                .put(describe::update)
                .delete(describe::remove),
        )
        .route("/api/data/:model", post(data::create).get(data::list))
        .route(
            "/api/data/:model/:id",
            get(data::get_one)
                .post(data::create_at)
                .put(data::update_one)
                .delete(data::delete_one),
        )
        .route("/api/create/:model", post(data::create_matching))
        .route("/api/data/:model/:id/revert", patch(data::revert_one))
        .route("/api/data/:model/:id/access", patch(data::access_one))
        .route("/api/data/:model/:id/:field", put(data::store_field))
        .route("/api/find/:model", post(data::find))
        .route("/api/aggregate/:model", post(data::aggregate))
        .route("/api/bulk", post(bulk::execute))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
