use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::middleware::with_request_ids;

pub mod recommendations;
pub mod state;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/recommendations", post(recommendations::recommend))
        .route("/recommendations/", post(recommendations::recommend))
        .with_state(state);
    with_request_ids(router).layer(CorsLayer::permissive())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message":
            "Welcome to the playlist recommender API. POST a playlist_id to /recommendations/."
    }))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
