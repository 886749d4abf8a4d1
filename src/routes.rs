// routes.rs
use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{handler::gig::gig_handler, AppState};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .nest("/gigs", gig_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
