use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::info;

pub async fn not_found() -> impl IntoResponse {
    info!("router: not_found handler invoked");
    (StatusCode::NOT_FOUND, "NOT_FOUND").into_response()
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}

/// Unversioned liveness endpoint.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "OK" }))).into_response()
}
