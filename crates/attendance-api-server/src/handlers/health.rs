use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::database::DbPool;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Ready only when the roster database answers.
pub async fn readiness_check(Extension(db_pool): Extension<DbPool>) -> StatusCode {
    match db_pool.ping().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
