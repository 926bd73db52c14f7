use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::models::{ScanRequest, ScanResponse};
use crate::security::CallerIdentity;
use crate::services::{AttendanceService, ScanOutcome};
use crate::utils::error::ApiError;

pub async fn scan_handler(
    Extension(service): Extension<Arc<AttendanceService>>,
    caller: CallerIdentity,
    Json(request): Json<ScanRequest>,
) -> Result<Response, ApiError> {
    let outcome = service
        .verify_scan(&request.session_id, &request.token, &caller.0)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let status = match outcome {
        ScanOutcome::Recorded | ScanOutcome::AlreadyRecorded => StatusCode::OK,
        ScanOutcome::TokenMismatch => StatusCode::FORBIDDEN,
        ScanOutcome::SessionClosed => StatusCode::BAD_REQUEST,
        ScanOutcome::SessionNotFound | ScanOutcome::IdentityNotFound => StatusCode::NOT_FOUND,
    };

    let body = Json(ScanResponse {
        session_id: request.session_id,
        result: outcome,
        message: outcome.message().to_string(),
    });

    Ok((status, body).into_response())
}
