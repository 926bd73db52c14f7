use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::models::{
    CloseSessionResponse, OpenSessionRequest, OpenSessionResponse, SessionStudentsResponse,
};
use crate::security::CallerIdentity;
use crate::services::{AttendanceService, CloseOutcome};
use crate::store::SessionMeta;
use crate::utils::error::ApiError;

pub async fn open_session_handler(
    Extension(service): Extension<Arc<AttendanceService>>,
    caller: CallerIdentity,
    Json(request): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<OpenSessionResponse>), ApiError> {
    info!(
        "Open session request: caller={}, subject={}, group={}",
        caller.0, request.subject_name, request.group_name
    );

    let meta: SessionMeta = request.into();
    let opened = service
        .open_session(meta.clone())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(OpenSessionResponse {
            session_id: opened.session_id,
            current_token: opened.first_token,
            opened_at: opened.opened_at,
            meta,
        }),
    ))
}

pub async fn close_session_handler(
    Extension(service): Extension<Arc<AttendanceService>>,
    caller: CallerIdentity,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<CloseSessionResponse>), ApiError> {
    info!("Close session request: caller={}, session={}", caller.0, session_id);

    match service.close_session(&session_id) {
        CloseOutcome::NotFound => Err(ApiError::NotFound(format!(
            "Attendance session {} not found",
            session_id
        ))),
        result @ CloseOutcome::AlreadyClosed => Ok((
            StatusCode::CONFLICT,
            Json(CloseSessionResponse { session_id, result }),
        )),
        result @ CloseOutcome::Closed => Ok((
            StatusCode::OK,
            Json(CloseSessionResponse { session_id, result }),
        )),
    }
}

pub async fn session_students_handler(
    Extension(service): Extension<Arc<AttendanceService>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStudentsResponse>, ApiError> {
    let students = service.checked_in(&session_id).ok_or_else(|| {
        ApiError::NotFound(format!("Attendance session {} not found", session_id))
    })?;

    Ok(Json(SessionStudentsResponse {
        session_id,
        students,
    }))
}
