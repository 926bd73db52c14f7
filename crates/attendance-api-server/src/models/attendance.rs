use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::{CloseOutcome, ScanOutcome};
use crate::store::SessionMeta;

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub subject_name: String,
    pub group_name: String,
    pub subject_type: String,
    pub date: String,
    pub lesson_start_time: String,
}

impl From<OpenSessionRequest> for SessionMeta {
    fn from(req: OpenSessionRequest) -> Self {
        SessionMeta {
            subject_name: req.subject_name,
            group_name: req.group_name,
            subject_type: req.subject_type,
            date: req.date,
            lesson_start_time: req.lesson_start_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub session_id: String,
    pub token: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub current_token: String,
    pub opened_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SessionMeta,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub result: CloseOutcome,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub session_id: String,
    pub result: ScanOutcome,
    /// Human-readable counterpart of `result`, specific enough that a
    /// student knows whether to rescan the screen.
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStudentsResponse {
    pub session_id: String,
    /// Record-book numbers in scan order.
    pub students: Vec<String>,
}

// ===== DISPLAY STREAM MESSAGES =====

/// JSON frames pushed to a classroom display over the WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayMessage {
    Token { token: String },
    Closed,
    Error { message: String },
}
