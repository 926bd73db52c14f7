use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session id already exists: {0}")]
    DuplicateId(String),
}

/// Descriptive lesson metadata, fixed at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub subject_name: String,
    pub group_name: String,
    pub subject_type: String,
    pub date: String,
    pub lesson_start_time: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub meta: SessionMeta,
    pub opened_at: DateTime<Utc>,
    pub active: bool,
    pub current_token: String,
    /// Insertion-ordered, deduplicated on insert.
    pub checked_in: Vec<String>,
}

/// Thread-safe in-memory session storage.
///
/// All mutation goes through entry guards, so a concurrent reader
/// observes either the pre- or post-write state of a session, never a
/// torn one. The scheduler, the scan handlers and any number of display
/// connections share one instance.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create a session with its first token, active from the start.
    /// A duplicate id means the caller's id generator is broken.
    pub fn create(
        &self,
        session_id: &str,
        meta: SessionMeta,
        first_token: &str,
    ) -> Result<(), StoreError> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(session_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Session {
                    meta,
                    opened_at: Utc::now(),
                    active: true,
                    current_token: first_token.to_string(),
                    checked_in: Vec::new(),
                });
                Ok(())
            }
        }
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Consistent point-in-time copy of one session.
    pub fn snapshot(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    pub fn is_active(&self, session_id: &str) -> Option<bool> {
        self.sessions.get(session_id).map(|s| s.active)
    }

    pub fn current_token(&self, session_id: &str) -> Option<String> {
        self.sessions.get(session_id).map(|s| s.current_token.clone())
    }

    /// Replace the current token. Refused once the session is closed,
    /// which keeps the last-active token frozen.
    pub fn rotate_token(&self, session_id: &str, token: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) if session.active => {
                session.current_token = token.to_string();
                true
            }
            _ => false,
        }
    }

    /// Mark a session inactive. Returns the prior active flag so the
    /// caller can tell a first close from a repeat, `None` when the
    /// session is unknown.
    pub fn close(&self, session_id: &str) -> Option<bool> {
        let mut session = self.sessions.get_mut(session_id)?;
        let was_active = session.active;
        session.active = false;
        Some(was_active)
    }

    /// Record a student once. `Some(true)` on first appearance,
    /// `Some(false)` when already recorded, `None` for an unknown session.
    pub fn add_member(&self, session_id: &str, student_id: &str) -> Option<bool> {
        let mut session = self.sessions.get_mut(session_id)?;
        if session.checked_in.iter().any(|s| s == student_id) {
            debug!("Student {} already recorded in session {}", student_id, session_id);
            return Some(false);
        }
        session.checked_in.push(student_id.to_string());
        Some(true)
    }

    /// Checked-in students in the order they scanned.
    pub fn members(&self, session_id: &str) -> Option<Vec<String>> {
        self.sessions.get(session_id).map(|s| s.checked_in.clone())
    }

    /// All session ids, active or not. The rotation tick walks this.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
