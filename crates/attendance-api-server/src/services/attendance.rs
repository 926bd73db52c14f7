use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::RosterDirectory;
use crate::pubsub::{SessionEvent, TokenBus};
use crate::scheduler::generate_token;
use crate::store::{SessionMeta, SessionStore, StoreError};

/// Every way a scan can come out. Handlers map these onto status codes;
/// nothing in the decision ladder is a thrown error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanOutcome {
    Recorded,
    AlreadyRecorded,
    TokenMismatch,
    SessionClosed,
    SessionNotFound,
    IdentityNotFound,
}

impl ScanOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ScanOutcome::Recorded => "Attendance recorded",
            ScanOutcome::AlreadyRecorded => "Attendance was already recorded for this session",
            ScanOutcome::TokenMismatch => {
                "The code is invalid or expired, scan the one currently on screen"
            }
            ScanOutcome::SessionClosed => "The attendance session is closed",
            ScanOutcome::SessionNotFound => "Attendance session not found",
            ScanOutcome::IdentityNotFound => "No student record matches this caller",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
    NotFound,
}

#[derive(Debug)]
pub struct OpenedSession {
    pub session_id: String,
    pub first_token: String,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

/// Session lifecycle entry points and the scan-validation decision.
///
/// Owns no state of its own: all mutation goes through the store, all
/// fan-out through the bus, and the roster is someone else's data.
pub struct AttendanceService {
    store: Arc<SessionStore>,
    bus: Arc<TokenBus>,
    roster: Arc<dyn RosterDirectory>,
    token_bytes: usize,
}

impl AttendanceService {
    pub fn new(
        store: Arc<SessionStore>,
        bus: Arc<TokenBus>,
        roster: Arc<dyn RosterDirectory>,
        token_bytes: usize,
    ) -> Self {
        Self {
            store,
            bus,
            roster,
            token_bytes,
        }
    }

    /// Create a session with its first token so the display has
    /// something to show before the first rotation tick.
    pub fn open_session(&self, meta: SessionMeta) -> Result<OpenedSession, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        let first_token = generate_token(self.token_bytes);

        if let Err(e) = self.store.create(&session_id, meta, &first_token) {
            // A v4 collision should never happen; if it does, something
            // is deeply wrong with this process.
            error!("Session id collision on create: {}", e);
            return Err(e);
        }

        let opened_at = self
            .store
            .snapshot(&session_id)
            .map(|s| s.opened_at)
            .unwrap_or_else(chrono::Utc::now);

        info!("Opened attendance session {}", session_id);
        Ok(OpenedSession {
            session_id,
            first_token,
            opened_at,
        })
    }

    /// Stop rotation and scans for a session. Repeat closes are
    /// surfaced distinctly, they usually mean a retrying client.
    pub fn close_session(&self, session_id: &str) -> CloseOutcome {
        match self.store.close(session_id) {
            None => CloseOutcome::NotFound,
            Some(false) => CloseOutcome::AlreadyClosed,
            Some(true) => {
                self.bus.publish(session_id, SessionEvent::Closed);
                self.bus.remove(session_id);
                info!("Closed attendance session {}", session_id);
                CloseOutcome::Closed
            }
        }
    }

    /// The scan decision ladder, one result per branch. The session
    /// snapshot pins the token the scan is judged against; a rotation
    /// landing a moment later simply wins the race.
    pub async fn verify_scan(
        &self,
        session_id: &str,
        submitted_token: &str,
        caller_id: &str,
    ) -> Result<ScanOutcome> {
        let Some(session) = self.store.snapshot(session_id) else {
            return Ok(ScanOutcome::SessionNotFound);
        };
        if !session.active {
            return Ok(ScanOutcome::SessionClosed);
        }
        if submitted_token != session.current_token {
            return Ok(ScanOutcome::TokenMismatch);
        }

        let Some(student_id) = self.roster.resolve_identity(caller_id).await? else {
            return Ok(ScanOutcome::IdentityNotFound);
        };

        match self.store.add_member(session_id, &student_id) {
            Some(true) => {
                info!("Recorded student {} in session {}", student_id, session_id);
                Ok(ScanOutcome::Recorded)
            }
            Some(false) => Ok(ScanOutcome::AlreadyRecorded),
            // The session vanished between snapshot and write; report it
            // the same way a stale session id is reported.
            None => Ok(ScanOutcome::SessionNotFound),
        }
    }

    /// Checked-in students in scan order, open or closed session alike.
    pub fn checked_in(&self, session_id: &str) -> Option<Vec<String>> {
        self.store.members(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::roster::MockRosterDirectory;
    use crate::scheduler::TokenRotator;
    use std::time::Duration;

    fn meta() -> SessionMeta {
        SessionMeta {
            subject_name: "Databases".to_string(),
            group_name: "CS-31".to_string(),
            subject_type: "lecture".to_string(),
            date: "2025-09-10".to_string(),
            lesson_start_time: "09:45".to_string(),
        }
    }

    /// Roster that knows callers of the form "max-<n>", resolving them
    /// to record-book number "<n>".
    fn roster() -> Arc<dyn RosterDirectory> {
        let mut mock = MockRosterDirectory::new();
        mock.expect_resolve_identity().returning(|external_id| {
            Ok(external_id
                .strip_prefix("max-")
                .map(|n| n.to_string()))
        });
        Arc::new(mock)
    }

    fn service() -> (Arc<SessionStore>, Arc<TokenBus>, AttendanceService) {
        let store = Arc::new(SessionStore::new());
        let bus = Arc::new(TokenBus::new(8));
        let service = AttendanceService::new(store.clone(), bus.clone(), roster(), 16);
        (store, bus, service)
    }

    #[tokio::test]
    async fn open_then_immediate_scan_records() {
        let (_store, _bus, service) = service();
        let opened = service.open_session(meta()).unwrap();

        let outcome = service
            .verify_scan(&opened.session_id, &opened.first_token, "max-42")
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::Recorded);
        assert_eq!(service.checked_in(&opened.session_id).unwrap(), vec!["42"]);
    }

    #[tokio::test]
    async fn stale_token_is_rejected_current_token_accepted() {
        let (store, bus, service) = service();
        let opened = service.open_session(meta()).unwrap();
        let t0 = opened.first_token.clone();

        // One scheduler pass: T0 -> T1.
        TokenRotator::new(store.clone(), bus, Duration::from_secs(10), 16).tick();
        let t1 = store.current_token(&opened.session_id).unwrap();
        assert_ne!(t0, t1);

        let stale = service
            .verify_scan(&opened.session_id, &t0, "max-43")
            .await
            .unwrap();
        assert_eq!(stale, ScanOutcome::TokenMismatch);

        let fresh = service
            .verify_scan(&opened.session_id, &t1, "max-43")
            .await
            .unwrap();
        assert_eq!(fresh, ScanOutcome::Recorded);
    }

    #[tokio::test]
    async fn repeat_scan_is_idempotent() {
        let (_store, _bus, service) = service();
        let opened = service.open_session(meta()).unwrap();

        let first = service
            .verify_scan(&opened.session_id, &opened.first_token, "max-42")
            .await
            .unwrap();
        let second = service
            .verify_scan(&opened.session_id, &opened.first_token, "max-42")
            .await
            .unwrap();

        assert_eq!(first, ScanOutcome::Recorded);
        assert_eq!(second, ScanOutcome::AlreadyRecorded);
        assert_eq!(service.checked_in(&opened.session_id).unwrap(), vec!["42"]);
    }

    #[tokio::test]
    async fn roster_keeps_scan_order() {
        let (_store, _bus, service) = service();
        let opened = service.open_session(meta()).unwrap();

        for caller in ["max-42", "max-43"] {
            service
                .verify_scan(&opened.session_id, &opened.first_token, caller)
                .await
                .unwrap();
        }

        assert_eq!(
            service.checked_in(&opened.session_id).unwrap(),
            vec!["42", "43"]
        );
    }

    #[tokio::test]
    async fn closed_session_rejects_even_the_last_active_token() {
        let (store, _bus, service) = service();
        let opened = service.open_session(meta()).unwrap();
        let last_token = store.current_token(&opened.session_id).unwrap();

        assert_eq!(service.close_session(&opened.session_id), CloseOutcome::Closed);

        let outcome = service
            .verify_scan(&opened.session_id, &last_token, "max-44")
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::SessionClosed);

        // Roster stays readable after close.
        assert!(service.checked_in(&opened.session_id).is_some());
    }

    #[tokio::test]
    async fn second_close_is_reported_not_swallowed() {
        let (_store, _bus, service) = service();
        let opened = service.open_session(meta()).unwrap();

        assert_eq!(service.close_session(&opened.session_id), CloseOutcome::Closed);
        assert_eq!(
            service.close_session(&opened.session_id),
            CloseOutcome::AlreadyClosed
        );
        assert_eq!(service.close_session("no-such-session"), CloseOutcome::NotFound);
    }

    #[tokio::test]
    async fn unknown_session_and_unknown_identity() {
        let (_store, _bus, service) = service();

        let outcome = service
            .verify_scan("no-such-session", "anything", "max-1")
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::SessionNotFound);

        let opened = service.open_session(meta()).unwrap();
        let outcome = service
            .verify_scan(&opened.session_id, &opened.first_token, "stranger")
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::IdentityNotFound);
        // Nothing was recorded on the failed resolution.
        assert!(service.checked_in(&opened.session_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_notifies_display_subscribers() {
        let (_store, bus, service) = service();
        let opened = service.open_session(meta()).unwrap();
        let mut rx = bus.subscribe(&opened.session_id);

        service.close_session(&opened.session_id);

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Closed);
        // Channel is torn down with the session.
        assert_eq!(bus.channel_count(), 0);
    }
}
