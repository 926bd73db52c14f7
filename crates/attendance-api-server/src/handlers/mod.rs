pub mod display;
pub mod health;
pub mod scan;
pub mod sessions;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::Extension,
        http::{Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    use crate::config::{AttendanceConfig, DatabaseConfig, ServerConfig, Settings};
    use crate::database::roster::MockRosterDirectory;
    use crate::database::RosterDirectory;
    use crate::pubsub::TokenBus;
    use crate::services::AttendanceService;
    use crate::store::SessionStore;

    fn test_router() -> Router {
        let store = Arc::new(SessionStore::new());
        let bus = Arc::new(TokenBus::new(8));

        let mut mock = MockRosterDirectory::new();
        mock.expect_resolve_identity().returning(|external_id| {
            Ok(external_id.strip_prefix("max-").map(|n| n.to_string()))
        });
        let roster: Arc<dyn RosterDirectory> = Arc::new(mock);

        let service = Arc::new(AttendanceService::new(
            store.clone(),
            bus.clone(),
            roster,
            16,
        ));

        let settings = Arc::new(Settings {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: String::new(),
                pool_max_size: 1,
                pool_timeout_seconds: 1,
            },
            attendance: AttendanceConfig::default(),
        });

        Router::new()
            .route("/api/qr/sessions", post(super::sessions::open_session_handler))
            .route(
                "/api/qr/sessions/{session_id}/close",
                post(super::sessions::close_session_handler),
            )
            .route(
                "/api/qr/sessions/{session_id}/students",
                get(super::sessions::session_students_handler),
            )
            .route("/api/qr/scan", post(super::scan::scan_handler))
            .layer(Extension(service))
            .layer(Extension(store))
            .layer(Extension(bus))
            .layer(Extension(settings))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, caller: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header("X-Caller-Id", caller);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn open_session(router: &Router) -> (String, String) {
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/sessions",
                Some("max-teacher"),
                json!({
                    "subject_name": "Databases",
                    "group_name": "CS-31",
                    "subject_type": "lecture",
                    "date": "2025-09-10",
                    "lesson_start_time": "09:45"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        (
            body["session_id"].as_str().unwrap().to_string(),
            body["current_token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn requests_without_caller_identity_are_unauthorized() {
        let router = test_router();
        let response = router
            .oneshot(post_json(
                "/api/qr/scan",
                None,
                json!({"session_id": "s1", "token": "t"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn open_scan_and_roster_flow() {
        let router = test_router();
        let (session_id, token) = open_session(&router).await;

        // Valid scan records.
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/scan",
                Some("max-42"),
                json!({"session_id": session_id, "token": token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["result"], "RECORDED");

        // Same student again is idempotent.
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/scan",
                Some("max-42"),
                json!({"session_id": session_id, "token": token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["result"], "ALREADY_RECORDED");

        // Forged token is rejected specifically.
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/scan",
                Some("max-43"),
                json!({"session_id": session_id, "token": "forged"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["result"], "TOKEN_MISMATCH");

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/qr/sessions/{}/students", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["students"], json!(["42"]));
    }

    #[tokio::test]
    async fn close_is_confirmed_then_conflicts() {
        let router = test_router();
        let (session_id, token) = open_session(&router).await;

        let close_uri = format!("/api/qr/sessions/{}/close", session_id);
        let response = router
            .clone()
            .oneshot(post_json(&close_uri, Some("max-teacher"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["result"], "CLOSED");

        // Scans against the closed session fail even with the last token.
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/scan",
                Some("max-44"),
                json!({"session_id": session_id, "token": token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["result"], "SESSION_CLOSED");

        // A second close surfaces the repeat instead of silently passing.
        let response = router
            .clone()
            .oneshot(post_json(&close_uri, Some("max-teacher"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["result"], "ALREADY_CLOSED");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/qr/scan",
                Some("max-1"),
                json!({"session_id": "no-such-session", "token": "anything"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["result"], "SESSION_NOT_FOUND");

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/qr/sessions/no-such-session/students")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
