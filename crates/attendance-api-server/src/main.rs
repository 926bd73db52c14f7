use anyhow::Result;
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use attendance_api_server::config::Settings;
use attendance_api_server::database::{DbPool, PgRosterDirectory};
use attendance_api_server::handlers;
use attendance_api_server::pubsub::TokenBus;
use attendance_api_server::scheduler::TokenRotator;
use attendance_api_server::services::AttendanceService;
use attendance_api_server::store::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,attendance_api_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting attendance API server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Roster database (read-only collaborator)
    let db_pool = DbPool::new(&settings.database).await?;
    info!("Roster database connection established");

    let roster = Arc::new(PgRosterDirectory::new(db_pool.clone()));

    // Shared session state
    let store = Arc::new(SessionStore::new());
    let bus = Arc::new(TokenBus::new(settings.attendance.channel_capacity));

    let service = Arc::new(AttendanceService::new(
        store.clone(),
        bus.clone(),
        roster,
        settings.attendance.token_bytes,
    ));

    // The process-wide rotation task, stopped again at shutdown.
    let rotator = TokenRotator::new(
        store.clone(),
        bus.clone(),
        settings.attendance.rotation_interval(),
        settings.attendance.token_bytes,
    )
    .spawn();
    info!(
        "Token rotator running every {}s",
        settings.attendance.rotation_interval_secs
    );

    // Build router
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let app = build_router(service, store, bus, db_pool.clone(), Arc::new(settings));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop rotating before the process goes away.
    rotator.shutdown().await;
    db_pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn build_router(
    service: Arc<AttendanceService>,
    store: Arc<SessionStore>,
    bus: Arc<TokenBus>,
    db_pool: DbPool,
    settings: Arc<Settings>,
) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    // Attendance API + the display stream
    let api_routes = Router::new()
        .route("/api/qr/sessions", post(handlers::sessions::open_session_handler))
        .route(
            "/api/qr/sessions/{session_id}/close",
            post(handlers::sessions::close_session_handler),
        )
        .route(
            "/api/qr/sessions/{session_id}/students",
            get(handlers::sessions::session_students_handler),
        )
        .route("/api/qr/scan", post(handlers::scan::scan_handler))
        .route("/ws/session/{session_id}", get(handlers::display::display_ws_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Shared state
        .layer(Extension(service))
        .layer(Extension(store))
        .layer(Extension(bus))
        .layer(Extension(db_pool))
        .layer(Extension(settings))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");
}
