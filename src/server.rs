use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    eventlog::{spawn_retention_sweeper, EventLogStore, LogLevel, NewLogEvent, RETENTION_HOURS},
    handlers::{self, AppState},
    realtime::{spawn_broadcast_loop, BroadcastHub, SharedPositions},
    telemetry,
};

/// Start the satellite tracking backend
///
/// This function:
/// 1. Opens the event log store and runs migrations
/// 2. Spawns the retention sweeper and broadcast loops
/// 3. Creates the Axum application
/// 4. Serves requests until the shutdown signal, then stops the loops
pub async fn start_server(config: Config) -> Result<()> {
    let store = Arc::new(EventLogStore::new(&config.database.url).await?);

    let positions: SharedPositions = Arc::new(RwLock::new(Vec::new()));
    let hub = Arc::new(BroadcastHub::new(positions.clone()));

    let (shutdown_tx, _) = watch::channel(false);
    let sweeper = spawn_retention_sweeper(store.clone(), shutdown_tx.subscribe());
    let broadcaster = spawn_broadcast_loop(hub.clone(), shutdown_tx.subscribe());

    emit_startup_event(&store).await;

    let state = AppState {
        store,
        hub,
        positions,
    };
    let app = create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting satellite tracking backend on {}", addr);
    info!(
        retention_hours = RETENTION_HOURS,
        "Event log retention active"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    // Stop the background loops and wait for them to wind down.
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(sweeper, broadcaster);

    info!("Server stopped gracefully");

    Ok(())
}

/// Record the server-started operational event. Best-effort like every
/// telemetry write; a failure is logged and startup continues.
pub async fn emit_startup_event(store: &EventLogStore) {
    if let Err(e) = store
        .insert(&NewLogEvent::system(LogLevel::Info, "Server started"))
        .await
    {
        tracing::warn!(error = %e, "Failed to record startup event");
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_check))
        .route("/api/time/now", get(handlers::health::current_time))
        .route("/api/satellites", get(handlers::satellites::list_satellites))
        .route(
            "/api/satellites/positions",
            get(handlers::satellites::satellite_positions),
        )
        .route(
            "/api/logs",
            get(handlers::logs::get_logs).delete(handlers::logs::delete_logs),
        )
        .route("/ws/realtime", get(handlers::realtime::ws_realtime))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            telemetry::telemetry_middleware,
        ))
        // Limit request body size to 10MB to prevent memory exhaustion
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
