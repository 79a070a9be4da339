use crate::handlers::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

/// Health check endpoint
/// Returns 200 OK if the service is running, plus the live realtime
/// connection count.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "realtime_connections": state.hub.active_count(),
        })),
    )
}

/// Current UTC time, for client clock sync.
pub async fn current_time() -> impl IntoResponse {
    let now = Utc::now();
    Json(json!({
        "utc": now.to_rfc3339(),
        "unix": now.timestamp_millis() as f64 / 1000.0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLogStore;
    use crate::realtime::BroadcastHub;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_health_check_reports_connections() {
        let positions = Arc::new(RwLock::new(Vec::new()));
        let hub = Arc::new(BroadcastHub::new(positions.clone()));
        let state = AppState {
            store: Arc::new(EventLogStore::in_memory().await.unwrap()),
            hub: hub.clone(),
            positions,
        };

        let (_, _rx) = hub.add();

        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["status"], "healthy");
        assert_eq!(payload["realtime_connections"], 1);
    }

    #[tokio::test]
    async fn test_current_time_shape() {
        let response = current_time().await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(payload["utc"].is_string());
        assert!(payload["unix"].as_f64().unwrap() > 0.0);
    }
}
