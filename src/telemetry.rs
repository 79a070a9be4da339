//! Request telemetry middleware.
//!
//! Wraps every handler: measures latency, classifies severity from the
//! response status, optionally captures a capped snippet of the request body,
//! and persists one event log record per request. The write is best-effort;
//! a persistence failure never changes the response delivered to the caller.

use crate::eventlog::{LogLevel, NewLogEvent};
use crate::handlers::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::time::Instant;

/// Maximum number of characters of the request body retained per event.
pub const REQUEST_BODY_CAP: usize = 1000;

/// Bodies with a declared length above this are not buffered for capture.
const CAPTURE_LIMIT: u64 = 64 * 1024;

/// Low-value paths that would dominate the log.
const EXCLUDED_PATHS: &[&str] = &["/", "/api/health", "/ws/realtime", "/favicon.ico"];
const EXCLUDED_PREFIXES: &[&str] = &["/static/"];

/// Actor identity attached to a request by the authentication layer.
/// Absent for unauthenticated callers.
#[derive(Debug, Clone)]
pub struct RequestActor {
    pub profile_id: Option<i64>,
    pub username: String,
}

pub async fn telemetry_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if is_excluded(&path) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let actor = req.extensions().get::<RequestActor>().cloned();
    let started = Instant::now();

    let (req, request_body) = capture_request_body(req).await;
    let response = next.run(req).await;

    let status = response.status().as_u16();
    let event = NewLogEvent {
        timestamp: Utc::now(),
        profile_id: actor.as_ref().and_then(|a| a.profile_id),
        username: actor
            .map(|a| a.username)
            .unwrap_or_else(|| "anonymous".to_string()),
        level: LogLevel::from_status(status),
        category: "API".to_string(),
        message: format!("{} {} -> {}", method, path, status),
        endpoint: Some(path),
        method: Some(method.to_string()),
        request_body,
        response_status: Some(status as i64),
        duration_ms: Some(started.elapsed().as_millis() as i64),
    };

    if let Err(e) = state.store.insert(&event).await {
        tracing::warn!(error = %e, "Failed to persist request telemetry");
    }

    response
}

fn is_excluded(path: &str) -> bool {
    EXCLUDED_PATHS.contains(&path)
        || EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Buffer the request body for capture, handing an equivalent request back.
///
/// Capture only applies to body-carrying methods with a declared length at or
/// below [`CAPTURE_LIMIT`]; anything else (streaming, oversized, absent)
/// passes through untouched with no snippet. Non-UTF-8 bodies are restored to
/// the request but not captured.
async fn capture_request_body(req: Request) -> (Request, Option<String>) {
    if !matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return (req, None);
    }

    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(len) if len > 0 && len <= CAPTURE_LIMIT => {}
        _ => return (req, None),
    }

    let (parts, body) = req.into_parts();
    match to_bytes(body, CAPTURE_LIMIT as usize).await {
        Ok(bytes) => {
            let snippet = std::str::from_utf8(&bytes)
                .ok()
                .map(|text| text.chars().take(REQUEST_BODY_CAP).collect::<String>());
            (Request::from_parts(parts, Body::from(bytes)), snippet)
        }
        Err(err) => {
            // The read failed mid-stream; hand the original error to the
            // handler so capture never changes what it observes.
            let body = Body::from_stream(futures_util::stream::once(async move {
                Err::<axum::body::Bytes, _>(err)
            }));
            (Request::from_parts(parts, body), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::{EventLogStore, LogFilter};
    use crate::handlers::AppState;
    use crate::realtime::BroadcastHub;
    use axum::{
        body::Bytes,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store = Arc::new(EventLogStore::in_memory().await.unwrap());
        let positions = Arc::new(RwLock::new(Vec::new()));
        let hub = Arc::new(BroadcastHub::new(positions.clone()));
        AppState {
            store,
            hub,
            positions,
        }
    }

    fn test_router(state: AppState) -> Router {
        Router::new()
            .route("/api/echo", post(|body: Bytes| async move { body }))
            .route("/api/ping", get(|| async { "pong" }))
            .route(
                "/api/boom",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route("/api/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                telemetry_middleware,
            ))
            .with_state(state)
    }

    async fn logged_events(state: &AppState) -> Vec<crate::eventlog::LogEvent> {
        let (events, _) = state
            .store
            .query(&LogFilter::default(), 100, 0)
            .await
            .unwrap();
        events
    }

    #[tokio::test]
    async fn test_request_is_logged_with_body_snippet() {
        let state = test_state().await;
        let app = test_router(state.clone());

        let response = app
            .oneshot(
                HttpRequest::post("/api/echo")
                    .header(header::CONTENT_LENGTH, "15")
                    .body(Body::from(r#"{"norad":25544}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The handler still saw the full body.
        let echoed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&echoed[..], br#"{"norad":25544}"#);

        let events = logged_events(&state).await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, LogLevel::Info);
        assert_eq!(event.category, "API");
        assert_eq!(event.endpoint.as_deref(), Some("/api/echo"));
        assert_eq!(event.method.as_deref(), Some("POST"));
        assert_eq!(event.request_body.as_deref(), Some(r#"{"norad":25544}"#));
        assert_eq!(event.response_status, Some(200));
        assert_eq!(event.username, "anonymous");
        assert!(event.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_status_classification() {
        let state = test_state().await;
        let app = test_router(state.clone());

        app.clone()
            .oneshot(HttpRequest::get("/api/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        app.oneshot(HttpRequest::get("/api/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let events = logged_events(&state).await;
        assert_eq!(events.len(), 2);
        let by_endpoint = |path: &str| {
            events
                .iter()
                .find(|e| e.endpoint.as_deref() == Some(path))
                .unwrap()
        };
        assert_eq!(by_endpoint("/api/missing").level, LogLevel::Warning);
        assert_eq!(by_endpoint("/api/boom").level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_excluded_paths_are_not_logged() {
        let state = test_state().await;
        let app = test_router(state.clone());

        let response = app
            .oneshot(HttpRequest::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(logged_events(&state).await.is_empty());
    }

    #[tokio::test]
    async fn test_actor_identity_from_extension() {
        let state = test_state().await;
        let app = test_router(state.clone());

        let mut request = HttpRequest::get("/api/ping").body(Body::empty()).unwrap();
        request.extensions_mut().insert(RequestActor {
            profile_id: Some(42),
            username: "kepler".to_string(),
        });

        app.oneshot(request).await.unwrap();

        let events = logged_events(&state).await;
        assert_eq!(events[0].profile_id, Some(42));
        assert_eq!(events[0].username, "kepler");
    }

    #[tokio::test]
    async fn test_body_without_declared_length_is_not_captured() {
        let state = test_state().await;
        let app = test_router(state.clone());

        let mut request = HttpRequest::post("/api/echo")
            .body(Body::from("payload"))
            .unwrap();
        request.headers_mut().remove(header::CONTENT_LENGTH);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = logged_events(&state).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].request_body.is_none());
    }

    #[tokio::test]
    async fn test_long_body_is_truncated() {
        let state = test_state().await;
        let app = test_router(state.clone());

        let payload = "x".repeat(REQUEST_BODY_CAP * 3);
        app.oneshot(
            HttpRequest::post("/api/echo")
                .header(header::CONTENT_LENGTH, payload.len().to_string())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

        let events = logged_events(&state).await;
        let snippet = events[0].request_body.as_deref().unwrap();
        assert_eq!(snippet.len(), REQUEST_BODY_CAP);
    }

    #[tokio::test]
    async fn test_oversized_declared_body_is_not_captured_but_still_delivered() {
        let state = test_state().await;
        let app = test_router(state.clone());

        // Larger than the capture buffer; the request must pass through
        // unbuffered and untouched.
        let payload = "y".repeat(70 * 1024);
        let response = app
            .oneshot(
                HttpRequest::post("/api/echo")
                    .header(header::CONTENT_LENGTH, payload.len().to_string())
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let echoed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(echoed.len(), payload.len());

        let events = logged_events(&state).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].request_body.is_none());
    }

    #[tokio::test]
    async fn test_body_read_failure_reaches_the_handler() {
        let state = test_state().await;
        let app = test_router(state.clone());

        // A body whose declared length invites capture but whose stream
        // fails mid-read. The handler must see the failure, not a silently
        // emptied body.
        let body = Body::from_stream(futures_util::stream::once(async {
            Err::<Bytes, _>(std::io::Error::other("connection reset"))
        }));
        let response = app
            .oneshot(
                HttpRequest::post("/api/echo")
                    .header(header::CONTENT_LENGTH, "10")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        // The echo handler's Bytes extractor rejects the broken body.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let events = logged_events(&state).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].request_body.is_none());
        assert_eq!(events[0].level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_response_intact() {
        let state = test_state().await;
        let app = test_router(state.clone());

        // Storage becomes unavailable; the request must still succeed.
        state.store.pool().close().await;

        let response = app
            .oneshot(HttpRequest::get("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[test]
    fn test_exclusion_rules() {
        assert!(is_excluded("/"));
        assert!(is_excluded("/api/health"));
        assert!(is_excluded("/ws/realtime"));
        assert!(is_excluded("/static/app.js"));
        assert!(!is_excluded("/api/logs"));
    }
}
