//! Event log query and deletion API.

use crate::error::AppError;
use crate::eventlog::{LogEvent, LogFilter, LogLevel, NewLogEvent, RETENTION_HOURS};
use crate::handlers::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 1000;

/// Query parameters for `GET /api/logs`.
///
/// Filter values arrive as raw text so malformed input surfaces as a
/// descriptive client error rather than a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,

    /// Filter by acting profile id
    pub profile_id: Option<String>,

    /// Filter by level (info, warning, error)
    pub level: Option<String>,

    /// Filter by category tag (e.g. API, AUTH, SYSTEM)
    pub category: Option<String>,

    /// Only events at or after this RFC 3339 timestamp
    pub since: Option<String>,

    /// Only events at or before this RFC 3339 timestamp
    pub until: Option<String>,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEvent>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub retention_hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct LogDeleteParams {
    /// Only delete events older than this RFC 3339 timestamp; absent clears
    /// the entire log.
    pub before: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted: u64,
}

/// GET /api/logs - filtered, paginated log query, newest first.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let limit = params.limit.clamp(1, MAX_LIMIT);
    let offset = params.offset.max(0);
    let filter = build_filter(&params)?;

    let (logs, total) = state.store.query(&filter, limit, offset).await?;

    Ok(Json(LogsResponse {
        logs,
        total,
        limit,
        offset,
        retention_hours: RETENTION_HOURS,
    }))
}

/// DELETE /api/logs - bulk deletion with an optional cutoff.
///
/// The deletion itself is recorded as one audit event; its timestamp is the
/// moment of deletion, so it can never fall inside the window it just
/// cleared.
pub async fn delete_logs(
    State(state): State<AppState>,
    Query(params): Query<LogDeleteParams>,
) -> Result<Json<DeleteResponse>, AppError> {
    let cutoff = parse_timestamp(params.before.as_deref(), "before")?;

    let deleted = state.store.delete_before(cutoff).await?;

    let message = match cutoff {
        Some(cutoff) => format!(
            "Deleted {} log events older than {}",
            deleted,
            cutoff.to_rfc3339()
        ),
        None => format!("Deleted all {} log events", deleted),
    };

    let audit = NewLogEvent::system(LogLevel::Info, message.clone());
    if let Err(e) = state.store.insert(&audit).await {
        tracing::warn!(error = %e, "Failed to record log-clear audit event");
    }

    Ok(Json(DeleteResponse { message, deleted }))
}

fn build_filter(params: &LogQueryParams) -> Result<LogFilter, AppError> {
    let profile_id = params
        .profile_id
        .as_deref()
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| AppError::InvalidQuery(format!("invalid profile_id: {}", v)))
        })
        .transpose()?;

    let level = params
        .level
        .as_deref()
        .map(|v| {
            v.parse::<LogLevel>()
                .map_err(AppError::InvalidQuery)
        })
        .transpose()?;

    Ok(LogFilter {
        profile_id,
        level,
        category: params.category.clone(),
        since: parse_timestamp(params.since.as_deref(), "since")?,
        until: parse_timestamp(params.until.as_deref(), "until")?,
    })
}

fn parse_timestamp(value: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| AppError::InvalidQuery(format!("invalid {} timestamp: {}", name, v)))
        })
        .transpose()
}
