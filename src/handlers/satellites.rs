//! Satellite catalog endpoints.
//!
//! The position set itself is frontend-managed for now; server-side TLE
//! propagation is handled by an external collaborator and not implemented
//! here. These endpoints expose paginated and filtered views of whatever the
//! shared set currently holds.

use crate::error::AppError;
use crate::handlers::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SatelliteListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct PositionParams {
    /// Target time, RFC 3339 (default: now)
    pub time: Option<String>,

    /// Comma-separated NORAD ids (default: all)
    pub norad_ids: Option<String>,
}

/// GET /api/satellites - paginated satellite list.
pub async fn list_satellites(
    State(state): State<AppState>,
    Query(params): Query<SatelliteListParams>,
) -> Json<Value> {
    let satellites = state.positions.read().await;
    let page: Vec<Value> = satellites
        .iter()
        .skip(params.offset)
        .take(params.limit)
        .cloned()
        .collect();

    Json(json!({
        "total": satellites.len(),
        "limit": params.limit,
        "offset": params.offset,
        "satellites": page,
    }))
}

/// GET /api/satellites/positions - positions at a target time, optionally
/// restricted to a set of NORAD ids.
pub async fn satellite_positions(
    State(state): State<AppState>,
    Query(params): Query<PositionParams>,
) -> Result<Json<Value>, AppError> {
    let target_time = match params.time.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| AppError::InvalidQuery(format!("invalid time: {}", raw)))?,
        None => Utc::now(),
    };

    let ids = params
        .norad_ids
        .as_deref()
        .map(parse_norad_ids)
        .transpose()?;

    let satellites = state.positions.read().await;
    let positions: Vec<Value> = match &ids {
        Some(ids) => satellites
            .iter()
            .filter(|s| {
                s.get("noradId")
                    .and_then(Value::as_i64)
                    .is_some_and(|id| ids.contains(&id))
            })
            .cloned()
            .collect(),
        None => satellites.clone(),
    };

    Ok(Json(json!({
        "time": target_time.to_rfc3339(),
        "count": positions.len(),
        "positions": positions,
    })))
}

fn parse_norad_ids(raw: &str) -> Result<Vec<i64>, AppError> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| AppError::InvalidQuery(format!("invalid NORAD id: {}", part.trim())))
        })
        .collect()
}
