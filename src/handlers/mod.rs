pub mod health;
pub mod logs;
pub mod realtime;
pub mod satellites;

use crate::eventlog::EventLogStore;
use crate::realtime::{BroadcastHub, SharedPositions};
use std::sync::Arc;

/// Shared state for all HTTP handlers and the telemetry middleware.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventLogStore>,
    pub hub: Arc<BroadcastHub>,
    pub positions: SharedPositions,
}
