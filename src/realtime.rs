//! Realtime broadcast hub.
//!
//! Tracks live websocket sessions and fans a position snapshot out to all of
//! them once per tick. Each connection owns a small bounded outbound buffer;
//! a full buffer means the connection simply misses that tick, and a closed
//! channel removes the connection from the registry.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, RwLock};
use tokio::time;

/// Broadcast cadence for position snapshots.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

/// Outbound messages buffered per connection before ticks are skipped.
const OUTBOUND_BUFFER: usize = 16;

/// Satellite position set shared between the HTTP surface and the broadcast
/// loop. Entries are opaque JSON objects managed by the frontend until
/// server-side propagation lands.
pub type SharedPositions = Arc<RwLock<Vec<serde_json::Value>>>;

/// Registry of live realtime connections.
///
/// Mutated by two independent flows, the connect/disconnect path and the
/// periodic tick loop, so all access goes through this one object.
pub struct BroadcastHub {
    connections: DashMap<u64, mpsc::Sender<String>>,
    next_id: AtomicU64,
    positions: SharedPositions,
}

impl BroadcastHub {
    pub fn new(positions: SharedPositions) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            positions,
        }
    }

    /// Register a new connection, returning its id and the outbound message
    /// stream the transport task must drain.
    pub fn add(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, tx);

        tracing::debug!(
            connection = id,
            active = self.active_count(),
            "Realtime client connected"
        );

        (id, rx)
    }

    /// Remove a connection after an explicit disconnect or transport failure.
    pub fn remove(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(
                connection = id,
                active = self.active_count(),
                "Realtime client disconnected"
            );
        }
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Push the current position snapshot to every registered connection.
    ///
    /// A connection whose channel has closed is dropped from the registry;
    /// delivery to the remaining connections is unaffected.
    pub async fn broadcast_snapshot(&self) {
        if self.connections.is_empty() {
            return;
        }

        let data = self.positions.read().await.clone();
        let message = json!({
            "type": "positions",
            "time": Utc::now().to_rfc3339(),
            "data": data,
        })
        .to_string();

        self.connections.retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            // Slow consumer: the buffer is full, so this tick is skipped.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection = *id, "Dropping closed realtime connection");
                false
            }
        });
    }
}

/// Acknowledgement sent once, immediately after the handshake is accepted.
pub fn connected_message() -> String {
    json!({
        "type": "connected",
        "message": "Real-time updates active",
    })
    .to_string()
}

/// Spawn the snapshot fan-out loop as a supervised task.
pub fn spawn_broadcast_loop(
    hub: Arc<BroadcastHub>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(BROADCAST_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => hub.broadcast_snapshot().await,
                _ = shutdown.changed() => {
                    tracing::debug!("Broadcast loop stopping");
                    break;
                }
            }
        }
    })
}
