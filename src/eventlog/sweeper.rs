//! Background retention sweeper.
//!
//! Deletes log events older than the retention horizon. Runs once at startup,
//! then on a fixed interval until the shutdown signal fires.

use crate::eventlog::store::EventLogStore;
use crate::eventlog::{RETENTION_HOURS, SWEEP_INTERVAL};
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time;

/// Spawn the retention sweep loop as a supervised task.
///
/// The first interval tick fires immediately, so growth accumulated across
/// restarts is bounded right away. A failed sweep is logged and retried on
/// the next tick.
pub fn spawn_retention_sweeper(
    store: Arc<EventLogStore>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweep_once(&store).await {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::debug!("Retention sweeper stopping");
                    break;
                }
            }
        }
    })
}

/// Run a single retention sweep, returning the number of events removed.
///
/// Deletion is purely timestamp-based, so events inserted while a sweep is in
/// flight are never eligible for that pass.
pub async fn sweep_once(store: &EventLogStore) -> Result<u64> {
    let cutoff = Utc::now() - ChronoDuration::hours(RETENTION_HOURS);
    let deleted = store.delete_before(Some(cutoff)).await?;

    // Stay quiet when nothing expired; the sweeper must not amplify its own
    // log volume.
    if deleted > 0 {
        tracing::info!(
            deleted,
            retention_hours = RETENTION_HOURS,
            "Swept expired log events"
        );
    }

    Ok(deleted)
}
