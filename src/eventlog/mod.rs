//! Bounded-retention event log.
//!
//! Every inbound request (minus a small exclusion set) and every notable
//! operational event becomes one immutable [`LogEvent`] row in SQLite.
//! Records are only ever inserted and deleted: the retention sweeper removes
//! rows older than [`RETENTION_HOURS`], and the log API can clear them in
//! bulk.

pub mod event;
pub mod store;
pub mod sweeper;

pub use event::{LogEvent, LogLevel, NewLogEvent};
pub use store::{EventLogStore, LogFilter};
pub use sweeper::{spawn_retention_sweeper, sweep_once};

use std::time::Duration;

/// Maximum age of a log event before it becomes eligible for deletion.
pub const RETENTION_HOURS: i64 = 48;

/// How often the retention sweeper runs after its initial pass.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
