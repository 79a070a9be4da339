//! SQLite-backed event log store.
//!
//! One pool shared by all callers (request telemetry, the retention sweeper,
//! the log API, startup emitters). WAL mode plus a busy timeout keep
//! concurrent inserts and deletes safe; each operation is a single statement,
//! so no partial record is ever observable.

use crate::eventlog::event::{LogEvent, LogLevel, NewLogEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Conjunctive filter for log queries. An absent field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub profile_id: Option<i64>,
    pub level: Option<LogLevel>,
    pub category: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Event log database handle.
pub struct EventLogStore {
    pool: SqlitePool,
}

impl EventLogStore {
    /// Open (creating if missing) the event log database and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to event log database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open a store backed by a private in-memory database.
    ///
    /// A single connection is pinned for the lifetime of the pool so the
    /// database survives between operations. Intended for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory event log database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("Failed to run event log migrations")?;

        Ok(())
    }

    /// Insert a single log event, returning the store-assigned id.
    pub async fn insert(&self, event: &NewLogEvent) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO log_events
                (timestamp, profile_id, username, level, category,
                 endpoint, method, message, request_body, response_status, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.timestamp)
        .bind(event.profile_id)
        .bind(&event.username)
        .bind(event.level)
        .bind(&event.category)
        .bind(&event.endpoint)
        .bind(&event.method)
        .bind(&event.message)
        .bind(&event.request_body)
        .bind(event.response_status)
        .bind(event.duration_ms)
        .execute(&self.pool)
        .await
        .context("Failed to insert log event")?;

        Ok(result.last_insert_rowid())
    }

    /// Query log events, newest first.
    ///
    /// Returns the requested page and the total number of rows matching the
    /// filter regardless of pagination.
    pub async fn query(
        &self,
        filter: &LogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LogEvent>, i64)> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, timestamp, profile_id, username, level, category,
                    endpoint, method, message, request_body, response_status, duration_ms
             FROM log_events",
        );
        push_filters(&mut query, filter);
        query
            .push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let events = query
            .build_query_as::<LogEvent>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query log events")?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM log_events");
        push_filters(&mut count, filter);

        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count log events")?;

        Ok((events, total))
    }

    /// Delete events older than the cutoff, or every event when no cutoff is
    /// given. Returns the number of rows removed.
    pub async fn delete_before(&self, cutoff: Option<DateTime<Utc>>) -> Result<u64> {
        let result = match cutoff {
            Some(cutoff) => {
                sqlx::query("DELETE FROM log_events WHERE timestamp < ?")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            }
            None => sqlx::query("DELETE FROM log_events").execute(&self.pool).await,
        }
        .context("Failed to delete log events")?;

        Ok(result.rows_affected())
    }

    /// Get the underlying connection pool (for advanced usage).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    query.push(" WHERE 1=1");

    if let Some(profile_id) = filter.profile_id {
        query.push(" AND profile_id = ").push_bind(profile_id);
    }

    if let Some(level) = filter.level {
        query.push(" AND level = ").push_bind(level);
    }

    if let Some(category) = &filter.category {
        query.push(" AND category = ").push_bind(category.clone());
    }

    if let Some(since) = filter.since {
        query.push(" AND timestamp >= ").push_bind(since);
    }

    if let Some(until) = filter.until {
        query.push(" AND timestamp <= ").push_bind(until);
    }
}
