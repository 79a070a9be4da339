use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Classify a response status code: 5xx is an error, 4xx a warning,
    /// everything else informational.
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Self::Error,
            400..=499 => Self::Warning,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// One immutable record in the event log.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LogEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub profile_id: Option<i64>,
    pub username: String,
    pub level: LogLevel,
    pub category: String,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub message: String,
    pub request_body: Option<String>,
    pub response_status: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// A log event about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewLogEvent {
    pub timestamp: DateTime<Utc>,
    pub profile_id: Option<i64>,
    pub username: String,
    pub level: LogLevel,
    pub category: String,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub message: String,
    pub request_body: Option<String>,
    pub response_status: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl NewLogEvent {
    /// Operational event not tied to a request (startup, log-clear audit).
    pub fn system(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            profile_id: None,
            username: "anonymous".to_string(),
            level,
            category: "SYSTEM".to_string(),
            endpoint: None,
            method: None,
            message: message.into(),
            request_body: None,
            response_status: None,
            duration_ms: None,
        }
    }
}
