// ABOUTME: Log event records carried on the per-job log bus.
// ABOUTME: Each event has a job-local sequence number assigned at append time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Strictly increasing within one job, starting at 0. Never reused after eviction.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub severity: Severity,
    pub line: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {:<5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.stage,
            self.severity,
            self.line
        )
    }
}
