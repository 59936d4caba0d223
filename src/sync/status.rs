//! Observable sync status.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// Result of the most recent sync attempt, for presenters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncStatus {
    pub message: String,
    pub severity: Severity,
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
