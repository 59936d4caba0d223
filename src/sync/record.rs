//! Remote session record and the pull conflict policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `sessions` table: a user's count for one local day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    /// Local date, `YYYY-MM-DD`.
    pub session_date: String,
    pub session_count: u32,
    pub last_updated: DateTime<Utc>,
    pub device_id: String,
}

impl SyncRecord {
    /// The same record without its id, as sent in insert and update bodies.
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }
}

/// Local side of a pull comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub session_count: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

/// What a pull should do with a fetched remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the local count and timestamp.
    Accept,
    /// Local timestamp is strictly newer.
    SkipLocalNewer,
    /// Remote count is lower and decreases were not allowed.
    SkipDecrease,
}

/// Decides whether a remote record replaces local state.
///
/// Recency is checked first: a strictly newer local timestamp always wins.
/// Only then are counts compared, and a lower remote count is accepted only
/// when `allow_decrease` is set.
pub fn resolve_pull(local: LocalSnapshot, remote: &SyncRecord, allow_decrease: bool) -> Resolution {
    if let Some(local_ts) = local.last_updated {
        if local_ts > remote.last_updated {
            return Resolution::SkipLocalNewer;
        }
    }
    if remote.session_count < local.session_count && !allow_decrease {
        return Resolution::SkipDecrease;
    }
    Resolution::Accept
}
