//! Session count sync.
//!
//! One row per user per local day lives in the remote `sessions` table. The
//! engine pushes the local count after each completed work session and pulls
//! on a fixed interval and on realtime change notifications.
//!
//! Network halves ([`SyncEngine::fetch_today`], [`SyncEngine::upload`]) are
//! kept apart from the apply halves ([`SyncEngine::apply_pull`],
//! [`SyncEngine::finish_push`]) so the caller can run I/O in a task and
//! apply the result against whatever local state is current when it lands.

mod error;
mod memory;
mod realtime;
mod record;
mod status;
mod supabase;
mod triggers;

pub use error::SyncError;
pub use memory::{InMemoryRemoteStore, StoreOp};
pub use record::{resolve_pull, LocalSnapshot, Resolution, SyncRecord};
pub use status::{Severity, SyncStatus};
pub use supabase::SupabaseRemoteStore;
pub use triggers::{SyncTrigger, SyncTriggers, PERIODIC_SYNC_INTERVAL};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthHandle;
use crate::clock::Clock;
use crate::settings::{keys, SettingsExt, SettingsStore};

pub type SyncResult<T> = Result<T, SyncError>;

// ============================================================================
// Remote store
// ============================================================================

/// A change to the user's rows reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub session_date: Option<String>,
}

/// Stream of [`RemoteChange`]s. Dropping it stops the listener.
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<RemoteChange>,
    task: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<RemoteChange>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Next change, or `None` once the listener has gone away.
    pub async fn recv(&mut self) -> Option<RemoteChange> {
        self.rx.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Access to the remote `sessions` table.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The row for `(user_id, session_date)`, if any.
    async fn fetch(&self, user_id: &str, session_date: &str) -> SyncResult<Option<SyncRecord>>;

    /// Inserts a new row and returns it as stored.
    async fn insert(&self, record: &SyncRecord) -> SyncResult<SyncRecord>;

    /// Replaces the row with the given id and returns it as stored.
    async fn update(&self, id: &str, record: &SyncRecord) -> SyncResult<SyncRecord>;

    /// Starts listening for changes to `user_id`'s rows.
    fn subscribe(&self, user_id: &str) -> ChangeSubscription;
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The remote record was accepted. The caller writes the count into the timer.
    Applied {
        session_count: u32,
        last_updated: DateTime<Utc>,
    },
    NoRemoteData,
    SkippedLocalNewer,
    SkippedDecrease { local: u32, remote: u32 },
    /// The fetch belonged to an account that is no longer signed in.
    Discarded,
    /// Not configured or not signed in.
    Unavailable(SyncError),
    Failed(SyncError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted(SyncRecord),
    Updated(SyncRecord),
    /// Stored remotely, but the account changed before the result landed.
    Discarded,
    Unavailable(SyncError),
    Failed(SyncError),
}

impl PushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Updated(_))
    }
}

/// Result of the network half of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pushed {
    Inserted(SyncRecord),
    Updated(SyncRecord),
}

impl Pushed {
    pub fn record(&self) -> &SyncRecord {
        match self {
            Self::Inserted(record) | Self::Updated(record) => record,
        }
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

#[derive(Clone)]
pub struct SyncEngine {
    remote: Option<Arc<dyn RemoteStore>>,
    auth: AuthHandle,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    status: Arc<watch::Sender<SyncStatus>>,
    in_flight: Arc<AtomicUsize>,
    device_id: String,
}

impl SyncEngine {
    /// `remote` is `None` when no backend is configured.
    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        auth: AuthHandle,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let device_id = load_or_create_device_id(settings.as_ref());
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            remote,
            auth,
            settings,
            clock,
            status: Arc::new(status),
            in_flight: Arc::new(AtomicUsize::new(0)),
            device_id,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Timestamp of the last accepted pull or successful push.
    pub fn local_last_updated(&self) -> Option<DateTime<Utc>> {
        self.settings.get_as(keys::LAST_UPDATED)
    }

    /// Forgets the local sync timestamp. Called on sign-out.
    pub fn clear_local_timestamp(&self) {
        if let Err(e) = self.settings.remove(keys::LAST_UPDATED) {
            warn!(error = %e, "Failed to clear lastUpdated");
        }
    }

    /// Checks that sync can run and returns the remote store and user id.
    pub fn preflight(&self) -> SyncResult<(Arc<dyn RemoteStore>, String)> {
        let remote = self.remote.clone().ok_or(SyncError::NotConfigured)?;
        let user_id = self.auth.user_id().ok_or(SyncError::NotAuthenticated)?;
        Ok((remote, user_id))
    }

    /// Opens the realtime change stream for the signed-in user.
    pub fn subscribe_changes(&self) -> SyncResult<ChangeSubscription> {
        let (remote, user_id) = self.preflight()?;
        Ok(remote.subscribe(&user_id))
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    /// Fetches today's remote row. Performs no local writes.
    pub async fn fetch_today(&self) -> SyncResult<Option<SyncRecord>> {
        let (remote, user_id) = self.preflight()?;
        let today = self.clock.today();
        self.begin("📥 ダウンロード中...");
        debug!(user_id = %user_id, date = %today, "Fetching remote session");
        remote.fetch(&user_id, &today).await
    }

    /// Applies a fetch result against the current local count.
    pub fn apply_pull(
        &self,
        local_count: u32,
        fetched: SyncResult<Option<SyncRecord>>,
        allow_decrease: bool,
    ) -> PullOutcome {
        let record = match fetched {
            Ok(record) => record,
            Err(e) if e.is_precondition() => {
                self.report(Severity::Warning, format!("⚠️ {e}"), false);
                return PullOutcome::Unavailable(e);
            }
            Err(e) => {
                warn!(error = %e, "Pull failed");
                self.end(Severity::Error, format!("❌ エラー: {e}"), false);
                return PullOutcome::Failed(e);
            }
        };

        if let Some(record) = &record {
            if !self.is_current_user(&record.user_id) {
                debug!(user_id = %record.user_id, "Pull result for a signed-out account dropped");
                self.end(Severity::Info, "ℹ️ アカウントが変わったため同期結果を破棄しました", false);
                return PullOutcome::Discarded;
            }
        }

        // A fetch that straddled midnight returns yesterday's row.
        let today = self.clock.today();
        let Some(record) = record.filter(|r| r.session_date == today) else {
            self.end(Severity::Info, "ℹ️ クラウドにデータがありません", true);
            return PullOutcome::NoRemoteData;
        };

        let local = LocalSnapshot {
            session_count: local_count,
            last_updated: self.local_last_updated(),
        };
        match resolve_pull(local, &record, allow_decrease) {
            Resolution::Accept => {
                self.store_last_updated(record.last_updated);
                info!(
                    session_count = record.session_count,
                    device_id = %record.device_id,
                    "Applied remote session count"
                );
                self.end(
                    Severity::Success,
                    format!("✅ ダウンロード成功 (count={})", record.session_count),
                    true,
                );
                PullOutcome::Applied {
                    session_count: record.session_count,
                    last_updated: record.last_updated,
                }
            }
            Resolution::SkipLocalNewer => {
                debug!("Local data is newer; pull skipped");
                self.end(Severity::Info, "⏭️ ローカルの方が新しいためスキップしました", true);
                PullOutcome::SkippedLocalNewer
            }
            Resolution::SkipDecrease => {
                debug!(
                    local = local_count,
                    remote = record.session_count,
                    "Remote count is lower; pull skipped"
                );
                self.end(
                    Severity::Warning,
                    format!(
                        "⚠️ クラウドの回数({})がローカル({})より少ないためスキップしました",
                        record.session_count, local_count
                    ),
                    true,
                );
                PullOutcome::SkippedDecrease {
                    local: local_count,
                    remote: record.session_count,
                }
            }
        }
    }

    pub async fn sync_from_cloud(&self, local_count: u32, allow_decrease: bool) -> PullOutcome {
        let fetched = self.fetch_today().await;
        self.apply_pull(local_count, fetched, allow_decrease)
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    /// Writes `session_count` as today's remote row. Performs no local writes.
    pub async fn upload(&self, session_count: u32) -> SyncResult<Pushed> {
        let (remote, user_id) = self.preflight()?;
        let today = self.clock.today();
        self.begin(format!("📤 アップロード中... (count={session_count})"));

        let record = SyncRecord {
            id: None,
            user_id: user_id.clone(),
            session_date: today.clone(),
            session_count,
            last_updated: self.clock.now_utc(),
            device_id: self.device_id.clone(),
        };
        debug!(date = %today, count = session_count, "Uploading session count");

        match remote.fetch(&user_id, &today).await? {
            Some(SyncRecord { id: Some(id), .. }) => {
                let stored = remote.update(&id, &record).await?;
                Ok(Pushed::Updated(stored))
            }
            _ => {
                let stored = remote.insert(&record).await?;
                Ok(Pushed::Inserted(stored))
            }
        }
    }

    /// Records the result of [`SyncEngine::upload`].
    pub fn finish_push(&self, result: SyncResult<Pushed>) -> PushOutcome {
        match result {
            Ok(pushed) if !self.is_current_user(&pushed.record().user_id) => {
                debug!("Push result for a signed-out account dropped");
                self.end(Severity::Info, "ℹ️ アカウントが変わったため同期結果を破棄しました", false);
                PushOutcome::Discarded
            }
            Ok(pushed) => {
                let record = pushed.record();
                self.store_last_updated(record.last_updated);
                info!(session_count = record.session_count, "Uploaded session count");
                self.end(
                    Severity::Success,
                    format!("✅ アップロード成功 (count={})", record.session_count),
                    true,
                );
                match pushed {
                    Pushed::Inserted(record) => PushOutcome::Inserted(record),
                    Pushed::Updated(record) => PushOutcome::Updated(record),
                }
            }
            Err(e) if e.is_precondition() => {
                self.report(Severity::Warning, format!("⚠️ {e}"), false);
                PushOutcome::Unavailable(e)
            }
            Err(e) => {
                warn!(error = %e, "Push failed");
                self.end(Severity::Error, format!("❌ エラー: {e}"), false);
                PushOutcome::Failed(e)
            }
        }
    }

    pub async fn sync_to_cloud(&self, session_count: u32) -> PushOutcome {
        let result = self.upload(session_count).await;
        self.finish_push(result)
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    fn is_current_user(&self, user_id: &str) -> bool {
        self.auth.user_id().as_deref() == Some(user_id)
    }

    fn store_last_updated(&self, at: DateTime<Utc>) {
        if let Err(e) = self.settings.set_as(keys::LAST_UPDATED, &at) {
            warn!(error = %e, "Failed to persist lastUpdated");
        }
    }

    fn begin(&self, message: impl Into<String>) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let message = message.into();
        self.status.send_modify(|status| {
            status.message = message;
            status.severity = Severity::Info;
            status.is_syncing = true;
        });
    }

    fn end(&self, severity: Severity, message: impl Into<String>, synced: bool) {
        // Saturating: preflight failures never called `begin`.
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.report(severity, message, synced);
    }

    fn report(&self, severity: Severity, message: impl Into<String>, synced: bool) {
        let message = message.into();
        let is_syncing = self.in_flight.load(Ordering::SeqCst) > 0;
        let now = self.clock.now_utc();
        self.status.send_modify(|status| {
            status.message = message;
            status.severity = severity;
            status.is_syncing = is_syncing;
            if synced {
                status.last_sync = Some(now);
            }
        });
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("configured", &self.remote.is_some())
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

fn load_or_create_device_id(settings: &dyn SettingsStore) -> String {
    if let Some(id) = settings.get_as::<String>(keys::DEVICE_ID) {
        if !id.is_empty() {
            return id;
        }
    }
    let id = Uuid::new_v4().to_string();
    if let Err(e) = settings.set_as(keys::DEVICE_ID, &id) {
        warn!(error = %e, "Failed to persist device id");
    }
    id
}
