//! In-process remote store for tests and offline runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChangeSubscription, RemoteChange, RemoteStore, SyncError, SyncRecord, SyncResult};

/// A call made against [`InMemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Fetch { user_id: String, session_date: String },
    Insert { session_count: u32 },
    Update { id: String, session_count: u32 },
}

/// Remote store backed by a vector.
///
/// Writes made through the [`RemoteStore`] trait do not notify subscribers;
/// use [`InMemoryRemoteStore::notify_change`] to simulate another device.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    records: Mutex<Vec<SyncRecord>>,
    operations: Mutex<Vec<StoreOp>>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<RemoteChange>)>>,
    should_fail: AtomicBool,
    next_id: AtomicU64,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row directly, replacing any row for the same user and day.
    pub fn put(&self, mut record: SyncRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.user_id == record.user_id && r.session_date == record.session_date)
        {
            record.id = existing.id.clone();
            *existing = record;
        } else {
            record.id.get_or_insert_with(|| self.allocate_id());
            records.push(record);
        }
    }

    #[must_use]
    pub fn records(&self) -> Vec<SyncRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Sends a change notification to `user_id`'s subscribers.
    pub fn notify_change(&self, user_id: &str, session_date: Option<&str>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(subscriber, tx)| {
            if subscriber != user_id {
                return !tx.is_closed();
            }
            tx.send(RemoteChange {
                session_date: session_date.map(str::to_string),
            })
            .is_ok()
        });
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers.len()
    }

    fn allocate_id(&self) -> String {
        format!("row-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record_op(&self, op: StoreOp) -> SyncResult<()> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(SyncError::Http("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch(&self, user_id: &str, session_date: &str) -> SyncResult<Option<SyncRecord>> {
        self.record_op(StoreOp::Fetch {
            user_id: user_id.to_string(),
            session_date: session_date.to_string(),
        })?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.user_id == user_id && r.session_date == session_date)
            .cloned())
    }

    async fn insert(&self, record: &SyncRecord) -> SyncResult<SyncRecord> {
        self.record_op(StoreOp::Insert {
            session_count: record.session_count,
        })?;
        let stored = SyncRecord {
            id: Some(self.allocate_id()),
            ..record.without_id()
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &str, record: &SyncRecord) -> SyncResult<SyncRecord> {
        self.record_op(StoreOp::Update {
            id: id.to_string(),
            session_count: record.session_count,
        })?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| SyncError::Api {
                status: 404,
                message: format!("row {id} not found (404)"),
            })?;
        *existing = SyncRecord {
            id: Some(id.to_string()),
            ..record.without_id()
        };
        Ok(existing.clone())
    }

    fn subscribe(&self, user_id: &str) -> ChangeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), tx));
        ChangeSubscription::new(rx, None)
    }
}
