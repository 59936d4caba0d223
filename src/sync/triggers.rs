//! Pull triggers: a fixed interval plus realtime change notifications.

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{ChangeSubscription, SyncEngine};

pub const PERIODIC_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Periodic,
    RemoteChange,
}

/// Owns the periodic timer and the realtime subscription.
///
/// While stopped, [`SyncTriggers::next_trigger`] never resolves, so it can sit
/// in a `select!` unconditionally.
#[derive(Debug)]
pub struct SyncTriggers {
    period: Duration,
    interval: Option<Interval>,
    subscription: Option<ChangeSubscription>,
}

impl Default for SyncTriggers {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTriggers {
    #[must_use]
    pub fn new() -> Self {
        Self::with_period(PERIODIC_SYNC_INTERVAL)
    }

    #[must_use]
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            subscription: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Arms both triggers. Returns false when sync is unavailable.
    ///
    /// The first periodic tick fires immediately and serves as the initial
    /// pull.
    pub fn start(&mut self, engine: &SyncEngine) -> bool {
        self.stop();
        let subscription = match engine.subscribe_changes() {
            Ok(subscription) => subscription,
            Err(e) => {
                debug!(reason = %e, "Sync triggers not started");
                return false;
            }
        };
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(ticker);
        self.subscription = Some(subscription);
        info!(period_secs = self.period.as_secs(), "Sync triggers started");
        true
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            info!("Sync triggers stopped");
        }
        self.subscription = None;
    }

    /// Waits for the next reason to pull.
    pub async fn next_trigger(&mut self) -> SyncTrigger {
        loop {
            let fired = match (self.interval.as_mut(), self.subscription.as_mut()) {
                (None, None) => std::future::pending::<Option<SyncTrigger>>().await,
                (Some(ticker), None) => {
                    ticker.tick().await;
                    Some(SyncTrigger::Periodic)
                }
                (None, Some(subscription)) => subscription
                    .recv()
                    .await
                    .map(|_| SyncTrigger::RemoteChange),
                (Some(ticker), Some(subscription)) => tokio::select! {
                    _ = ticker.tick() => Some(SyncTrigger::Periodic),
                    change = subscription.recv() => change.map(|_| SyncTrigger::RemoteChange),
                },
            };
            match fired {
                Some(trigger) => return trigger,
                None => {
                    debug!("Realtime subscription ended");
                    self.subscription = None;
                }
            }
        }
    }
}
