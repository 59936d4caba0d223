//! Wall clock abstraction.
//!
//! Daily rollover and sync timestamps depend on the local date, so the clock
//! is injected everywhere it is read. Tests use [`MockClock`].

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};

/// Source of the current local date-time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local date-time.
    fn now(&self) -> DateTime<Local>;

    /// Current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }

    /// Today's local date as `YYYY-MM-DD`.
    fn today(&self) -> String {
        date_string(&self.now())
    }
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Local>>,
}

impl MockClock {
    #[must_use]
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Formats the local date of `now` as `YYYY-MM-DD`.
pub fn date_string(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Time left until the next local midnight.
///
/// Falls back to 24 hours when the next midnight does not exist in the local
/// zone (DST gap).
pub fn until_next_midnight(now: &DateTime<Local>) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(24 * 60 * 60);

    let Some(next_midnight) = now
        .date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    else {
        return FALLBACK;
    };

    Local
        .from_local_datetime(&next_midnight)
        .earliest()
        .and_then(|midnight| (midnight - *now).to_std().ok())
        .unwrap_or(FALLBACK)
}
