//! Daily session-count rollover.
//!
//! The count belongs to a local calendar day. The date of the last reset is
//! stored alongside it; whenever the stored date differs from today the
//! count starts over.

use tracing::warn;

use crate::settings::{keys, SettingsExt, SettingsStore};

/// Returns true when the stored reset date is not `today`.
pub fn needs_rollover(settings: &dyn SettingsStore, today: &str) -> bool {
    settings
        .get_as::<String>(keys::LAST_RESET_DATE)
        .as_deref()
        != Some(today)
}

/// Persists a zero count stamped with `today`.
pub fn stamp_reset(settings: &dyn SettingsStore, today: &str) {
    if let Err(e) = settings.set_as(keys::SESSION_COUNT, &0u32) {
        warn!(error = %e, "Failed to persist session count reset");
    }
    if let Err(e) = settings.set_as(keys::LAST_RESET_DATE, &today) {
        warn!(error = %e, "Failed to persist reset date");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    #[test]
    fn test_missing_date_needs_rollover() {
        let settings = MemorySettingsStore::new();
        assert!(needs_rollover(&settings, "2024-06-01"));
    }

    #[test]
    fn test_same_day_does_not_roll_over() {
        let settings = MemorySettingsStore::new();
        stamp_reset(&settings, "2024-06-01");
        assert!(!needs_rollover(&settings, "2024-06-01"));
        assert!(needs_rollover(&settings, "2024-06-02"));
    }

    #[test]
    fn test_stamp_zeroes_count() {
        let settings = MemorySettingsStore::new();
        settings.set_as(keys::SESSION_COUNT, &7u32).unwrap();
        stamp_reset(&settings, "2024-06-02");
        assert_eq!(settings.get_as::<u32>(keys::SESSION_COUNT), Some(0));
        assert_eq!(
            settings.get_as::<String>(keys::LAST_RESET_DATE).as_deref(),
            Some("2024-06-02")
        );
    }
}
