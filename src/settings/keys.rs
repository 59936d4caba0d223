//! Persisted setting key names.
//!
//! The names match the keys used by earlier releases so existing settings
//! files keep working.

pub const WORK_DURATION_MINUTES: &str = "workDurationMinutes";
pub const REST_DURATION_MINUTES: &str = "restDurationMinutes";
pub const AUTO_CONTINUE: &str = "autoContinue";

/// Written only by the timer.
pub const SESSION_COUNT: &str = "sessionCount";
/// Written only by the timer.
pub const LAST_RESET_DATE: &str = "lastResetDate";

/// Written only by the sync engine.
pub const LAST_UPDATED: &str = "lastUpdated";
/// Written only by the sync engine.
pub const DEVICE_ID: &str = "deviceId";

pub const HAS_USER_LOGGED_IN: &str = "hasUserLoggedIn";
pub const AUTH_SESSION: &str = "authSession";

pub const HOTKEY_MODIFIER_FLAGS: &str = "HotKeyModifierFlags";
pub const HOTKEY_KEY_CODE: &str = "HotKeyKeyCode";

pub const HOT_EDGE_SELECTED_EDGE: &str = "HotEdgeSelectedEdge";
pub const HOT_EDGE_IS_ENABLED: &str = "HotEdgeIsEnabled";
pub const HOT_EDGE_EDGE_THRESHOLD: &str = "HotEdgeEdgeThreshold";
pub const HOT_EDGE_TRIGGER_DELAY: &str = "HotEdgeTriggerDelay";
pub const HOT_EDGE_COOLDOWN: &str = "HotEdgeCooldown";

pub const WORK_COMPLETE_SOUND: &str = "workCompleteSound";
pub const REST_COMPLETE_SOUND: &str = "restCompleteSound";
