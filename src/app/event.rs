//! Messages into and out of the coordinator.

use crate::auth::AuthIdentity;
use crate::hotedge::{HotEdgeConfig, Point, Rect};
use crate::hotkey::HotKeyBinding;
use crate::sound::SoundSettings;
use crate::sync::SyncStatus;
use crate::types::TimerSnapshot;

/// Raw input delivered by the platform layer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A key press with the raw modifier bits of the event.
    KeyDown { modifiers: u64, key_code: u16 },
    /// A pointer sample with the current screen frames.
    PointerMoved { point: Point, screens: Vec<Rect> },
}

/// Requests handled by [`super::App`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Start,
    Pause,
    Reset,
    ResetSessionCount,
    SkipToNext,
    Toggle,
    Show,
    Pull { allow_decrease: bool },
    Push,
    Input(InputEvent),
    SetWorkMinutes(u32),
    SetRestMinutes(u32),
    SetAutoContinue(bool),
    SetHotKey(HotKeyBinding),
    SetHotEdge(HotEdgeConfig),
    SetSounds(SoundSettings),
    SignIn { redirect_url: String },
    SignOut,
    Shutdown,
}

/// Notifications for the presenter.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Hotkey or hot edge fired.
    ToggleVisibility,
    /// Bring the window forward.
    Show,
    Timer(TimerSnapshot),
    SessionCompleted { session_count: u32 },
    SyncStatusChanged(SyncStatus),
    AuthChanged(AuthIdentity),
    AuthFailed(String),
    /// A setting update was refused.
    SettingRejected(String),
}
