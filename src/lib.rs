//! Flyt core library.
//!
//! The coordination core of a floating Pomodoro overlay:
//! - Timer state machine with daily session-count rollover
//! - Global hotkey matching and a dwell/cooldown screen hot edge
//! - Session count sync through Supabase (pull/push, conflict policy,
//!   periodic and realtime triggers)
//! - Auth session holder
//! - Persistent settings store
//! - Completion sounds
//! - The event-loop coordinator and the `flyt` CLI

pub mod app;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod hotedge;
pub mod hotkey;
pub mod settings;
pub mod sound;
pub mod sync;
pub mod timer;
pub mod types;

// Re-export commonly used types for convenience
pub use app::{App, AppCommand, AppHandle, AppServices, InputEvent, UiEvent};
pub use auth::{AuthIdentity, AuthManager, AuthProvider, AuthSession, MockAuthProvider};
pub use clock::{Clock, MockClock, SystemClock};
pub use hotedge::{HotEdge, HotEdgeConfig, HotEdgeMonitor, Point, Rect};
pub use hotkey::{HotKeyBinding, ModifierFlags};
pub use settings::{JsonFileStore, MemorySettingsStore, SettingsExt, SettingsStore};
pub use sound::{MockSoundPlayer, SoundChoice, SoundPlayer, SoundSettings};
pub use sync::{
    InMemoryRemoteStore, PullOutcome, PushOutcome, RemoteStore, SyncEngine, SyncError, SyncRecord,
    SyncStatus,
};
pub use timer::{TimerEngine, TimerEvent};
pub use types::{PomodoroConfig, TimerPhase, TimerSnapshot, TimerState};
