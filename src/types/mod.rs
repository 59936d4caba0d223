//! Core data types for the Flyt timer.
//!
//! This module defines the data structures used for:
//! - Timer phase and state management
//! - Timer configuration with validation
//! - The read-only snapshot published to presenters

use serde::{Deserialize, Serialize};

// ============================================================================
// TimerPhase
// ============================================================================

/// Represents the current phase of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// No session in progress
    #[default]
    Idle,
    /// Currently in a work session
    Working,
    /// Currently resting
    Resting,
}

impl TimerPhase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Working => "working",
            TimerPhase::Resting => "resting",
        }
    }

    /// Japanese label used by the presenters.
    pub fn label(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "待機中",
            TimerPhase::Working => "作業中",
            TimerPhase::Resting => "休憩中",
        }
    }
}

// ============================================================================
// PomodoroConfig
// ============================================================================

/// Default work duration in minutes.
pub const DEFAULT_WORK_MINUTES: u32 = 30;
/// Default rest duration in minutes.
pub const DEFAULT_REST_MINUTES: u32 = 10;

/// Configuration for the Pomodoro timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroConfig {
    /// Work duration in minutes (1-120)
    pub work_minutes: u32,
    /// Rest duration in minutes (1-60)
    pub rest_minutes: u32,
    /// Whether the next phase keeps running after a transition
    pub auto_continue: bool,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_minutes: DEFAULT_WORK_MINUTES,
            rest_minutes: DEFAULT_REST_MINUTES,
            auto_continue: false,
        }
    }
}

impl PomodoroConfig {
    /// Work duration in seconds.
    pub fn work_seconds(&self) -> u32 {
        self.work_minutes * 60
    }

    /// Rest duration in seconds.
    pub fn rest_seconds(&self) -> u32 {
        self.rest_minutes * 60
    }
}

/// Validates a work duration in minutes.
pub fn validate_work_minutes(minutes: u32) -> Result<(), String> {
    if !(1..=120).contains(&minutes) {
        return Err("作業時間は1-120分の範囲で指定してください".to_string());
    }
    Ok(())
}

/// Validates a rest duration in minutes.
pub fn validate_rest_minutes(minutes: u32) -> Result<(), String> {
    if !(1..=60).contains(&minutes) {
        return Err("休憩時間は1-60分の範囲で指定してください".to_string());
    }
    Ok(())
}

// ============================================================================
// TimerState
// ============================================================================

/// Represents the current state of the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Current phase of the timer
    pub phase: TimerPhase,
    /// Remaining seconds in the current phase
    pub remaining_seconds: u32,
    /// Number of work sessions completed today
    pub session_count: u32,
    /// Whether the countdown is advancing
    pub is_running: bool,
    /// Timer configuration
    pub config: PomodoroConfig,
}

impl TimerState {
    /// Creates a new idle state with a full work duration loaded.
    pub fn new(config: PomodoroConfig) -> Self {
        Self {
            phase: TimerPhase::Idle,
            remaining_seconds: config.work_seconds(),
            session_count: 0,
            is_running: false,
            config,
        }
    }

    /// Enters the work phase with a full work duration.
    pub fn start_working(&mut self) {
        self.phase = TimerPhase::Working;
        self.remaining_seconds = self.config.work_seconds();
    }

    /// Enters the rest phase with a full rest duration.
    pub fn start_resting(&mut self) {
        self.phase = TimerPhase::Resting;
        self.remaining_seconds = self.config.rest_seconds();
    }

    /// Returns to idle with the work duration loaded.
    pub fn reset(&mut self) {
        self.phase = TimerPhase::Idle;
        self.remaining_seconds = self.config.work_seconds();
        self.is_running = false;
    }

    /// Decrements the timer by one second.
    ///
    /// Returns true if the timer has completed (reached 0).
    pub fn tick(&mut self) -> bool {
        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
        }
        self.remaining_seconds == 0
    }

    /// Full duration of the current phase in seconds. Idle counts as work.
    pub fn total_seconds(&self) -> u32 {
        match self.phase {
            TimerPhase::Idle | TimerPhase::Working => self.config.work_seconds(),
            TimerPhase::Resting => self.config.rest_seconds(),
        }
    }

    /// Fraction of the current phase already elapsed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        let total = self.total_seconds();
        if total == 0 {
            return 0.0;
        }
        let ratio = 1.0 - f64::from(self.remaining_seconds) / f64::from(total);
        ratio.clamp(0.0, 1.0)
    }

    /// Remaining time formatted as `MM:SS`.
    pub fn time_string(&self) -> String {
        format_mm_ss(self.remaining_seconds)
    }
}

/// Formats seconds as zero-padded `MM:SS`.
pub fn format_mm_ss(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

// ============================================================================
// TimerSnapshot
// ============================================================================

/// Read-only view of the timer handed to presenters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: u32,
    #[serde(rename = "sessionCount")]
    pub session_count: u32,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    pub progress: f64,
    #[serde(rename = "timeString")]
    pub time_string: String,
}

impl TimerSnapshot {
    /// Captures the given timer state.
    pub fn from_timer_state(state: &TimerState) -> Self {
        Self {
            phase: state.phase,
            remaining_seconds: state.remaining_seconds,
            session_count: state.session_count,
            is_running: state.is_running,
            progress: state.progress(),
            time_string: state.time_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
