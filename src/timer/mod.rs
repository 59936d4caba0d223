//! Pomodoro timer engine.
//!
//! This module provides the core timer functionality:
//! - State transitions (Idle → Working → Resting → Working ...)
//! - One-second ticks driven by the coordinator
//! - Event firing for sounds, window visibility and sync
//! - Daily session-count rollover

pub mod rollover;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::settings::{keys, SettingsExt, SettingsStore};
use crate::types::{
    validate_rest_minutes, validate_work_minutes, PomodoroConfig, TimerPhase, TimerSnapshot,
    TimerState,
};

// ============================================================================
// TimerEvent
// ============================================================================

/// Timer events for sounds, presenters and sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Countdown started or resumed
    Started {
        /// Phase the countdown runs in
        phase: TimerPhase,
    },
    /// Countdown paused
    Paused,
    /// Timer returned to idle
    Reset,
    /// One second elapsed
    Tick {
        /// Remaining seconds
        remaining_seconds: u32,
    },
    /// Work session completed
    WorkCompleted {
        /// Today's count including this session
        session_count: u32,
    },
    /// Rest completed
    RestCompleted,
    /// Count changed outside of a work completion
    SessionCountChanged {
        /// New count
        session_count: u32,
    },
    /// Work or rest duration changed
    DurationsChanged,
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Timer engine that manages the Pomodoro state and its persisted counters.
pub struct TimerEngine {
    /// Current timer state
    state: TimerState,
    /// Persisted counters and durations
    settings: Arc<dyn SettingsStore>,
    /// Local date source for rollover
    clock: Arc<dyn Clock>,
    /// Event sender channel
    event_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl TimerEngine {
    /// Creates an engine from persisted settings and runs the rollover check.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let config = load_config(settings.as_ref());
        let mut state = TimerState::new(config);
        state.session_count = settings.get_as::<u32>(keys::SESSION_COUNT).unwrap_or(0);

        let mut engine = Self {
            state,
            settings,
            clock,
            event_tx,
        };
        engine.check_daily_rollover();
        engine
    }

    /// Starts the countdown.
    ///
    /// From idle this begins a work session. From a paused work or rest phase
    /// it resumes without resetting the remaining time. Returns false when the
    /// countdown was already running.
    pub fn start(&mut self) -> bool {
        if self.state.is_running {
            return false;
        }

        if self.state.phase == TimerPhase::Idle {
            self.state.start_working();
        }
        self.state.is_running = true;

        debug!(phase = self.state.phase.as_str(), "Timer started");
        self.emit(TimerEvent::Started {
            phase: self.state.phase,
        });
        true
    }

    /// Pauses the countdown. Idempotent.
    pub fn pause(&mut self) {
        if !self.state.is_running {
            return;
        }
        self.state.is_running = false;
        debug!(remaining = self.state.remaining_seconds, "Timer paused");
        self.emit(TimerEvent::Paused);
    }

    /// Stops and returns to idle with a full work duration. The count is kept.
    pub fn reset(&mut self) {
        self.state.reset();
        debug!("Timer reset");
        self.emit(TimerEvent::Reset);
    }

    /// Zeroes today's count and re-stamps the rollover date.
    pub fn reset_session_count(&mut self) {
        self.state.session_count = 0;
        rollover::stamp_reset(self.settings.as_ref(), &self.clock.today());
        info!("Session count reset");
        self.emit(TimerEvent::SessionCountChanged { session_count: 0 });
    }

    /// Completes the current phase immediately. No-op while idle.
    pub fn skip_to_next(&mut self) -> bool {
        if self.state.phase == TimerPhase::Idle {
            return false;
        }
        self.state.is_running = false;
        self.complete_session();
        true
    }

    /// Advances the countdown by one second if it is running.
    pub fn tick(&mut self) {
        if !self.state.is_running {
            return;
        }

        let completed = self.state.tick();
        self.emit(TimerEvent::Tick {
            remaining_seconds: self.state.remaining_seconds,
        });

        if completed {
            self.complete_session();
        }
    }

    /// Handles phase completion.
    fn complete_session(&mut self) {
        let keep_running = self.state.config.auto_continue;

        match self.state.phase {
            TimerPhase::Working => {
                self.state.is_running = false;
                self.state.session_count += 1;
                self.persist_count();

                info!(session_count = self.state.session_count, "Work session completed");
                self.emit(TimerEvent::WorkCompleted {
                    session_count: self.state.session_count,
                });

                self.state.start_resting();
                self.state.is_running = keep_running;
            }
            TimerPhase::Resting => {
                self.state.is_running = false;
                info!("Rest completed");
                self.emit(TimerEvent::RestCompleted);

                self.state.start_working();
                self.state.is_running = keep_running;
            }
            TimerPhase::Idle => {}
        }
    }

    /// Resets the count if the local date changed since the last reset.
    ///
    /// Returns true when a rollover happened.
    pub fn check_daily_rollover(&mut self) -> bool {
        let today = self.clock.today();
        if !rollover::needs_rollover(self.settings.as_ref(), &today) {
            return false;
        }

        info!(%today, previous_count = self.state.session_count, "Daily rollover");
        self.state.session_count = 0;
        rollover::stamp_reset(self.settings.as_ref(), &today);
        self.emit(TimerEvent::SessionCountChanged { session_count: 0 });
        true
    }

    /// Writes an accepted remote count into the state and settings.
    pub fn apply_synced_count(&mut self, session_count: u32) {
        if self.state.session_count == session_count {
            return;
        }
        self.state.session_count = session_count;
        self.persist_count();
        self.emit(TimerEvent::SessionCountChanged { session_count });
    }

    /// Changes the work duration. While idle the remaining time follows.
    pub fn set_work_minutes(&mut self, minutes: u32) -> Result<(), String> {
        validate_work_minutes(minutes)?;
        self.state.config.work_minutes = minutes;
        if self.state.phase == TimerPhase::Idle {
            self.state.remaining_seconds = self.state.config.work_seconds();
        }
        self.persist(keys::WORK_DURATION_MINUTES, &minutes);
        self.emit(TimerEvent::DurationsChanged);
        Ok(())
    }

    /// Changes the rest duration. Takes effect at the next rest.
    pub fn set_rest_minutes(&mut self, minutes: u32) -> Result<(), String> {
        validate_rest_minutes(minutes)?;
        self.state.config.rest_minutes = minutes;
        self.persist(keys::REST_DURATION_MINUTES, &minutes);
        self.emit(TimerEvent::DurationsChanged);
        Ok(())
    }

    pub fn set_auto_continue(&mut self, enabled: bool) {
        self.state.config.auto_continue = enabled;
        self.persist(keys::AUTO_CONTINUE, &enabled);
    }

    /// Returns a reference to the current timer state.
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn progress(&self) -> f64 {
        self.state.progress()
    }

    pub fn time_string(&self) -> String {
        self.state.time_string()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::from_timer_state(&self.state)
    }

    /// Returns a mutable reference to the timer state (for testing).
    #[cfg(test)]
    pub fn state_mut(&mut self) -> &mut TimerState {
        &mut self.state
    }

    fn persist_count(&self) {
        self.persist(keys::SESSION_COUNT, &self.state.session_count);
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.settings.set_as(key, value) {
            warn!(key, error = %e, "Failed to persist timer setting");
        }
    }

    fn emit(&self, event: TimerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Timer event receiver dropped");
        }
    }
}

/// Reads the persisted timer configuration, falling back to defaults for
/// missing or out-of-range values.
pub fn load_config(settings: &dyn SettingsStore) -> PomodoroConfig {
    let defaults = PomodoroConfig::default();

    let work_minutes = settings
        .get_as::<u32>(keys::WORK_DURATION_MINUTES)
        .filter(|m| validate_work_minutes(*m).is_ok())
        .unwrap_or(defaults.work_minutes);
    let rest_minutes = settings
        .get_as::<u32>(keys::REST_DURATION_MINUTES)
        .filter(|m| validate_rest_minutes(*m).is_ok())
        .unwrap_or(defaults.rest_minutes);
    let auto_continue = settings
        .get_as::<bool>(keys::AUTO_CONTINUE)
        .unwrap_or(defaults.auto_continue);

    PomodoroConfig {
        work_minutes,
        rest_minutes,
        auto_continue,
    }
}

/// The idle state a new engine would start from, without persisting the
/// rollover. A stale count reads as zero.
pub fn stored_state(settings: &dyn SettingsStore, today: &str) -> TimerState {
    let mut state = TimerState::new(load_config(settings));
    if !rollover::needs_rollover(settings, today) {
        state.session_count = settings.get_as::<u32>(keys::SESSION_COUNT).unwrap_or(0);
    }
    state
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::settings::MemorySettingsStore;
    use chrono::{Local, TimeZone};

    struct Harness {
        engine: TimerEngine,
        rx: mpsc::UnboundedReceiver<TimerEvent>,
        settings: Arc<MemorySettingsStore>,
        clock: Arc<MockClock>,
    }

    fn harness_with(settings: MemorySettingsStore) -> Harness {
        let settings = Arc::new(settings);
        let clock = Arc::new(MockClock::new(
            Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = TimerEngine::new(settings.clone(), clock.clone(), tx);
        Harness {
            engine,
            rx,
            settings,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(MemorySettingsStore::new())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    mod construction_tests {
        use super::*;

        #[test]
        fn test_new_engine_defaults() {
            let h = harness();
            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Idle);
            assert_eq!(state.remaining_seconds, 1800);
            assert_eq!(state.session_count, 0);
            assert!(!state.is_running);
        }

        #[test]
        fn test_loads_persisted_durations() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::WORK_DURATION_MINUTES, &25u32).unwrap();
            settings.set_as(keys::REST_DURATION_MINUTES, &5u32).unwrap();

            let h = harness_with(settings);
            assert_eq!(h.engine.state().config.work_minutes, 25);
            assert_eq!(h.engine.state().config.rest_minutes, 5);
            assert_eq!(h.engine.state().remaining_seconds, 1500);
        }

        #[test]
        fn test_out_of_range_durations_fall_back() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::WORK_DURATION_MINUTES, &500u32).unwrap();
            let h = harness_with(settings);
            assert_eq!(h.engine.state().config.work_minutes, 30);
        }

        #[test]
        fn test_same_day_keeps_count() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::SESSION_COUNT, &3u32).unwrap();
            settings.set_as(keys::LAST_RESET_DATE, &"2024-06-01").unwrap();

            let h = harness_with(settings);
            assert_eq!(h.engine.state().session_count, 3);
        }

        #[test]
        fn test_stored_state_does_not_write() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::SESSION_COUNT, &3u32).unwrap();
            settings.set_as(keys::LAST_RESET_DATE, &"2024-05-31").unwrap();

            let stale = stored_state(&settings, "2024-06-01");
            assert_eq!(stale.session_count, 0);
            assert_eq!(stale.phase, TimerPhase::Idle);
            assert_eq!(settings.get_as::<u32>(keys::SESSION_COUNT), Some(3));
            assert_eq!(
                settings.get_as::<String>(keys::LAST_RESET_DATE).as_deref(),
                Some("2024-05-31")
            );

            let same_day = stored_state(&settings, "2024-05-31");
            assert_eq!(same_day.session_count, 3);
        }

        #[test]
        fn test_launch_on_new_day_resets_count() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::SESSION_COUNT, &3u32).unwrap();
            settings.set_as(keys::LAST_RESET_DATE, &"2024-05-31").unwrap();

            let h = harness_with(settings);
            assert_eq!(h.engine.state().session_count, 0);
            assert_eq!(
                h.settings.get_as::<String>(keys::LAST_RESET_DATE).as_deref(),
                Some("2024-06-01")
            );
        }
    }

    // ------------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------------

    mod control_tests {
        use super::*;

        #[test]
        fn test_start_from_idle_enters_working() {
            let mut h = harness();
            drain(&mut h.rx);

            assert!(h.engine.start());
            assert_eq!(h.engine.state().phase, TimerPhase::Working);
            assert_eq!(h.engine.state().remaining_seconds, 1800);
            assert!(h.engine.state().is_running);
            assert_eq!(
                drain(&mut h.rx),
                vec![TimerEvent::Started {
                    phase: TimerPhase::Working
                }]
            );
        }

        #[test]
        fn test_start_while_running_is_noop() {
            let mut h = harness();
            h.engine.start();
            h.engine.tick();
            drain(&mut h.rx);

            assert!(!h.engine.start());
            assert_eq!(h.engine.state().remaining_seconds, 1799);
            assert!(drain(&mut h.rx).is_empty());
        }

        #[test]
        fn test_pause_and_resume_keeps_remaining() {
            let mut h = harness();
            h.engine.start();
            for _ in 0..10 {
                h.engine.tick();
            }
            h.engine.pause();
            h.engine.pause();
            assert!(!h.engine.state().is_running);

            h.engine.tick();
            assert_eq!(h.engine.state().remaining_seconds, 1790);

            assert!(h.engine.start());
            assert_eq!(h.engine.state().phase, TimerPhase::Working);
            assert_eq!(h.engine.state().remaining_seconds, 1790);
        }

        #[test]
        fn test_reset_returns_to_idle_keeping_count() {
            let mut h = harness();
            h.engine.state_mut().session_count = 2;
            h.engine.start();
            h.engine.tick();

            h.engine.reset();
            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Idle);
            assert_eq!(state.remaining_seconds, 1800);
            assert!(!state.is_running);
            assert_eq!(state.session_count, 2);
        }

        #[test]
        fn test_reset_from_paused_rest() {
            let mut h = harness();
            h.engine.start();
            h.engine.skip_to_next();
            assert_eq!(h.engine.state().phase, TimerPhase::Resting);
            assert!(!h.engine.state().is_running);

            h.engine.reset();
            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Idle);
            assert_eq!(state.remaining_seconds, 1800);
            assert!(!state.is_running);
            assert_eq!(state.session_count, 1);
        }

        #[test]
        fn test_reset_from_running_rest() {
            let mut h = harness();
            h.engine.start();
            h.engine.skip_to_next();
            h.engine.start();
            h.engine.tick();
            assert!(h.engine.state().is_running);

            h.engine.reset();
            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Idle);
            assert_eq!(state.remaining_seconds, 1800);
            assert!(!state.is_running);
            assert_eq!(state.session_count, 1);
        }

        #[test]
        fn test_reset_from_paused_work() {
            let mut h = harness();
            h.engine.start();
            h.engine.tick();
            h.engine.pause();

            h.engine.reset();
            assert_eq!(h.engine.state().phase, TimerPhase::Idle);
            assert_eq!(h.engine.state().remaining_seconds, 1800);
            assert!(!h.engine.state().is_running);
        }

        #[test]
        fn test_reset_session_count() {
            let mut h = harness();
            h.engine.start();
            h.engine.skip_to_next();
            assert_eq!(h.engine.state().session_count, 1);
            h.engine.start();
            h.engine.tick();
            h.engine.tick();
            let before = h.engine.state().clone();
            assert!(before.is_running);

            h.clock
                .set(Local.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap());
            h.engine.reset_session_count();
            let state = h.engine.state();
            assert_eq!(state.session_count, 0);
            assert_eq!(state.phase, before.phase);
            assert_eq!(state.remaining_seconds, before.remaining_seconds);
            assert_eq!(state.remaining_seconds, 598);
            assert_eq!(state.is_running, before.is_running);
            assert_eq!(h.settings.get_as::<u32>(keys::SESSION_COUNT), Some(0));
        }
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    mod completion_tests {
        use super::*;

        #[test]
        fn test_work_completion_enters_rest_paused() {
            let mut h = harness();
            h.engine.start();
            h.engine.state_mut().remaining_seconds = 1;
            drain(&mut h.rx);

            h.engine.tick();

            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Resting);
            assert_eq!(state.remaining_seconds, 600);
            assert_eq!(state.session_count, 1);
            assert!(!state.is_running);
            assert_eq!(h.settings.get_as::<u32>(keys::SESSION_COUNT), Some(1));
            assert_eq!(
                drain(&mut h.rx),
                vec![
                    TimerEvent::Tick {
                        remaining_seconds: 0
                    },
                    TimerEvent::WorkCompleted { session_count: 1 },
                ]
            );
        }

        #[test]
        fn test_rest_completion_enters_work_without_count() {
            let mut h = harness();
            h.engine.start();
            h.engine.skip_to_next();
            h.engine.start();
            h.engine.state_mut().remaining_seconds = 1;
            drain(&mut h.rx);

            h.engine.tick();

            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Working);
            assert_eq!(state.remaining_seconds, 1800);
            assert_eq!(state.session_count, 1);
            assert!(!state.is_running);
            assert!(drain(&mut h.rx).contains(&TimerEvent::RestCompleted));
        }

        #[test]
        fn test_auto_continue_keeps_running() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::AUTO_CONTINUE, &true).unwrap();
            let mut h = harness_with(settings);

            h.engine.start();
            h.engine.state_mut().remaining_seconds = 1;
            h.engine.tick();

            assert_eq!(h.engine.state().phase, TimerPhase::Resting);
            assert!(h.engine.state().is_running);
        }

        #[test]
        fn test_skip_from_idle_is_noop() {
            let mut h = harness();
            drain(&mut h.rx);

            assert!(!h.engine.skip_to_next());
            assert_eq!(h.engine.state().phase, TimerPhase::Idle);
            assert_eq!(h.engine.state().session_count, 0);
            assert!(drain(&mut h.rx).is_empty());
        }

        #[test]
        fn test_skip_from_paused_work_counts_session() {
            let mut h = harness();
            h.engine.start();
            h.engine.pause();

            assert!(h.engine.skip_to_next());
            assert_eq!(h.engine.state().phase, TimerPhase::Resting);
            assert_eq!(h.engine.state().session_count, 1);
            assert!(!h.engine.state().is_running);
        }

        #[test]
        fn test_full_work_session_by_ticks() {
            let settings = MemorySettingsStore::new();
            settings.set_as(keys::WORK_DURATION_MINUTES, &1u32).unwrap();
            let mut h = harness_with(settings);

            h.engine.start();
            for _ in 0..59 {
                h.engine.tick();
            }
            assert_eq!(h.engine.state().phase, TimerPhase::Working);
            assert_eq!(h.engine.state().remaining_seconds, 1);

            h.engine.tick();
            let state = h.engine.state();
            assert_eq!(state.phase, TimerPhase::Resting);
            assert_eq!(state.remaining_seconds, state.config.rest_seconds());
            assert_eq!(state.session_count, 1);
        }
    }

    // ------------------------------------------------------------------------
    // Settings and sync hooks
    // ------------------------------------------------------------------------

    mod adjustment_tests {
        use super::*;

        #[test]
        fn test_set_work_minutes_while_idle_updates_remaining() {
            let mut h = harness();
            h.engine.set_work_minutes(45).unwrap();
            assert_eq!(h.engine.state().remaining_seconds, 2700);
            assert_eq!(
                h.settings.get_as::<u32>(keys::WORK_DURATION_MINUTES),
                Some(45)
            );
        }

        #[test]
        fn test_set_work_minutes_while_working_keeps_remaining() {
            let mut h = harness();
            h.engine.start();
            h.engine.tick();
            h.engine.set_work_minutes(45).unwrap();
            assert_eq!(h.engine.state().remaining_seconds, 1799);
        }

        #[test]
        fn test_set_minutes_rejects_out_of_range() {
            let mut h = harness();
            assert!(h.engine.set_work_minutes(0).is_err());
            assert!(h.engine.set_rest_minutes(61).is_err());
            assert_eq!(h.engine.state().config, PomodoroConfig::default());
        }

        #[test]
        fn test_apply_synced_count() {
            let mut h = harness();
            drain(&mut h.rx);

            h.engine.apply_synced_count(5);
            assert_eq!(h.engine.state().session_count, 5);
            assert_eq!(h.settings.get_as::<u32>(keys::SESSION_COUNT), Some(5));
            assert_eq!(
                drain(&mut h.rx),
                vec![TimerEvent::SessionCountChanged { session_count: 5 }]
            );

            h.engine.apply_synced_count(5);
            assert!(drain(&mut h.rx).is_empty());
        }

        #[test]
        fn test_midnight_rollover() {
            let mut h = harness();
            h.engine.start();
            h.engine.skip_to_next();
            assert!(!h.engine.check_daily_rollover());

            h.clock
                .set(Local.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
            assert!(h.engine.check_daily_rollover());
            assert_eq!(h.engine.state().session_count, 0);
            assert!(!h.engine.check_daily_rollover());
        }

        #[test]
        fn test_progress_and_time_string() {
            let mut h = harness();
            assert_eq!(h.engine.progress(), 0.0);
            assert_eq!(h.engine.time_string(), "30:00");

            h.engine.start();
            for _ in 0..900 {
                h.engine.tick();
            }
            assert!((h.engine.progress() - 0.5).abs() < 1e-9);
            assert_eq!(h.engine.time_string(), "15:00");
        }
    }
}
