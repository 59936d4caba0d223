//! Completion sounds.
//!
//! Each phase has its own configurable sound: [`SoundSettings::work`] plays
//! when a work session completes, [`SoundSettings::rest`] when a rest ends.
//! Either can be set to "なし" (none).
//!
//! ```text
//! SoundSettings ──▶ SoundChoice ──▶ SoundSource ──▶ SoundPlayer
//!   (settings)       (Named/None)     (file path)     (rodio thread)
//! ```

mod error;
mod player;
mod source;

pub use error::SoundError;
pub use player::{try_create_player, RodioSoundPlayer};
pub use source::{canonical_sound_name, SoundSource, SYSTEM_SOUND_NAMES};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::settings::{keys, SettingsExt, SettingsStore};

/// Sound playback.
pub trait SoundPlayer: Send + Sync + fmt::Debug {
    /// Starts playing `source` without waiting for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot be started.
    fn play(&self, source: &SoundSource) -> Result<(), SoundError>;
}

// ============================================================================
// Sound choice
// ============================================================================

/// Label stored for "no sound".
pub const NONE_LABEL: &str = "なし";

pub const DEFAULT_WORK_SOUND: &str = "Glass";
pub const DEFAULT_REST_SOUND: &str = "Ping";

/// A configured sound: silence or one of [`SYSTEM_SOUND_NAMES`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundChoice {
    None,
    Named(&'static str),
}

impl SoundChoice {
    /// Parses a sound name, "なし" or "none".
    ///
    /// # Errors
    ///
    /// Returns `SoundError::UnknownSound` for names outside the list.
    pub fn parse(value: &str) -> Result<Self, SoundError> {
        let trimmed = value.trim();
        if trimmed == NONE_LABEL || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        canonical_sound_name(trimmed)
            .map(Self::Named)
            .ok_or_else(|| SoundError::UnknownSound(value.to_string()))
    }

    /// The value persisted in settings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => NONE_LABEL,
            Self::Named(name) => name,
        }
    }

    /// The file to play, or `None` for silence.
    pub fn source(&self) -> Option<SoundSource> {
        match self {
            Self::None => None,
            Self::Named(name) => SoundSource::named(name).ok(),
        }
    }
}

impl fmt::Display for SoundChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-phase completion sounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSettings {
    pub work: SoundChoice,
    pub rest: SoundChoice,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            work: SoundChoice::Named(DEFAULT_WORK_SOUND),
            rest: SoundChoice::Named(DEFAULT_REST_SOUND),
        }
    }
}

impl SoundSettings {
    /// Reads both choices. Unknown stored names fall back to the defaults.
    pub fn load(settings: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: SoundChoice| {
            match settings.get_as::<String>(key) {
                Some(stored) => SoundChoice::parse(&stored).unwrap_or_else(|e| {
                    warn!(key, error = %e, "Ignoring stored sound");
                    fallback
                }),
                None => fallback,
            }
        };
        Self {
            work: read(keys::WORK_COMPLETE_SOUND, defaults.work),
            rest: read(keys::REST_COMPLETE_SOUND, defaults.rest),
        }
    }

    /// Writes both choices.
    ///
    /// # Errors
    ///
    /// Returns the settings write error.
    pub fn save(&self, settings: &dyn SettingsStore) -> Result<(), crate::settings::SettingsError> {
        settings.set_as(keys::WORK_COMPLETE_SOUND, &self.work.label())?;
        settings.set_as(keys::REST_COMPLETE_SOUND, &self.rest.label())
    }
}

/// Plays `choice` if it names a sound. Failures are logged, never returned.
pub fn play_choice(player: Option<&dyn SoundPlayer>, choice: &SoundChoice) {
    let Some(source) = choice.source() else {
        return;
    };
    let Some(player) = player else {
        debug!(sound = source.name(), "No audio device; skipping sound");
        return;
    };
    if let Err(e) = player.play(&source) {
        warn!(
            sound = source.name(),
            error = %e,
            hint = e.suggestion(),
            "Failed to play sound"
        );
    }
}

// ============================================================================
// MockSoundPlayer
// ============================================================================

/// Mock sound player for testing.
#[derive(Debug)]
pub struct MockSoundPlayer {
    play_calls: Mutex<Vec<SoundSource>>,
    should_fail: AtomicBool,
}

impl Default for MockSoundPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSoundPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            play_calls: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn play_count(&self) -> usize {
        self.calls().len()
    }

    /// Names of the sounds played so far, in order.
    #[must_use]
    pub fn played_names(&self) -> Vec<String> {
        self.calls().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn clear_calls(&self) {
        self.play_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn calls(&self) -> Vec<SoundSource> {
        self.play_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SoundPlayer for MockSoundPlayer {
    fn play(&self, source: &SoundSource) -> Result<(), SoundError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(SoundError::PlaybackError("Mock failure".to_string()));
        }
        self.play_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    mod choice_tests {
        use super::*;

        #[test]
        fn test_parse() {
            assert_eq!(SoundChoice::parse("なし").unwrap(), SoundChoice::None);
            assert_eq!(SoundChoice::parse("none").unwrap(), SoundChoice::None);
            assert_eq!(SoundChoice::parse("tink").unwrap(), SoundChoice::Named("Tink"));
            assert!(SoundChoice::parse("Klaxon").is_err());
        }

        #[test]
        fn test_none_has_no_source() {
            assert!(SoundChoice::None.source().is_none());
            let source = SoundChoice::Named("Hero").source().unwrap();
            assert_eq!(source.name(), "Hero");
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let store = MemorySettingsStore::new();
            let sounds = SoundSettings::load(&store);
            assert_eq!(sounds.work, SoundChoice::Named("Glass"));
            assert_eq!(sounds.rest, SoundChoice::Named("Ping"));
        }

        #[test]
        fn test_save_and_load() {
            let store = MemorySettingsStore::new();
            let sounds = SoundSettings {
                work: SoundChoice::None,
                rest: SoundChoice::Named("Pop"),
            };
            sounds.save(&store).unwrap();
            assert_eq!(
                store.get_as::<String>(keys::WORK_COMPLETE_SOUND).as_deref(),
                Some("なし")
            );
            assert_eq!(SoundSettings::load(&store), sounds);
        }

        #[test]
        fn test_unknown_stored_name_falls_back() {
            let store = MemorySettingsStore::new();
            store.set_as(keys::REST_COMPLETE_SOUND, &"Klaxon").unwrap();
            assert_eq!(SoundSettings::load(&store).rest, SoundChoice::Named("Ping"));
        }
    }

    mod playback_tests {
        use super::*;

        #[test]
        fn test_play_choice() {
            let player = MockSoundPlayer::new();
            play_choice(Some(&player), &SoundChoice::Named("Glass"));
            play_choice(Some(&player), &SoundChoice::None);
            assert_eq!(player.played_names(), vec!["Glass"]);
        }

        #[test]
        fn test_play_choice_swallows_errors() {
            let player = MockSoundPlayer::new();
            player.set_should_fail(true);
            play_choice(Some(&player), &SoundChoice::Named("Glass"));
            play_choice(None, &SoundChoice::Named("Glass"));
            assert_eq!(player.play_count(), 0);
        }
    }
}
