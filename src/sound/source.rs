//! Sound files and the selectable sound list.

use std::path::{Path, PathBuf};

use super::error::SoundError;

/// A playable sound file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSource {
    name: String,
    path: PathBuf,
}

impl SoundSource {
    /// Creates a source without checking the path.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// The built-in system sound called `name`.
    ///
    /// # Errors
    ///
    /// Returns `SoundError::UnknownSound` if `name` is not selectable.
    pub fn named(name: &str) -> Result<Self, SoundError> {
        let canonical = canonical_sound_name(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
        Ok(Self::new(
            canonical,
            Path::new(SYSTEM_SOUND_DIRS[0]).join(format!("{canonical}.aiff")),
        ))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sounds offered in the settings, in display order.
pub const SYSTEM_SOUND_NAMES: &[&str] = &[
    "Basso",
    "Blow",
    "Bottle",
    "Frog",
    "Funk",
    "Glass",
    "Hero",
    "Morse",
    "Ping",
    "Pop",
    "Purr",
    "Sosumi",
    "Submarine",
    "Tink",
];

/// Case-insensitive lookup in [`SYSTEM_SOUND_NAMES`].
#[must_use]
pub fn canonical_sound_name(name: &str) -> Option<&'static str> {
    SYSTEM_SOUND_NAMES
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(name.trim()))
}

/// Directories to search for system sounds, in order of priority.
const SYSTEM_SOUND_DIRS: &[&str] = &["/System/Library/Sounds", "/Library/Sounds"];

/// Rejects paths outside the system sound directories.
pub(super) fn validate_system_sound_path(path: &Path) -> Result<(), SoundError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    // Unresolved `..` components would defeat the prefix check.
    if canonical
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(SoundError::InvalidPath(path.display().to_string()));
    }

    let allowed = SYSTEM_SOUND_DIRS.iter().any(|dir| {
        let dir = Path::new(dir);
        canonical.starts_with(dir)
            || dir
                .canonicalize()
                .is_ok_and(|resolved| canonical.starts_with(resolved))
    });
    if allowed {
        Ok(())
    } else {
        Err(SoundError::InvalidPath(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_resolves_path() {
        let source = SoundSource::named("glass").unwrap();
        assert_eq!(source.name(), "Glass");
        assert_eq!(source.path(), Path::new("/System/Library/Sounds/Glass.aiff"));
    }

    #[test]
    fn test_named_rejects_unknown() {
        assert!(matches!(
            SoundSource::named("Klaxon"),
            Err(SoundError::UnknownSound(name)) if name == "Klaxon"
        ));
    }

    #[test]
    fn test_sound_names_are_sorted() {
        let mut sorted = SYSTEM_SOUND_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, SYSTEM_SOUND_NAMES);
        assert!(SYSTEM_SOUND_NAMES.contains(&"Glass"));
        assert!(SYSTEM_SOUND_NAMES.contains(&"Ping"));
    }

    #[test]
    fn test_system_paths_are_allowed() {
        assert!(validate_system_sound_path(Path::new("/System/Library/Sounds/Glass.aiff")).is_ok());
        assert!(validate_system_sound_path(Path::new("/Library/Sounds/Custom.wav")).is_ok());
        let named = SoundSource::named("Submarine").unwrap();
        assert!(validate_system_sound_path(named.path()).is_ok());
    }

    #[test]
    fn test_other_paths_are_rejected() {
        let result = validate_system_sound_path(Path::new("/tmp/evil.wav"));
        assert!(matches!(result, Err(SoundError::InvalidPath(msg)) if msg.contains("/tmp/evil.wav")));
        assert!(validate_system_sound_path(Path::new("/etc/passwd")).is_err());
        assert!(validate_system_sound_path(Path::new(
            "/System/Library/Sounds/../../../etc/passwd"
        ))
        .is_err());
    }
}
