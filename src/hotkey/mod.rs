//! Global hotkey binding and matching.
//!
//! Modifier bits follow the macOS event-flag layout so bindings persisted by
//! the native shell and by this crate are interchangeable.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::settings::{keys, SettingsExt, SettingsStore};

// ============================================================================
// ModifierFlags
// ============================================================================

/// Set of modifier keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierFlags(u64);

impl ModifierFlags {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(1 << 17);
    pub const CONTROL: Self = Self(1 << 18);
    pub const OPTION: Self = Self(1 << 19);
    pub const COMMAND: Self = Self(1 << 20);

    /// Bits that describe device-independent modifier state.
    pub const DEVICE_INDEPENDENT_MASK: u64 = 0xffff_0000;

    /// Wraps raw event flags, discarding device-dependent bits.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw & Self::DEVICE_INDEPENDENT_MASK)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ModifierFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ModifierFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ModifierFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::CONTROL) {
            f.write_str("⌃")?;
        }
        if self.contains(Self::OPTION) {
            f.write_str("⌥")?;
        }
        if self.contains(Self::SHIFT) {
            f.write_str("⇧")?;
        }
        if self.contains(Self::COMMAND) {
            f.write_str("⌘")?;
        }
        Ok(())
    }
}

// ============================================================================
// HotKeyBinding
// ============================================================================

/// Key code of the "I" key.
pub const KEY_CODE_I: u16 = 34;

/// A modifier set plus a hardware key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotKeyBinding {
    pub modifiers: ModifierFlags,
    pub key_code: u16,
}

impl Default for HotKeyBinding {
    /// Control + I.
    fn default() -> Self {
        Self {
            modifiers: ModifierFlags::CONTROL,
            key_code: KEY_CODE_I,
        }
    }
}

impl HotKeyBinding {
    pub fn new(modifiers: ModifierFlags, key_code: u16) -> Self {
        Self {
            modifiers,
            key_code,
        }
    }

    /// Returns true when a key-down event with these raw modifier flags and
    /// key code triggers the binding.
    ///
    /// The modifier set must match exactly after masking; extra modifiers
    /// mean no match.
    pub fn matches(&self, raw_modifiers: u64, key_code: u16) -> bool {
        ModifierFlags::from_raw(raw_modifiers) == self.modifiers && key_code == self.key_code
    }

    /// Human-readable form such as `⌃I`.
    pub fn display_string(&self) -> String {
        format!("{}{}", self.modifiers, key_name(self.key_code))
    }

    /// Loads the persisted binding, falling back to the default.
    pub fn load(settings: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let modifiers = settings
            .get_as::<u64>(keys::HOTKEY_MODIFIER_FLAGS)
            .map(ModifierFlags::from_raw)
            .unwrap_or(defaults.modifiers);
        let key_code = settings
            .get_as::<u16>(keys::HOTKEY_KEY_CODE)
            .unwrap_or(defaults.key_code);
        Self {
            modifiers,
            key_code,
        }
    }

    /// Persists the binding.
    pub fn save(&self, settings: &dyn SettingsStore) {
        if let Err(e) = settings.set_as(keys::HOTKEY_MODIFIER_FLAGS, &self.modifiers.bits()) {
            warn!(error = %e, "Failed to persist hotkey modifiers");
        }
        if let Err(e) = settings.set_as(keys::HOTKEY_KEY_CODE, &self.key_code) {
            warn!(error = %e, "Failed to persist hotkey key code");
        }
    }

    /// Parses a binding such as `ctrl+shift+i` or `cmd+space`.
    ///
    /// At least one modifier is required so a bare key never becomes global.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut modifiers = ModifierFlags::NONE;
        let mut key_code = None;

        for part in spec.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "⌃" => modifiers |= ModifierFlags::CONTROL,
                "opt" | "option" | "alt" | "⌥" => modifiers |= ModifierFlags::OPTION,
                "shift" | "⇧" => modifiers |= ModifierFlags::SHIFT,
                "cmd" | "command" | "⌘" => modifiers |= ModifierFlags::COMMAND,
                _ => {
                    if key_code.is_some() {
                        return Err(format!("キーが複数指定されています: {spec}"));
                    }
                    key_code = Some(
                        key_code_for(part).ok_or_else(|| format!("不明なキーです: {part}"))?,
                    );
                }
            }
        }

        let key_code = key_code.ok_or_else(|| format!("キーが指定されていません: {spec}"))?;
        if modifiers.is_empty() {
            return Err("修飾キーを1つ以上指定してください".to_string());
        }
        Ok(Self::new(modifiers, key_code))
    }
}

impl fmt::Display for HotKeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

// ============================================================================
// Key names
// ============================================================================

const KEY_NAMES: &[(u16, &str)] = &[
    (0, "A"),
    (1, "S"),
    (2, "D"),
    (3, "F"),
    (4, "H"),
    (5, "G"),
    (6, "Z"),
    (7, "X"),
    (8, "C"),
    (9, "V"),
    (11, "B"),
    (12, "Q"),
    (13, "W"),
    (14, "E"),
    (15, "R"),
    (16, "Y"),
    (17, "T"),
    (18, "1"),
    (19, "2"),
    (20, "3"),
    (21, "4"),
    (22, "6"),
    (23, "5"),
    (24, "="),
    (25, "9"),
    (26, "7"),
    (27, "-"),
    (28, "8"),
    (29, "0"),
    (30, "]"),
    (31, "O"),
    (32, "U"),
    (33, "["),
    (34, "I"),
    (35, "P"),
    (36, "Return"),
    (37, "L"),
    (38, "J"),
    (39, "'"),
    (40, "K"),
    (41, ";"),
    (42, "\\"),
    (43, ","),
    (44, "/"),
    (45, "N"),
    (46, "M"),
    (47, "."),
    (48, "Tab"),
    (49, "Space"),
    (50, "`"),
    (51, "Delete"),
    (53, "Escape"),
    (123, "←"),
    (124, "→"),
    (125, "↓"),
    (126, "↑"),
];

/// Display name of a key code. Unknown codes render as `Key<n>`.
pub fn key_name(key_code: u16) -> String {
    KEY_NAMES
        .iter()
        .find(|(code, _)| *code == key_code)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("Key{key_code}"))
}

/// Key code for a display name, case-insensitive.
pub fn key_code_for(name: &str) -> Option<u16> {
    KEY_NAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    mod matching_tests {
        use super::*;

        #[test]
        fn test_exact_match() {
            let binding = HotKeyBinding::default();
            assert!(binding.matches(ModifierFlags::CONTROL.bits(), KEY_CODE_I));
        }

        #[test]
        fn test_device_dependent_bits_are_ignored() {
            let binding = HotKeyBinding::default();
            // Device-specific left-control bits live below the mask.
            let raw = ModifierFlags::CONTROL.bits() | 0x0001 | 0x0100;
            assert!(binding.matches(raw, KEY_CODE_I));
        }

        #[test]
        fn test_extra_modifier_does_not_match() {
            let binding = HotKeyBinding::default();
            let raw = (ModifierFlags::CONTROL | ModifierFlags::SHIFT).bits();
            assert!(!binding.matches(raw, KEY_CODE_I));
        }

        #[test]
        fn test_missing_modifier_does_not_match() {
            let binding = HotKeyBinding::new(
                ModifierFlags::CONTROL | ModifierFlags::COMMAND,
                KEY_CODE_I,
            );
            assert!(!binding.matches(ModifierFlags::CONTROL.bits(), KEY_CODE_I));
        }

        #[test]
        fn test_other_key_does_not_match() {
            let binding = HotKeyBinding::default();
            assert!(!binding.matches(ModifierFlags::CONTROL.bits(), 31));
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_default_display() {
            assert_eq!(HotKeyBinding::default().display_string(), "⌃I");
        }

        #[test]
        fn test_modifier_order() {
            let all = ModifierFlags::COMMAND
                | ModifierFlags::SHIFT
                | ModifierFlags::OPTION
                | ModifierFlags::CONTROL;
            assert_eq!(HotKeyBinding::new(all, 49).display_string(), "⌃⌥⇧⌘Space");
        }

        #[test]
        fn test_unknown_key_name() {
            assert_eq!(key_name(200), "Key200");
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_default_form() {
            assert_eq!(
                HotKeyBinding::parse("ctrl+i").unwrap(),
                HotKeyBinding::default()
            );
        }

        #[test]
        fn test_parse_multiple_modifiers() {
            let binding = HotKeyBinding::parse("Cmd + Shift + Space").unwrap();
            assert_eq!(
                binding.modifiers,
                ModifierFlags::COMMAND | ModifierFlags::SHIFT
            );
            assert_eq!(binding.key_code, 49);
        }

        #[test]
        fn test_parse_errors() {
            assert!(HotKeyBinding::parse("i").is_err());
            assert!(HotKeyBinding::parse("ctrl").is_err());
            assert!(HotKeyBinding::parse("ctrl+i+o").is_err());
            assert!(HotKeyBinding::parse("ctrl+f13").is_err());
        }
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn test_load_default_when_missing() {
            let settings = MemorySettingsStore::new();
            assert_eq!(HotKeyBinding::load(&settings), HotKeyBinding::default());
        }

        #[test]
        fn test_save_then_load() {
            let settings = MemorySettingsStore::new();
            let binding = HotKeyBinding::new(ModifierFlags::OPTION, 49);
            binding.save(&settings);

            assert_eq!(
                settings.get_as::<u64>(keys::HOTKEY_MODIFIER_FLAGS),
                Some(1 << 19)
            );
            assert_eq!(HotKeyBinding::load(&settings), binding);
        }
    }
}
