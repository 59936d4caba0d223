//! Screen hot edge.
//!
//! Dwelling at a configured screen edge toggles the overlay. See
//! [`HotEdgeMonitor`] for the dwell and cooldown rules and [`geometry`] for
//! how edges shared between monitors are excluded.

pub mod geometry;
mod monitor;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::settings::{keys, SettingsExt, SettingsStore};

pub use geometry::{Point, Rect};
pub use monitor::HotEdgeMonitor;

// ============================================================================
// HotEdge
// ============================================================================

/// Which screen edge triggers the overlay.
///
/// Persisted with the Japanese labels used by the settings UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HotEdge {
    #[serde(rename = "上")]
    Top,
    #[serde(rename = "下")]
    Bottom,
    #[serde(rename = "左")]
    Left,
    #[serde(rename = "右")]
    Right,
    #[default]
    #[serde(rename = "無効")]
    Disabled,
}

impl HotEdge {
    pub const ALL: [HotEdge; 5] = [
        HotEdge::Top,
        HotEdge::Bottom,
        HotEdge::Left,
        HotEdge::Right,
        HotEdge::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HotEdge::Top => "top",
            HotEdge::Bottom => "bottom",
            HotEdge::Left => "left",
            HotEdge::Right => "right",
            HotEdge::Disabled => "disabled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HotEdge::Top => "上",
            HotEdge::Bottom => "下",
            HotEdge::Left => "左",
            HotEdge::Right => "右",
            HotEdge::Disabled => "無効",
        }
    }

    /// Accepts either the English name or the Japanese label.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|edge| edge.as_str().eq_ignore_ascii_case(s) || edge.label() == s)
    }
}

// ============================================================================
// HotEdgeConfig
// ============================================================================

pub const THRESHOLD_RANGE: (f64, f64) = (1.0, 10.0);
pub const DELAY_RANGE: (f64, f64) = (0.1, 1.0);
pub const COOLDOWN_RANGE: (f64, f64) = (0.5, 2.0);

/// Hot-edge settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotEdgeConfig {
    pub edge: HotEdge,
    pub enabled: bool,
    /// Distance from the edge, in points, that counts as "at the edge".
    pub edge_threshold: f64,
    /// Seconds the pointer must dwell before triggering.
    pub trigger_delay: f64,
    /// Minimum seconds between two triggers without leaving the edge.
    pub cooldown: f64,
}

impl Default for HotEdgeConfig {
    fn default() -> Self {
        Self {
            edge: HotEdge::Disabled,
            enabled: false,
            edge_threshold: 3.0,
            trigger_delay: 0.3,
            cooldown: 0.5,
        }
    }
}

impl HotEdgeConfig {
    /// True when an edge is selected and monitoring is switched on.
    pub fn is_active(&self) -> bool {
        self.enabled && self.edge != HotEdge::Disabled
    }

    /// Clamps tunables into their supported ranges.
    pub fn clamped(mut self) -> Self {
        self.edge_threshold = clamp(self.edge_threshold, THRESHOLD_RANGE);
        self.trigger_delay = clamp(self.trigger_delay, DELAY_RANGE);
        self.cooldown = clamp(self.cooldown, COOLDOWN_RANGE);
        self
    }

    /// Loads persisted settings. Missing or non-positive numbers keep their
    /// defaults.
    pub fn load(settings: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let positive = |key: &str, fallback: f64| {
            settings
                .get_as::<f64>(key)
                .filter(|v| *v > 0.0)
                .unwrap_or(fallback)
        };

        Self {
            edge: settings
                .get_as::<HotEdge>(keys::HOT_EDGE_SELECTED_EDGE)
                .unwrap_or(defaults.edge),
            enabled: settings
                .get_as::<bool>(keys::HOT_EDGE_IS_ENABLED)
                .unwrap_or(defaults.enabled),
            edge_threshold: positive(keys::HOT_EDGE_EDGE_THRESHOLD, defaults.edge_threshold),
            trigger_delay: positive(keys::HOT_EDGE_TRIGGER_DELAY, defaults.trigger_delay),
            cooldown: positive(keys::HOT_EDGE_COOLDOWN, defaults.cooldown),
        }
        .clamped()
    }

    pub fn save(&self, settings: &dyn SettingsStore) {
        let writes: [(&str, serde_json::Value); 5] = [
            (keys::HOT_EDGE_SELECTED_EDGE, serde_json::json!(self.edge)),
            (keys::HOT_EDGE_IS_ENABLED, serde_json::json!(self.enabled)),
            (
                keys::HOT_EDGE_EDGE_THRESHOLD,
                serde_json::json!(self.edge_threshold),
            ),
            (
                keys::HOT_EDGE_TRIGGER_DELAY,
                serde_json::json!(self.trigger_delay),
            ),
            (keys::HOT_EDGE_COOLDOWN, serde_json::json!(self.cooldown)),
        ];
        for (key, value) in writes {
            if let Err(e) = settings.set(key, value) {
                warn!(key, error = %e, "Failed to persist hot edge setting");
            }
        }
    }
}

fn clamp(value: f64, (min, max): (f64, f64)) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    #[test]
    fn test_defaults() {
        let config = HotEdgeConfig::default();
        assert_eq!(config.edge, HotEdge::Disabled);
        assert!(!config.is_active());
        assert_eq!(config.edge_threshold, 3.0);
        assert_eq!(config.trigger_delay, 0.3);
        assert_eq!(config.cooldown, 0.5);
    }

    #[test]
    fn test_enabled_without_edge_is_inactive() {
        let config = HotEdgeConfig {
            enabled: true,
            ..HotEdgeConfig::default()
        };
        assert!(!config.is_active());
    }

    #[test]
    fn test_clamped() {
        let config = HotEdgeConfig {
            edge_threshold: 50.0,
            trigger_delay: 0.01,
            cooldown: 9.0,
            ..HotEdgeConfig::default()
        }
        .clamped();
        assert_eq!(config.edge_threshold, 10.0);
        assert_eq!(config.trigger_delay, 0.1);
        assert_eq!(config.cooldown, 2.0);
    }

    #[test]
    fn test_edge_serialized_with_labels() {
        assert_eq!(serde_json::to_string(&HotEdge::Top).unwrap(), "\"上\"");
        let edge: HotEdge = serde_json::from_str("\"右\"").unwrap();
        assert_eq!(edge, HotEdge::Right);
    }

    #[test]
    fn test_parse_edge() {
        assert_eq!(HotEdge::parse("TOP"), Some(HotEdge::Top));
        assert_eq!(HotEdge::parse("左"), Some(HotEdge::Left));
        assert_eq!(HotEdge::parse("corner"), None);
    }

    #[test]
    fn test_save_then_load() {
        let settings = MemorySettingsStore::new();
        let config = HotEdgeConfig {
            edge: HotEdge::Left,
            enabled: true,
            edge_threshold: 5.0,
            trigger_delay: 0.5,
            cooldown: 1.0,
        };
        config.save(&settings);
        assert_eq!(HotEdgeConfig::load(&settings), config);
    }

    #[test]
    fn test_load_ignores_zero_threshold() {
        let settings = MemorySettingsStore::new();
        settings
            .set_as(keys::HOT_EDGE_EDGE_THRESHOLD, &0.0f64)
            .unwrap();
        assert_eq!(HotEdgeConfig::load(&settings).edge_threshold, 3.0);
    }
}
