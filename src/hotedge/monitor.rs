//! Dwell-and-cooldown state machine for the hot edge.
//!
//! The monitor is fed pointer samples and polled at its deadline by the
//! coordinator. It never sleeps itself; time is always passed in so tests can
//! drive it with a paused tokio clock.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::geometry::{edge_condition, Point, Rect};
use super::HotEdgeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    /// No delay pending. A sample at the edge arms the delay.
    Waiting,
    /// At the edge, firing at the deadline.
    Armed { deadline: Instant },
    /// At the edge after a firing blocked by the cooldown. Leaving the edge
    /// is the only way back.
    Suppressed,
}

/// Turns pointer samples into hot-edge triggers.
#[derive(Debug)]
pub struct HotEdgeMonitor {
    config: HotEdgeConfig,
    state: EdgeState,
    last_triggered: Option<Instant>,
}

impl HotEdgeMonitor {
    pub fn new(config: HotEdgeConfig) -> Self {
        Self {
            config,
            state: EdgeState::Waiting,
            last_triggered: None,
        }
    }

    pub fn config(&self) -> &HotEdgeConfig {
        &self.config
    }

    /// Replaces the configuration and drops any pending delay.
    pub fn set_config(&mut self, config: HotEdgeConfig) {
        debug!(
            edge = config.edge.as_str(),
            enabled = config.enabled,
            "Hot edge reconfigured"
        );
        self.config = config;
        self.state = EdgeState::Waiting;
        self.last_triggered = None;
    }

    /// True while the monitor reacts to pointer samples.
    pub fn is_monitoring(&self) -> bool {
        self.config.is_active()
    }

    /// Feeds one pointer sample.
    pub fn on_pointer_moved(&mut self, point: Point, screens: &[Rect], now: Instant) {
        if !self.is_monitoring() {
            return;
        }

        let at_edge = edge_condition(
            self.config.edge,
            point,
            screens,
            self.config.edge_threshold,
        );

        if at_edge {
            if self.state == EdgeState::Waiting {
                let deadline = now + self.trigger_delay();
                trace!(?deadline, "Hot edge armed");
                self.state = EdgeState::Armed { deadline };
            }
        } else {
            if self.state != EdgeState::Waiting {
                trace!("Hot edge left");
            }
            self.state = EdgeState::Waiting;
            self.last_triggered = None;
        }
    }

    /// Fires if the pending delay has elapsed.
    ///
    /// Returns true when the trigger fired.
    pub fn poll(&mut self, now: Instant) -> bool {
        let EdgeState::Armed { deadline } = self.state else {
            return false;
        };
        if now < deadline {
            return false;
        }

        if let Some(last) = self.last_triggered {
            if now.duration_since(last) < self.cooldown() {
                debug!("Hot edge trigger suppressed by cooldown");
                self.state = EdgeState::Suppressed;
                return false;
            }
        }

        debug!("Hot edge triggered");
        self.last_triggered = Some(now);
        self.state = EdgeState::Waiting;
        true
    }

    /// Instant at which [`poll`](Self::poll) should next be called.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            EdgeState::Armed { deadline } => Some(deadline),
            EdgeState::Waiting | EdgeState::Suppressed => None,
        }
    }

    fn trigger_delay(&self) -> Duration {
        seconds_to_duration(self.config.trigger_delay)
    }

    fn cooldown(&self) -> Duration {
        seconds_to_duration(self.config.cooldown)
    }
}

/// Whole-millisecond conversion so configured fractions like 0.3 land exactly.
fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::from_millis((seconds.max(0.0) * 1000.0).round() as u64)
}
