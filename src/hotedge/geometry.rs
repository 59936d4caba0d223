//! Screen geometry for hot-edge detection.
//!
//! Coordinates use the global desktop space with the origin at the bottom
//! left and y growing upwards. Each screen is described by its frame.

use serde::{Deserialize, Serialize};

use super::HotEdge;

/// Two screen edges closer than this are treated as touching.
pub const ADJACENCY_TOLERANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A screen frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Inclusive on every side; the pointer can sit exactly on the far edge.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x <= self.max_x() && p.y >= self.min_y() && p.y <= self.max_y()
    }

    fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.min_x() < other.max_x() && other.min_x() < self.max_x()
    }

    fn overlaps_vertically(&self, other: &Rect) -> bool {
        self.min_y() < other.max_y() && other.min_y() < self.max_y()
    }
}

/// Returns the screen containing the pointer, if any.
pub fn screen_containing(point: Point, screens: &[Rect]) -> Option<Rect> {
    screens.iter().copied().find(|frame| frame.contains(point))
}

/// Returns true when `point` lies within `threshold` of `edge` of `frame`.
pub fn is_near_edge(edge: HotEdge, point: Point, frame: &Rect, threshold: f64) -> bool {
    match edge {
        HotEdge::Top => point.y >= frame.max_y() - threshold,
        HotEdge::Bottom => point.y <= frame.min_y() + threshold,
        HotEdge::Left => point.x <= frame.min_x() + threshold,
        HotEdge::Right => point.x >= frame.max_x() - threshold,
        HotEdge::Disabled => false,
    }
}

/// Returns true when another screen touches `edge` of `frame`.
///
/// Touching means the facing edges are within [`ADJACENCY_TOLERANCE`] and the
/// frames overlap along the edge.
pub fn is_shared_edge(edge: HotEdge, frame: &Rect, screens: &[Rect]) -> bool {
    let near = |a: f64, b: f64| (a - b).abs() <= ADJACENCY_TOLERANCE;

    screens.iter().filter(|other| *other != frame).any(|other| match edge {
        HotEdge::Top => near(other.min_y(), frame.max_y()) && frame.overlaps_horizontally(other),
        HotEdge::Bottom => near(other.max_y(), frame.min_y()) && frame.overlaps_horizontally(other),
        HotEdge::Left => near(other.max_x(), frame.min_x()) && frame.overlaps_vertically(other),
        HotEdge::Right => near(other.min_x(), frame.max_x()) && frame.overlaps_vertically(other),
        HotEdge::Disabled => false,
    })
}

/// Full edge condition for one pointer sample.
///
/// No screen under the pointer means no edge.
pub fn edge_condition(edge: HotEdge, point: Point, screens: &[Rect], threshold: f64) -> bool {
    let Some(frame) = screen_containing(point, screens) else {
        return false;
    };
    is_near_edge(edge, point, &frame, threshold) && !is_shared_edge(edge, &frame, screens)
}
