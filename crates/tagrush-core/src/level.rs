use serde::{Deserialize, Serialize};

/// Name reported for the built-in level when the host makes no selection.
pub const DEFAULT_LEVEL_NAME: &str = "Default";

/// Axis-aligned rectangle in arena pixels, y-down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// AABB overlap test. Touching edges do not count as overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }
}

/// A spawn point in arena pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub x: f32,
    pub y: f32,
}

/// Platform geometry and spawn points for one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelGeometry {
    pub name: String,
    pub platforms: Vec<Rect>,
    pub spawn_points: Vec<Spawn>,
}

/// Named-level lookup. Level storage and editing live elsewhere; the session
/// server only resolves a selected id into geometry at match start.
pub trait LevelSource: Send + Sync {
    fn level_by_id(&self, id: &str) -> Option<LevelGeometry>;
}

/// Built-in fallback level: three floating platforms over the arena floor,
/// players spawning along the bottom.
pub fn default_level() -> LevelGeometry {
    LevelGeometry {
        name: DEFAULT_LEVEL_NAME.to_string(),
        platforms: vec![
            Rect {
                x: 120.0,
                y: 280.0,
                w: 160.0,
                h: 20.0,
            },
            Rect {
                x: 520.0,
                y: 280.0,
                w: 160.0,
                h: 20.0,
            },
            Rect {
                x: 320.0,
                y: 180.0,
                w: 160.0,
                h: 20.0,
            },
        ],
        spawn_points: vec![
            Spawn { x: 50.0, y: 350.0 },
            Spawn { x: 200.0, y: 350.0 },
            Spawn { x: 350.0, y: 350.0 },
            Spawn { x: 500.0, y: 350.0 },
        ],
    }
}
