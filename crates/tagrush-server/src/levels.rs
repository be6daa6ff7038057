use std::collections::HashMap;

use tagrush_core::level::{LevelGeometry, LevelSource, default_level};

/// In-process level catalog.
///
/// Level storage and editing are external concerns; this provider serves
/// whatever geometry it was preloaded with. Ids it does not know resolve to
/// nothing and the caller falls back to the built-in level.
#[derive(Default)]
pub struct BuiltinLevels {
    levels: HashMap<String, LevelGeometry>,
}

impl BuiltinLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, id: impl Into<String>, level: LevelGeometry) -> Self {
        self.levels.insert(id.into(), level);
        self
    }
}

impl LevelSource for BuiltinLevels {
    fn level_by_id(&self, id: &str) -> Option<LevelGeometry> {
        self.levels.get(id).cloned()
    }
}

/// Resolve the host's selection into geometry, falling back to the built-in
/// level when nothing was selected or the id is unknown.
pub fn resolve_level(source: &dyn LevelSource, selected: Option<&str>) -> LevelGeometry {
    match selected {
        Some(id) => source.level_by_id(id).unwrap_or_else(|| {
            tracing::warn!(level_id = id, "Unknown level id, using the default level");
            default_level()
        }),
        None => default_level(),
    }
}
