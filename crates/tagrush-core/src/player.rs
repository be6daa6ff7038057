use serde::{Deserialize, Serialize};

/// Unique identifier for a client connection.
///
/// Connection identity *is* player identity: there is no reconnection, and a
/// dropped connection during a match ends the match for everyone.
pub type ConnId = u64;

/// A player entry inside a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub conn: ConnId,
    pub username: String,
    pub ready: bool,
    pub color: PlayerColor,
}

/// Avatar color selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for PlayerColor {
    fn default() -> Self {
        Self::PALETTE[0]
    }
}

impl PlayerColor {
    /// Predefined palette colors for player selection. The lobby capacity
    /// equals the palette size, so every player can hold a distinct color.
    pub const PALETTE: &[PlayerColor] = &[
        PlayerColor {
            r: 255,
            g: 87,
            b: 87,
        }, // Red
        PlayerColor {
            r: 78,
            g: 205,
            b: 196,
        }, // Teal
        PlayerColor {
            r: 255,
            g: 195,
            b: 18,
        }, // Yellow
        PlayerColor {
            r: 130,
            g: 88,
            b: 255,
        }, // Purple
    ];

    /// Whether this color is one of the selectable palette entries.
    pub fn in_palette(self) -> bool {
        Self::PALETTE.contains(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_color_is_first_palette_entry() {
        assert_eq!(PlayerColor::default(), PlayerColor::PALETTE[0]);
    }

    #[test]
    fn palette_membership() {
        for &c in PlayerColor::PALETTE {
            assert!(c.in_palette());
        }
        let off_palette = PlayerColor { r: 1, g: 2, b: 3 };
        assert!(!off_palette.in_palette());
    }
}
