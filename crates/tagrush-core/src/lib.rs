pub mod level;
pub mod lobby;
pub mod net;
pub mod player;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::{ConnId, LobbyPlayer, PlayerColor};

    /// Create `n` lobby players with sequential connection ids starting at 1.
    /// The first player is marked ready, matching the host convention.
    pub fn make_players(n: usize) -> Vec<LobbyPlayer> {
        (0..n)
            .map(|i| LobbyPlayer {
                conn: i as ConnId + 1,
                username: format!("Player{}", i + 1),
                ready: i == 0,
                color: PlayerColor::PALETTE[i % PlayerColor::PALETTE.len()],
            })
            .collect()
    }
}
