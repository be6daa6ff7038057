/// Validation failures for client actions against a lobby.
///
/// These are surfaced to the requesting client only (as a `lobby_error`
/// reason string or a silent rejection) and are never fatal to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyError {
    NotFound,
    Full,
    MatchInProgress,
    InvalidColor,
    NotHost,
    NotReady,
    TooFewPlayers,
    InvalidName,
}

impl std::fmt::Display for LobbyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::NotFound => "Lobby not found.",
            Self::Full => "Lobby is full.",
            Self::MatchInProgress => "Match already in progress.",
            Self::InvalidColor => "That color is taken.",
            Self::NotHost => "Only the host can do that.",
            Self::NotReady => "All players must be ready.",
            Self::TooFewPlayers => "Need at least 2 players to start.",
            Self::InvalidName => "Invalid player name.",
        };
        write!(f, "{reason}")
    }
}

impl std::error::Error for LobbyError {}
