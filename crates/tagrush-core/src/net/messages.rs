use serde::{Deserialize, Serialize};

use crate::lobby::{LevelRef, LobbyStatus};
use crate::player::{ConnId, LobbyPlayer, PlayerColor};

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    CreateLobby = 0x01,
    JoinLobby = 0x02,
    SelectLevel = 0x03,
    SelectColor = 0x04,
    ToggleReady = 0x05,
    ChatMessage = 0x06,
    StartGame = 0x07,
    PlayerInput = 0x08,
    LeaveGame = 0x09,

    // Server -> Client
    LobbyState = 0x10,
    LobbyError = 0x11,
    GameStarted = 0x12,
    Countdown = 0x13,
    GameStateUpdate = 0x14,
    GameOver = 0x15,
    LobbyClosed = 0x16,
    ChatRelay = 0x17,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::CreateLobby),
            0x02 => Some(Self::JoinLobby),
            0x03 => Some(Self::SelectLevel),
            0x04 => Some(Self::SelectColor),
            0x05 => Some(Self::ToggleReady),
            0x06 => Some(Self::ChatMessage),
            0x07 => Some(Self::StartGame),
            0x08 => Some(Self::PlayerInput),
            0x09 => Some(Self::LeaveGame),
            0x10 => Some(Self::LobbyState),
            0x11 => Some(Self::LobbyError),
            0x12 => Some(Self::GameStarted),
            0x13 => Some(Self::Countdown),
            0x14 => Some(Self::GameStateUpdate),
            0x15 => Some(Self::GameOver),
            0x16 => Some(Self::LobbyClosed),
            0x17 => Some(Self::ChatRelay),
            _ => None,
        }
    }
}

/// Movement keys a client may report. Wire names mirror the keyboard keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKey {
    #[serde(rename = "a")]
    Left,
    #[serde(rename = "d")]
    Right,
    #[serde(rename = "w")]
    Jump,
}

// ---- Client -> Server payloads ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLobbyMsg {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinLobbyMsg {
    pub code: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectLevelMsg {
    pub code: String,
    pub level_id: String,
    pub level_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColorMsg {
    pub code: String,
    pub color: PlayerColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleReadyMsg {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageMsg {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGameMsg {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInputMsg {
    pub code: String,
    pub key: InputKey,
    pub pressed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveGameMsg {}

/// All messages a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CreateLobby(CreateLobbyMsg),
    JoinLobby(JoinLobbyMsg),
    SelectLevel(SelectLevelMsg),
    SelectColor(SelectColorMsg),
    ToggleReady(ToggleReadyMsg),
    ChatMessage(ChatMessageMsg),
    StartGame(StartGameMsg),
    PlayerInput(PlayerInputMsg),
    LeaveGame(LeaveGameMsg),
}

// ---- Server -> Client payloads ----

/// Authoritative per-player state included in every match broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub conn: ConnId,
    pub username: String,
    pub color: PlayerColor,
    pub x: f32,
    pub y: f32,
    pub tagged: bool,
    pub disqualified: bool,
}

/// Full authoritative match state broadcast each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub timer_secs: u32,
    pub players: Vec<PlayerSnapshot>,
}

/// Final standing of one player. Rank 1 is the winner (or the longest
/// survivor in a draw).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlayer {
    pub rank: u32,
    pub username: String,
    pub disqualified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyStateMsg {
    pub code: String,
    pub host: ConnId,
    pub status: LobbyStatus,
    pub level: Option<LevelRef>,
    pub players: Vec<LobbyPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartedMsg {
    pub snapshot: MatchSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownMsg {
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateUpdateMsg {
    pub tick: u32,
    pub snapshot: MatchSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverMsg {
    pub winner: Option<String>,
    pub rankings: Vec<RankedPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyClosedMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRelayMsg {
    pub id: String,
    pub username: String,
    pub text: String,
}

/// All messages the server may broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    LobbyState(LobbyStateMsg),
    LobbyError(LobbyErrorMsg),
    GameStarted(GameStartedMsg),
    Countdown(CountdownMsg),
    GameStateUpdate(GameStateUpdateMsg),
    GameOver(GameOverMsg),
    LobbyClosed(LobbyClosedMsg),
    ChatRelay(ChatRelayMsg),
}
