use serde::{Deserialize, Serialize};

use super::messages::{
    ChatMessageMsg, ChatRelayMsg, ClientMessage, CountdownMsg, CreateLobbyMsg, GameOverMsg,
    GameStartedMsg, GameStateUpdateMsg, JoinLobbyMsg, LeaveGameMsg, LobbyClosedMsg, LobbyErrorMsg,
    LobbyStateMsg, MessageType, PlayerInputMsg, SelectColorMsg, SelectLevelMsg, ServerMessage,
    StartGameMsg, ToggleReadyMsg,
};

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024; // 16 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(f, "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::CreateLobby(m) => encode_message(MessageType::CreateLobby, m),
        ClientMessage::JoinLobby(m) => encode_message(MessageType::JoinLobby, m),
        ClientMessage::SelectLevel(m) => encode_message(MessageType::SelectLevel, m),
        ClientMessage::SelectColor(m) => encode_message(MessageType::SelectColor, m),
        ClientMessage::ToggleReady(m) => encode_message(MessageType::ToggleReady, m),
        ClientMessage::ChatMessage(m) => encode_message(MessageType::ChatMessage, m),
        ClientMessage::StartGame(m) => encode_message(MessageType::StartGame, m),
        ClientMessage::PlayerInput(m) => encode_message(MessageType::PlayerInput, m),
        ClientMessage::LeaveGame(m) => encode_message(MessageType::LeaveGame, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::LobbyState(m) => encode_message(MessageType::LobbyState, m),
        ServerMessage::LobbyError(m) => encode_message(MessageType::LobbyError, m),
        ServerMessage::GameStarted(m) => encode_message(MessageType::GameStarted, m),
        ServerMessage::Countdown(m) => encode_message(MessageType::Countdown, m),
        ServerMessage::GameStateUpdate(m) => encode_message(MessageType::GameStateUpdate, m),
        ServerMessage::GameOver(m) => encode_message(MessageType::GameOver, m),
        ServerMessage::LobbyClosed(m) => encode_message(MessageType::LobbyClosed, m),
        ServerMessage::ChatRelay(m) => encode_message(MessageType::ChatRelay, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::CreateLobby => Ok(ClientMessage::CreateLobby(
            decode_payload::<CreateLobbyMsg>(data)?,
        )),
        MessageType::JoinLobby => Ok(ClientMessage::JoinLobby(decode_payload::<JoinLobbyMsg>(
            data,
        )?)),
        MessageType::SelectLevel => Ok(ClientMessage::SelectLevel(
            decode_payload::<SelectLevelMsg>(data)?,
        )),
        MessageType::SelectColor => Ok(ClientMessage::SelectColor(
            decode_payload::<SelectColorMsg>(data)?,
        )),
        MessageType::ToggleReady => Ok(ClientMessage::ToggleReady(
            decode_payload::<ToggleReadyMsg>(data)?,
        )),
        MessageType::ChatMessage => Ok(ClientMessage::ChatMessage(
            decode_payload::<ChatMessageMsg>(data)?,
        )),
        MessageType::StartGame => Ok(ClientMessage::StartGame(decode_payload::<StartGameMsg>(
            data,
        )?)),
        MessageType::PlayerInput => Ok(ClientMessage::PlayerInput(
            decode_payload::<PlayerInputMsg>(data)?,
        )),
        MessageType::LeaveGame => Ok(ClientMessage::LeaveGame(decode_payload::<LeaveGameMsg>(
            data,
        )?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::LobbyState => Ok(ServerMessage::LobbyState(
            decode_payload::<LobbyStateMsg>(data)?,
        )),
        MessageType::LobbyError => Ok(ServerMessage::LobbyError(
            decode_payload::<LobbyErrorMsg>(data)?,
        )),
        MessageType::GameStarted => Ok(ServerMessage::GameStarted(
            decode_payload::<GameStartedMsg>(data)?,
        )),
        MessageType::Countdown => Ok(ServerMessage::Countdown(decode_payload::<CountdownMsg>(
            data,
        )?)),
        MessageType::GameStateUpdate => Ok(ServerMessage::GameStateUpdate(decode_payload::<
            GameStateUpdateMsg,
        >(data)?)),
        MessageType::GameOver => Ok(ServerMessage::GameOver(decode_payload::<GameOverMsg>(
            data,
        )?)),
        MessageType::LobbyClosed => Ok(ServerMessage::LobbyClosed(
            decode_payload::<LobbyClosedMsg>(data)?,
        )),
        MessageType::ChatRelay => Ok(ServerMessage::ChatRelay(decode_payload::<ChatRelayMsg>(
            data,
        )?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
