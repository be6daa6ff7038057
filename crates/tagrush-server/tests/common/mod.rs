#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tagrush_core::net::messages::{
    ClientMessage, CreateLobbyMsg, JoinLobbyMsg, LobbyStateMsg, ServerMessage, ToggleReadyMsg,
};
use tagrush_core::net::protocol::{decode_server_message, encode_client_message};

use tagrush_server::build_app;
use tagrush_server::config::{MatchConfig, ServerConfig};

pub struct TestServer {
    pub addr: SocketAddr,
    _serve: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// One-second rounds and no countdown, so match tests finish fast.
    pub async fn with_quick_matches() -> Self {
        let config = ServerConfig {
            match_config: MatchConfig {
                round_secs: 1,
                countdown_secs: 0,
                ..MatchConfig::default()
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _serve: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn ws_connect(url: &str) -> WsClient {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn send_client(stream: &mut WsClient, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read the next decodable server message, skipping non-binary frames.
pub async fn read_server(stream: &mut WsClient) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("server message within timeout")
            .expect("stream still open")
            .expect("websocket frame");
        if let Message::Binary(data) = frame {
            return decode_server_message(&data).expect("decodable server frame");
        }
    }
}

/// Read server messages until one matches `pred`, skipping everything else
/// (state updates stream continuously during a match).
pub async fn read_until<F>(stream: &mut WsClient, pred: F) -> ServerMessage
where
    F: Fn(&ServerMessage) -> bool,
{
    for _ in 0..500 {
        let msg = read_server(stream).await;
        if pred(&msg) {
            return msg;
        }
    }
    panic!("expected message did not arrive within 500 frames");
}

/// Create a lobby and return (code, first lobby_state).
pub async fn create_lobby(stream: &mut WsClient, name: &str) -> (String, LobbyStateMsg) {
    send_client(
        stream,
        &ClientMessage::CreateLobby(CreateLobbyMsg {
            username: name.to_string(),
        }),
    )
    .await;
    match read_server(stream).await {
        ServerMessage::LobbyState(m) => (m.code.clone(), m),
        other => panic!("expected lobby_state after create, got {other:?}"),
    }
}

/// Join a lobby and return the lobby_state seen by the joiner.
pub async fn join_lobby(stream: &mut WsClient, code: &str, name: &str) -> LobbyStateMsg {
    send_client(
        stream,
        &ClientMessage::JoinLobby(JoinLobbyMsg {
            code: code.to_string(),
            username: name.to_string(),
        }),
    )
    .await;
    match read_server(stream).await {
        ServerMessage::LobbyState(m) => m,
        other => panic!("expected lobby_state after join, got {other:?}"),
    }
}

pub async fn toggle_ready(stream: &mut WsClient, code: &str) {
    send_client(
        stream,
        &ClientMessage::ToggleReady(ToggleReadyMsg {
            code: code.to_string(),
        }),
    )
    .await;
}
