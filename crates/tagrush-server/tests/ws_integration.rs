mod common;

use common::*;

use tagrush_core::lobby::{LobbyStatus, is_valid_lobby_code};
use tagrush_core::net::messages::{
    ChatMessageMsg, ClientMessage, JoinLobbyMsg, SelectColorMsg, SelectLevelMsg, ServerMessage,
    StartGameMsg,
};
use tagrush_core::player::PlayerColor;

#[tokio::test]
async fn create_lobby_returns_code_and_state() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;

    let (code, state) = create_lobby(&mut alice, "Alice").await;
    assert!(is_valid_lobby_code(&code));
    assert_eq!(state.status, LobbyStatus::Open);
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.players[0].username, "Alice");
    assert!(state.players[0].ready, "creator is host and host is ready");
    assert_eq!(state.host, state.players[0].conn);
}

#[tokio::test]
async fn join_shows_both_players_with_distinct_colors() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    let seen_by_bob = join_lobby(&mut bob, &code, "Bob").await;

    assert_eq!(seen_by_bob.players.len(), 2);
    assert_ne!(
        seen_by_bob.players[0].color, seen_by_bob.players[1].color,
        "colors are pairwise distinct"
    );
    assert!(!seen_by_bob.players[1].ready);

    // Alice sees the same roster.
    let seen_by_alice =
        read_until(&mut alice, |m| matches!(m, ServerMessage::LobbyState(_))).await;
    if let ServerMessage::LobbyState(m) = seen_by_alice {
        assert_eq!(m.players.len(), 2);
        assert_eq!(m.players[1].username, "Bob");
    }
}

#[tokio::test]
async fn join_unknown_code_yields_lobby_error() {
    let server = TestServer::new().await;
    let mut bob = ws_connect(&server.ws_url()).await;

    send_client(
        &mut bob,
        &ClientMessage::JoinLobby(JoinLobbyMsg {
            code: "ZZZZZ9".into(),
            username: "Bob".into(),
        }),
    )
    .await;

    match read_server(&mut bob).await {
        ServerMessage::LobbyError(e) => assert!(!e.message.is_empty()),
        other => panic!("expected lobby_error, got {other:?}"),
    }
}

#[tokio::test]
async fn fifth_player_is_rejected() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let (code, _) = create_lobby(&mut alice, "Alice").await;

    let mut others = Vec::new();
    for name in ["Bob", "Carol", "Dave"] {
        let mut client = ws_connect(&server.ws_url()).await;
        join_lobby(&mut client, &code, name).await;
        others.push(client);
    }

    let mut eve = ws_connect(&server.ws_url()).await;
    send_client(
        &mut eve,
        &ClientMessage::JoinLobby(JoinLobbyMsg {
            code: code.clone(),
            username: "Eve".into(),
        }),
    )
    .await;
    match read_server(&mut eve).await {
        ServerMessage::LobbyError(e) => assert!(e.message.contains("full")),
        other => panic!("expected lobby_error, got {other:?}"),
    }
}

#[tokio::test]
async fn host_disconnect_promotes_earliest_remaining_player() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;
    let mut carol = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    join_lobby(&mut bob, &code, "Bob").await;
    join_lobby(&mut carol, &code, "Carol").await;

    drop(alice);

    let state = read_until(&mut carol, |m| {
        matches!(m, ServerMessage::LobbyState(s) if s.players.len() == 2)
    })
    .await;
    if let ServerMessage::LobbyState(m) = state {
        assert_eq!(m.players[0].username, "Bob");
        assert_eq!(m.host, m.players[0].conn, "earliest remaining is host");
        assert!(m.players[0].ready, "promoted host is forced ready");
    }
}

#[tokio::test]
async fn chat_relays_to_all_members() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    join_lobby(&mut bob, &code, "Bob").await;

    send_client(
        &mut bob,
        &ClientMessage::ChatMessage(ChatMessageMsg {
            code: code.clone(),
            message: "glhf".into(),
        }),
    )
    .await;

    for client in [&mut alice, &mut bob] {
        let msg = read_until(client, |m| matches!(m, ServerMessage::ChatRelay(_))).await;
        if let ServerMessage::ChatRelay(c) = msg {
            assert_eq!(c.username, "Bob");
            assert_eq!(c.text, "glhf");
            assert!(!c.id.is_empty());
        }
    }
}

#[tokio::test]
async fn color_and_level_selection_broadcast() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    join_lobby(&mut bob, &code, "Bob").await;

    send_client(
        &mut bob,
        &ClientMessage::SelectColor(SelectColorMsg {
            code: code.clone(),
            color: PlayerColor::PALETTE[2],
        }),
    )
    .await;
    let state = read_until(&mut alice, |m| {
        matches!(m, ServerMessage::LobbyState(s)
            if s.players.len() == 2 && s.players[1].color == PlayerColor::PALETTE[2])
    })
    .await;
    if let ServerMessage::LobbyState(m) = state {
        assert_eq!(m.players[1].username, "Bob");
    }

    // Host picks a level; everyone sees the selection.
    send_client(
        &mut alice,
        &ClientMessage::SelectLevel(SelectLevelMsg {
            code: code.clone(),
            level_id: "sky".into(),
            level_name: "Sky Temple".into(),
        }),
    )
    .await;
    let state = read_until(&mut bob, |m| {
        matches!(m, ServerMessage::LobbyState(s) if s.level.is_some())
    })
    .await;
    if let ServerMessage::LobbyState(m) = state {
        assert_eq!(m.level.unwrap().name, "Sky Temple");
    }
}

#[tokio::test]
async fn start_is_a_noop_until_everyone_is_ready() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    join_lobby(&mut bob, &code, "Bob").await;

    // Bob is not ready: the start request must change nothing.
    send_client(
        &mut alice,
        &ClientMessage::StartGame(StartGameMsg { code: code.clone() }),
    )
    .await;

    // Bob readies up; the very next broadcast is still a lobby_state (no
    // game_started ever arrived from the rejected start).
    toggle_ready(&mut bob, &code).await;
    match read_server(&mut bob).await {
        ServerMessage::LobbyState(m) => {
            assert_eq!(m.status, LobbyStatus::Open);
            assert!(m.players[1].ready);
        },
        other => panic!("expected lobby_state, got {other:?}"),
    }

    // Now the start goes through.
    send_client(
        &mut alice,
        &ClientMessage::StartGame(StartGameMsg { code: code.clone() }),
    )
    .await;
    let started = read_until(&mut bob, |m| matches!(m, ServerMessage::GameStarted(_))).await;
    if let ServerMessage::GameStarted(m) = started {
        assert_eq!(m.snapshot.players.iter().filter(|p| p.tagged).count(), 1);
    }
}

#[tokio::test]
async fn non_host_start_is_rejected() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url()).await;
    let mut bob = ws_connect(&server.ws_url()).await;

    let (code, _) = create_lobby(&mut alice, "Alice").await;
    join_lobby(&mut bob, &code, "Bob").await;
    toggle_ready(&mut bob, &code).await;

    send_client(
        &mut bob,
        &ClientMessage::StartGame(StartGameMsg { code: code.clone() }),
    )
    .await;

    // Bob's own ready toggle still broadcasts, but no game ever starts; the
    // lobby remains Open from everyone's point of view.
    let state = read_until(&mut alice, |m| {
        matches!(m, ServerMessage::LobbyState(s) if s.players.len() == 2 && s.players[1].ready)
    })
    .await;
    if let ServerMessage::LobbyState(m) = state {
        assert_eq!(m.status, LobbyStatus::Open);
    }
}
