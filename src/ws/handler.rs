//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::Vec2;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Direct replies queued per connection
const OUTBOUND_CAPACITY: usize = 64;

/// Instructions for a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    /// Reply to this connection only
    Direct(ServerMsg),
    /// Start forwarding a room's event stream
    Subscribe(broadcast::Receiver<ServerMsg>),
    /// Stop forwarding room events
    Unsubscribe,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let (out_tx, out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
    let writer_handle = tokio::spawn(run_writer(player_id, ws_sink, out_rx));

    let rate_limiter = PlayerRateLimiter::new();

    // Reader loop: WebSocket -> lobby / match
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        let _ = out_tx
                            .send(Outbound::Direct(error_msg("bad_message", "Unrecognized message")))
                            .await;
                        continue;
                    }
                };

                if is_lobby_msg(&client_msg) && !rate_limiter.check_lobby() {
                    let _ = out_tx
                        .send(Outbound::Direct(error_msg("rate_limited", "Too many requests")))
                        .await;
                    continue;
                }

                if let Some(outbound) = dispatch(&state, player_id, client_msg) {
                    if out_tx.send(outbound).await.is_err() {
                        debug!(player_id = %player_id, "Writer task gone");
                        break;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect counts as leaving the room
    state.lobby.leave_room(player_id);
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

fn is_lobby_msg(msg: &ClientMsg) -> bool {
    matches!(
        msg,
        ClientMsg::JoinRoom { .. } | ClientMsg::SetReady { .. } | ClientMsg::LeaveRoom
    )
}

/// Apply one client message. Returns what the writer should do, if anything.
pub fn dispatch(state: &AppState, player_id: Uuid, msg: ClientMsg) -> Option<Outbound> {
    match msg {
        ClientMsg::JoinRoom {
            room_id,
            name,
            team,
        } => match state.lobby.join_room(player_id, &room_id, name, team) {
            Ok(rx) => Some(Outbound::Subscribe(rx)),
            Err(e) => Some(Outbound::Direct(error_msg(e.code(), &e.to_string()))),
        },

        ClientMsg::SetReady { ready } => match state.lobby.set_ready(player_id, ready) {
            Ok(()) => None,
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "Ready vote rejected");
                Some(Outbound::Direct(error_msg(e.code(), &e.to_string())))
            }
        },

        ClientMsg::MoveIntent { x, y } => {
            if let Some(room_id) = state.lobby.room_of(player_id) {
                state
                    .scheduler
                    .apply_move_intent(&room_id, player_id, Vec2::new(x, y));
            }
            None
        }

        ClientMsg::DashRequest { x, y } => {
            let performed = state
                .lobby
                .room_of(player_id)
                .map(|room_id| {
                    state
                        .scheduler
                        .apply_dash_request(&room_id, player_id, Vec2::new(x, y))
                })
                .unwrap_or(false);
            if !performed {
                debug!(player_id = %player_id, "Dash not performed");
            }
            None
        }

        ClientMsg::Ping { t } => Some(Outbound::Direct(ServerMsg::Pong { t })),

        ClientMsg::LeaveRoom => {
            state.lobby.leave_room(player_id);
            Some(Outbound::Unsubscribe)
        }
    }
}

/// Writer task: direct replies and the current room's broadcasts -> WebSocket
async fn run_writer(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    let mut room_rx: Option<broadcast::Receiver<ServerMsg>> = None;

    loop {
        let msg = tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Direct(msg)) => msg,
                Some(Outbound::Subscribe(rx)) => {
                    room_rx = Some(rx);
                    continue;
                }
                Some(Outbound::Unsubscribe) => {
                    room_rx = None;
                    continue;
                }
                None => break,
            },
            event = recv_room(&mut room_rx) => match event {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(player_id = %player_id, lagged_count = n, "Client lagged, skipping room events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    room_rx = None;
                    continue;
                }
            },
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Pending forever when not subscribed to a room
async fn recv_room(
    room_rx: &mut Option<broadcast::Receiver<ServerMsg>>,
) -> Result<ServerMsg, broadcast::error::RecvError> {
    match room_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn error_msg(code: &str, message: &str) -> ServerMsg {
    ServerMsg::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ws::protocol::{RoomPhase, Team};

    fn test_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            client_origin: "*".into(),
            game: Default::default(),
        };
        AppState::new(config).0
    }

    fn join(state: &AppState, player_id: Uuid, team: Team) -> broadcast::Receiver<ServerMsg> {
        let msg = ClientMsg::JoinRoom {
            room_id: "arena".into(),
            name: None,
            team: Some(team),
        };
        match dispatch(state, player_id, msg) {
            Some(Outbound::Subscribe(rx)) => rx,
            other => panic!("expected subscribe, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_replies_pong() {
        let state = test_state();
        let reply = dispatch(&state, Uuid::new_v4(), ClientMsg::Ping { t: 42 });
        assert!(matches!(reply, Some(Outbound::Direct(ServerMsg::Pong { t: 42 }))));
    }

    #[test]
    fn test_join_then_ready_starts_match() {
        let state = test_state();
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let mut rx = join(&state, red, Team::Red);
        join(&state, blue, Team::Blue);

        assert!(dispatch(&state, red, ClientMsg::SetReady { ready: true }).is_none());
        assert!(dispatch(&state, blue, ClientMsg::SetReady { ready: true }).is_none());
        assert!(state.scheduler.is_playing("arena"));

        let mut saw_playing = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMsg::RoomState { phase: RoomPhase::Playing, .. }) {
                saw_playing = true;
            }
        }
        assert!(saw_playing);

        // Intents reach the running match without a reply
        assert!(dispatch(&state, red, ClientMsg::MoveIntent { x: 1.0, y: 0.0 }).is_none());
        assert!(dispatch(&state, red, ClientMsg::DashRequest { x: 500.0, y: 500.0 }).is_none());
    }

    #[test]
    fn test_ready_outside_room_is_error() {
        let state = test_state();
        let reply = dispatch(&state, Uuid::new_v4(), ClientMsg::SetReady { ready: true });
        assert!(matches!(
            reply,
            Some(Outbound::Direct(ServerMsg::Error { ref code, .. })) if code == "not_in_room"
        ));
    }

    #[test]
    fn test_leave_unsubscribes() {
        let state = test_state();
        let id = Uuid::new_v4();
        join(&state, id, Team::Red);
        assert!(matches!(
            dispatch(&state, id, ClientMsg::LeaveRoom),
            Some(Outbound::Unsubscribe)
        ));
        assert!(state.lobby.room_of(id).is_none());
    }

    #[test]
    fn test_lobby_messages_classified() {
        assert!(is_lobby_msg(&ClientMsg::LeaveRoom));
        assert!(!is_lobby_msg(&ClientMsg::MoveIntent { x: 0.0, y: 0.0 }));
    }
}
