//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::lobby::{LobbyService, QueuedSession};
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Weapon used when the client does not pick one
pub const DEFAULT_WEAPON: &str = "sword";
const MAX_NAME_CHARS: usize = 24;

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub name: Option<String>,
    pub weapon: Option<String>,
}

impl WsQuery {
    /// Trimmed display name, falling back to one derived from the session id
    fn display_name(&self, session_id: Uuid) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| n.chars().take(MAX_NAME_CHARS).collect())
            .unwrap_or_else(|| format!("Player_{}", &session_id.simple().to_string()[..8]))
    }

    fn weapon_key(&self) -> String {
        self.weapon
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .unwrap_or(DEFAULT_WEAPON)
            .to_ascii_lowercase()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let session_id = Uuid::new_v4();
    let display_name = query.display_name(session_id);
    let weapon_key = query.weapon_key();

    if !state.weapons.contains(&weapon_key) {
        warn!(session_id = %session_id, weapon = %weapon_key, "Unknown weapon requested");
    }

    info!(session_id = %session_id, name = %display_name, weapon = %weapon_key, "WebSocket upgrade");
    ws.on_upgrade(move |socket| {
        handle_socket(socket, QueuedSession::new(session_id, display_name, weapon_key), state)
    })
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: QueuedSession, state: AppState) {
    let session_id = session.session_id;
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    let outbound_rx = state.lobby.register_session(session_id);
    if let Err(e) = state.lobby.enqueue(session).await {
        error!(session_id = %session_id, error = %e, "Failed to join lobby queue");
        state.lobby.unregister_session(session_id).await;
        return;
    }

    run_session(session_id, &state.lobby, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect; eliminates the player if a match is running
    state.lobby.unregister_session(session_id).await;

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    lobby: &LobbyService,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Spawn writer task: session messages -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, kind = msg.kind(), "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> lobby / match
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Leave) => {
                        info!(session_id = %session_id, "Client left");
                        lobby.route_input(session_id, ClientMsg::Leave).await;
                    }
                    Ok(client_msg) => lobby.route_input(session_id, client_msg).await,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                        lobby
                            .notify(
                                session_id,
                                ServerMsg::Error {
                                    code: "bad_message".to_string(),
                                    message: e.to_string(),
                                },
                            )
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(session_id = %session_id, "Received transport ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
