//! WebSocket transport adapter and static client serving
//!
//! Exposes the hub at `GET /hub` (JSON text frames) and serves the browser
//! widget client from a configurable public directory. The adapter owns the
//! session lifecycle: a session exists from the completed upgrade until the
//! socket closes, and teardown runs exactly once.

use crate::envelope::ClientMessage;
use crate::hub::{Hub, SessionId};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared state for the WebSocket handlers
#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<Hub>,
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    /// Initial display name, e.g. `/hub?username=osc-bridge`
    username: Option<String>,
}

/// Create the axum router: hub endpoint, health check, and static client
/// files as the fallback when a public directory is configured.
pub fn create_router(state: WsState, public_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/hub", get(ws_handler))
        .route("/health", get(health_handler));

    if let Some(dir) = public_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: WsState, params: ConnectParams) {
    let (mut sender, mut receiver) = socket.split();

    // The transport layer assigns the session id
    let session_id: SessionId = Uuid::new_v4();
    let (tx, mut rx) = state.hub.channel();

    if let Err(e) = state.hub.connect(session_id, tx) {
        warn!(session_id = %session_id, error = %e, "rejecting connection");
        return;
    }

    if let Some(username) = params.username {
        state.hub.handle(session_id, ClientMessage::Username { username });
    }

    // Drain the session's outbound queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Process incoming frames; malformed input is dropped, never surfaced
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => state.hub.handle(session_id, msg),
                Err(e) => debug!(session_id = %session_id, error = %e, "dropping malformed frame"),
            },
            Ok(Message::Binary(data)) => match serde_json::from_slice::<ClientMessage>(&data) {
                Ok(msg) => state.hub.handle(session_id, msg),
                Err(e) => debug!(session_id = %session_id, error = %e, "dropping malformed frame"),
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled automatically by axum
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    debug!(session_id = %session_id, "WebSocket closed");
    state.hub.disconnect(session_id);
    send_task.abort();
}

/// Run the hub server until the listener fails.
pub async fn run_server(
    bind_addr: SocketAddr,
    state: WsState,
    public_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let app = create_router(state, public_dir);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "hub listening");

    axum::serve(listener, app).await?;

    Ok(())
}
