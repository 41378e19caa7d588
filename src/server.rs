//! HTTP and WebSocket front end.
//!
//! One WebSocket per peer. Inbound text frames are parsed as
//! [`ClientRequest`] JSON and forwarded to the session host; everything the
//! host addresses to the peer is written back as [`ServerMessage`] JSON.

use crate::config::ServerConfig;
use crate::error::{RejectionKind, SessionError};
use crate::host::{Connection, SessionHandle};
use crate::protocol::{ClientRequest, ServerMessage};
use crate::session::SessionSnapshot;
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower::ServiceBuilder;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Query string accepted by `/ws`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Resume token from an earlier `welcome`.
    pub resume: Option<Uuid>,
}

/// Builds the router for a running session.
pub fn router(handle: SessionHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/state", get(session_state))
        .route("/restart", post(restart))
        .route("/health", get(health))
        .with_state(handle)
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            info!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
}

/// Binds the configured address and serves until the listener fails.
#[instrument(skip_all, fields(host = %config.host(), port = config.port()))]
pub async fn serve(config: &ServerConfig, handle: SessionHandle) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!(addr = %listener.local_addr()?, "Chess session server listening");
    axum::serve(listener, router(handle)).await
}

async fn health() -> &'static str {
    "ok"
}

async fn session_state(
    State(handle): State<SessionHandle>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    handle.snapshot().await.map(Json).map_err(|err| {
        error!(error = %err, "State query failed");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

/// Operator restart. Needs no seat, so a session whose host never
/// returns can still be reset.
#[instrument(skip(handle))]
async fn restart(State(handle): State<SessionHandle>) -> Result<Json<SessionSnapshot>, StatusCode> {
    handle.restart().await.map_err(|err| {
        error!(error = %err, "Restart failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    info!("Session restarted by operator");
    session_state(State(handle)).await
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(handle): State<SessionHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_socket(socket, handle, params.resume))
}

#[instrument(level = "trace", skip(message))]
fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            error!(error = %err, "Failed to encode server message");
            None
        }
    }
}

#[instrument(skip(socket, handle, resume), fields(resuming = resume.is_some()))]
async fn run_socket(socket: WebSocket, handle: SessionHandle, resume: Option<Uuid>) {
    let (mut sink, mut stream) = socket.split();

    let joined = match resume {
        Some(token) => handle.reconnect(token).await,
        None => handle.connect().await,
    };
    let Connection {
        peer, mut receiver, ..
    } = match joined {
        Ok(connection) => connection,
        Err(err) => {
            warn!(error = %err, "Connection refused");
            if let Some(frame) = encode(&ServerMessage::rejected(&err)) {
                sink.send(frame).await.ok();
            }
            sink.close().await.ok();
            return;
        }
    };
    info!(%peer, "Peer connected");

    let forward = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let Some(frame) = encode(&message) else {
                continue;
            };
            if sink.send(frame).await.is_err() {
                debug!(%peer, "Socket closed while forwarding");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientRequest>(text.as_str()) {
                Ok(request) => {
                    if let Err(SessionError::HostUnavailable) = handle.request(peer, request).await {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%peer, error = %err, "Malformed request");
                    let reply = ServerMessage::Rejected {
                        kind: RejectionKind::MalformedRequest,
                        message: err.to_string(),
                    };
                    if handle.send_direct(peer, reply).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(other) => debug!(%peer, ?other, "Ignoring non-text frame"),
            Err(err) => {
                debug!(%peer, error = %err, "Socket error");
                break;
            }
        }
    }

    handle.disconnect(peer).await.ok();
    forward.abort();
    info!(%peer, "Peer disconnected");
}
