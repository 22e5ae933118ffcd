//! WebSocket Handler
//!
//! Authenticates upgrade requests, then runs the two pumps of a connection:
//! the read pump routes inbound frames into the session hub, the write pump
//! drains the connection's outbound queue onto the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::sync::Arc;

use super::queue::{outbound_queue, OutboundReceiver};
use super::router::route_frame;
use crate::api::{ApiError, AppState};
use crate::identity::{bearer_token, Identity};
use crate::presence::{assign_decoration, presence_for};
use crate::session::{join_session, ConnectionId, Member, SessionHub, SessionRegistry};

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub session: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Rejects the request before upgrading when the session key or identity
/// token is missing, or when the token does not verify.
pub async fn websocket_handler(
    ws: Option<WebSocketUpgrade>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let session = params
        .session
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Session ID required".to_string()))?;

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or_else(|| params.token.filter(|t| !t.is_empty()))
        .ok_or_else(|| ApiError::Unauthorized("Authorization token required".to_string()))?;

    let identity = state.identity.resolve(&token).await.map_err(|e| {
        tracing::debug!(session = %session, error = %e, "Rejected identity token");
        ApiError::Unauthorized("Invalid token".to_string())
    })?;

    let ws = ws.ok_or(ApiError::UpgradeRequired)?;

    let registry = Arc::clone(&state.registry);
    let queue_capacity = registry.config().queue_capacity;

    Ok(ws
        .on_failed_upgrade(|e: axum::Error| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, registry, session, identity, queue_capacity)))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    registry: Arc<SessionRegistry>,
    session: String,
    identity: Identity,
    queue_capacity: usize,
) {
    let (sink, stream) = socket.split();
    let (queue, outbound) = outbound_queue(queue_capacity);

    let member = Member::new(presence_for(&identity, &assign_decoration()), queue);
    let connection_id = member.id;

    tokio::spawn(write_pump(sink, outbound, connection_id));

    let lease = match join_session(&registry, &session, &member).await {
        Ok(lease) => lease,
        Err(e) => {
            tracing::error!(session = %session, connection_id = %connection_id, error = %e, "Failed to join session");
            return;
        }
    };
    // From here on the hub holds the only producer for this queue
    drop(member);

    tracing::info!(
        session = %session,
        connection_id = %connection_id,
        user = %identity.display_name,
        "User connected to session"
    );

    read_pump(stream, &lease, connection_id).await;

    lease.unregister(connection_id).await;
    tracing::info!(session = %session, connection_id = %connection_id, "Connection closed");
}

/// Route inbound frames until the peer closes or the socket fails
async fn read_pump(mut stream: SplitStream<WebSocket>, hub: &SessionHub, connection_id: ConnectionId) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                route_frame(hub, connection_id, text).await;
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    route_frame(hub, connection_id, text).await;
                }
                Err(_) => {
                    tracing::debug!(connection_id = %connection_id, "Dropping non UTF-8 binary frame");
                }
            },
            // Axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client requested close");
                break;
            }
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }
}

/// Write queued frames, one message each, until the queue closes or a write fails
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: OutboundReceiver,
    connection_id: ConnectionId,
) {
    while let Some(frame) = outbound.next().await {
        if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
            tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket write error");
            return;
        }
    }

    // Queue closed: unregistered or evicted. Make the peer hang up.
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}
