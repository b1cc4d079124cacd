//! WebSocket endpoint.
//!
//! `GET /api/v1/ws?token=<jwt>`. Browsers cannot set headers on a WebSocket
//! handshake, so the bearer token travels in the query string. A bad token
//! still completes the upgrade and is then closed with a 4xxx code the
//! client can act on.

use crate::auth::TokenRejection;
use crate::routes::AppState;
use crate::ws::registry::ConnectionHandle;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use common::types::UserId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Query parameters for the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Upgrade handler.
#[tracing::instrument(skip_all, name = "clubhouse.ws.upgrade")]
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsAuthQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ws: WebSocketUpgrade,
) -> Response {
    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr);
    let token = params.token.unwrap_or_default();

    match state.jwt_validator.validate(&token) {
        Ok(user) => {
            tracing::info!(
                target: "clubhouse.ws.handler",
                user_id = %user.user_id,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| run_connection(socket, state, user.user_id, remote_addr))
        }
        Err(rejection) => {
            let (code, reason) = close_for(rejection);
            tracing::warn!(
                target: "clubhouse.ws.handler",
                close_code = code,
                reason,
                "WebSocket auth failed"
            );
            ws.on_upgrade(move |mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
            })
        }
    }
}

fn close_for(rejection: TokenRejection) -> (u16, &'static str) {
    let reason = match rejection {
        TokenRejection::Expired => "Token expired",
        TokenRejection::Invalid => "Token invalid",
    };
    (rejection.close_code(), reason)
}

/// Serve one authenticated socket until it closes or is replaced.
async fn run_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    user_id: UserId,
    remote_addr: Option<SocketAddr>,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn = ConnectionHandle::new(remote_addr, tx);
    let guard = state.registry.register(user_id, conn.clone());

    // Writer: drain the queue into the socket. A close frame ends the socket.
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tracing::debug!(
        target: "clubhouse.ws.handler",
        user_id = %user_id,
        connection = conn.id(),
        remote_addr = ?remote_addr,
        "WebSocket connection started"
    );

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(target: "clubhouse.ws.handler", reason = ?frame, "Client closed");
                    break;
                }
                Some(Ok(Message::Ping(data))) => {
                    conn.send(Message::Pong(data));
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(target: "clubhouse.ws.handler", bytes = text.len(), "Ignoring client text frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(target: "clubhouse.ws.handler", error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            },
            _ = &mut writer => break,
        }
    }

    // Unregister (if still current) and queue a close frame.
    drop(guard);

    if !writer.is_finished() {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), &mut writer).await;
        writer.abort();
    }

    tracing::debug!(
        target: "clubhouse.ws.handler",
        user_id = %user_id,
        connection = conn.id(),
        "WebSocket connection ended"
    );
}
