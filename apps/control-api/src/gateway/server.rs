//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use warden_common::protocol::ServerMessage;

use crate::AppState;

use super::dispatcher::{ConnectionState, Flow, Phase};

/// Close codes (4000-range for application-level).
pub const CLOSE_AUTH_TIMEOUT: u16 = 4008;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Arc<ServerMessage>>();

    let connection_id = state.registry.register(out_tx.clone());
    let mut conn = ConnectionState::new(connection_id.clone(), out_tx);
    tracing::debug!(%connection_id, "connection accepted");

    let auth_deadline = time::sleep(state.config.auth_timeout);
    tokio::pin!(auth_deadline);
    let idle_timeout = state.config.idle_timeout;
    let idle_deadline = time::sleep(idle_timeout);
    tokio::pin!(idle_deadline);

    let close = loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        idle_deadline.as_mut().reset(Instant::now() + idle_timeout);
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %connection_id, "ws read error");
                        break None;
                    }
                };
                idle_deadline.as_mut().reset(Instant::now() + idle_timeout);

                if let Flow::Close(code, reason) = state.dispatcher.handle_text(&mut conn, &text).await {
                    break Some((code, reason));
                }
            }

            // Replies and room messages queued for this connection.
            Some(message) = out_rx.recv() => {
                if send_message(&mut ws_tx, &message).await.is_err() {
                    break None;
                }
            }

            _ = &mut auth_deadline, if conn.phase == Phase::AwaitingAuth => {
                tracing::debug!(%connection_id, "authentication timeout");
                break Some((CLOSE_AUTH_TIMEOUT, "Authentication timeout"));
            }

            _ = &mut idle_deadline => {
                tracing::debug!(%connection_id, "idle timeout");
                break Some((CLOSE_IDLE_TIMEOUT, "Idle timeout"));
            }
        }
    };

    // Leave every room before anything else observes the registry.
    state.registry.unregister(&connection_id);

    if let Some((code, reason)) = close {
        // Flush what was queued before the close (e.g. the auth:error reply).
        while let Ok(message) = out_rx.try_recv() {
            if send_message(&mut ws_tx, &message).await.is_err() {
                break;
            }
        }
        let _ = send_close(&mut ws_tx, code, reason).await;
    }

    tracing::info!(
        %connection_id,
        operator_id = conn.identity().map(|i| i.operator_id.as_str()).unwrap_or("-"),
        "connection closed"
    );
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, "failed to encode server message");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
pub(crate) async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
