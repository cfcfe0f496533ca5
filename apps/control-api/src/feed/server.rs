//! `GET /changes/user_status?token=...`: the change feed filtered to the
//! credential's subject.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use warden_common::ban::RowChange;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/changes/user_status", get(feed_upgrade))
}

async fn feed_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // No subject revocation check: a banned user still receives the ban row.
    let identity = state
        .verifier
        .verify_signature(&query.token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    Ok(ws.on_upgrade(move |socket| stream_changes(socket, state, identity.operator_id)))
}

async fn stream_changes(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe before the snapshot so no write falls between the two.
    let mut changes = state.statuses.feed().subscribe();

    if let Some(snapshot) = state.statuses.snapshot(&user_id) {
        let banned = snapshot.new.as_ref().is_some_and(|row| row.is_banned());
        if banned && send_change(&mut ws_tx, &snapshot).await.is_err() {
            return;
        }
    }

    tracing::debug!(%user_id, "change feed subscribed");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %user_id, "feed read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            result = changes.recv() => {
                match result {
                    Ok(change) => {
                        if change.user_id() != Some(user_id.as_str()) {
                            continue;
                        }
                        if send_change(&mut ws_tx, &change).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%user_id, skipped = n, "change feed subscriber lagged, resyncing");
                        if let Some(snapshot) = state.statuses.snapshot(&user_id) {
                            if send_change(&mut ws_tx, &snapshot).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(%user_id, "change feed closed");
}

async fn send_change(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    change: &RowChange,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(change) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, "failed to encode row change");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}
