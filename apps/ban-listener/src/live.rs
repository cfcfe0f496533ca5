//! Live subscription: the command bus connection, authenticated as the user.
//!
//! Reconnects silently with exponential backoff. Only `auth` is sent on a new
//! connection, plus a periodic `ping` to stay under the server's idle timeout.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use warden_common::protocol::{CommandEnvelope, CommandType, MessageType, ServerMessage, UserBanPayload};
use warden_common::BanNotice;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::SubscriptionError;
use crate::listener::{BanListener, Channel};

const DEFAULT_REASON: &str = "Policy violation";
const DEFAULT_ACTOR: &str = "Admin";

pub async fn run(config: Config, listener: Arc<BanListener>) {
    let mut backoff = Backoff::new(config.reconnect_base, config.reconnect_max);
    loop {
        match connect_once(&config, &listener, &mut backoff).await {
            Ok(()) => tracing::debug!("live connection closed"),
            Err(e) => tracing::debug!(error = %e, code = e.code(), "live connection ended"),
        }
        let delay = backoff.next_delay();
        tracing::debug!(?delay, "reconnecting live channel");
        time::sleep(delay).await;
    }
}

async fn connect_once(
    config: &Config,
    listener: &BanListener,
    backoff: &mut Backoff,
) -> Result<(), SubscriptionError> {
    let (ws, _) = tokio_tungstenite::connect_async(config.ws_url()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let auth = serde_json::to_string(&CommandEnvelope::auth(&config.user_credential))?;
    ws_tx.send(Message::Text(auth.into())).await?;

    let ping = serde_json::to_string(&CommandEnvelope::new(CommandType::PING, serde_json::Value::Null))?;
    let mut heartbeat = time::interval_at(Instant::now() + config.heartbeat, config.heartbeat);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(text.as_str(), listener, backoff).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            _ = heartbeat.tick() => {
                ws_tx.send(Message::Text(ping.clone().into())).await?;
            }
        }
    }
}

async fn handle_frame(
    text: &str,
    listener: &BanListener,
    backoff: &mut Backoff,
) -> Result<(), SubscriptionError> {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unparseable live frame");
            return Ok(());
        }
    };

    match message.kind.as_str() {
        MessageType::AUTH_SUCCESS => {
            tracing::info!("live channel authenticated");
            backoff.reset();
        }
        MessageType::AUTH_ERROR => {
            let code = message.error_code().unwrap_or("unknown").to_string();
            return Err(SubscriptionError::Rejected(code));
        }
        MessageType::BAN_EXECUTED => {
            if let Some(notice) = message.data.and_then(live_notice) {
                listener.handle(notice, Channel::Live).await;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Ban notice from a `ban_executed` payload, with the live-channel defaults.
fn live_notice(data: serde_json::Value) -> Option<BanNotice> {
    let payload: UserBanPayload = serde_json::from_value(data).ok()?;
    Some(BanNotice {
        reason: payload.reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
        banned_by: payload.banned_by.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
        timestamp: payload.timestamp.unwrap_or_else(warden_common::now_ms),
    })
}
