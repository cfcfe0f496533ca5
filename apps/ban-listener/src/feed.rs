//! Durable subscription: `user_status` row changes for the current user.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use warden_common::ban::RowChange;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::SubscriptionError;
use crate::listener::{BanListener, Channel};

pub async fn run(config: Config, listener: Arc<BanListener>) {
    let mut backoff = Backoff::new(config.reconnect_base, config.reconnect_max);
    loop {
        match subscribe_once(&config, &listener, &mut backoff).await {
            Ok(()) => tracing::debug!("change feed closed"),
            Err(e) => tracing::debug!(error = %e, code = e.code(), "change feed ended"),
        }
        time::sleep(backoff.next_delay()).await;
    }
}

async fn subscribe_once(
    config: &Config,
    listener: &BanListener,
    backoff: &mut Backoff,
) -> Result<(), SubscriptionError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(config.feed_url()).await?;
    tracing::info!("change feed subscribed");
    backoff.reset();

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                let change: RowChange = match serde_json::from_str(text.as_str()) {
                    Ok(change) => change,
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring unparseable feed frame");
                        continue;
                    }
                };
                if let Some(notice) = change.ban_notice() {
                    listener.handle(notice, Channel::Feed).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
