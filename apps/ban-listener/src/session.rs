//! The local session the listener tears down once a ban arrives.

use async_trait::async_trait;
use parking_lot::Mutex;
use warden_common::BanNotice;

use crate::config::Config;
use crate::error::SessionError;

/// Side effects of a ban on the client.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Sign the user out. Best effort: an error is logged, never retried.
    async fn invalidate(&self) -> Result<(), SessionError>;

    /// Show the terminal "banned" view. Must not fail.
    fn show_banned(&self, notice: &BanNotice);
}

/// Session backed by the control API: drops the local credential and asks
/// the server to revoke it.
pub struct HttpSession {
    client: reqwest::Client,
    logout_url: String,
    credential: Mutex<Option<String>>,
}

impl HttpSession {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            logout_url: config.logout_url(),
            credential: Mutex::new(Some(config.user_credential.clone())),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.credential.lock().is_some()
    }
}

#[async_trait]
impl SessionControl for HttpSession {
    async fn invalidate(&self) -> Result<(), SessionError> {
        // The local credential goes first so a failed request still signs out.
        let Some(credential) = self.credential.lock().take() else {
            return Ok(());
        };

        let resp = self
            .client
            .post(&self.logout_url)
            .bearer_auth(credential)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SessionError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }

    fn show_banned(&self, notice: &BanNotice) {
        tracing::warn!(reason = %notice.reason, banned_by = %notice.banned_by, "account banned");
        println!("\n=== Account banned ===");
        println!("  Reason:    {}", notice.reason);
        println!("  Banned by: {}", notice.banned_by);
        println!("  At:        {}", format_timestamp(notice.timestamp));
        println!("\nYou have been signed out.");
    }
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}
