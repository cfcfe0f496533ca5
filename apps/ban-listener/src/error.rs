use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Why a subscription attempt ended. Every variant leads to a reconnect.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("credential rejected ({0})")]
    Rejected(String),
}

impl SubscriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::Transport(_) => "transport_error",
            SubscriptionError::Encode(_) => "encode_error",
            SubscriptionError::Rejected(_) => "credential_rejected",
        }
    }
}

/// Failure to invalidate the local session. Never blocks the redirect.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("sign-out request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sign-out rejected with status {0}")]
    Rejected(u16),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Request(_) => "request_failed",
            SessionError::Rejected(_) => "rejected",
        }
    }
}
