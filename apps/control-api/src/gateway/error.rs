//! Error taxonomy of the command bus.
//!
//! Protocol and permission errors are reported to the sender and the
//! connection stays open. Auth errors end the connection. Delegate errors go
//! back to the requesting admin only. A dead outbound queue is not an error at
//! all: the registry reaps the connection and delivery moves on.

use thiserror::Error;

use crate::bans::delegate::BanError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credential: {0}")]
    InvalidCredential(&'static str),
    #[error("connection is already authenticated")]
    AlreadyAuthenticated,
    #[error("unknown connection")]
    UnknownConnection,
    #[error("revocation store unavailable")]
    RevocationUnavailable,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredential(_) => "invalid_credential",
            AuthError::AlreadyAuthenticated => "already_authenticated",
            AuthError::UnknownConnection => "unknown_connection",
            AuthError::RevocationUnavailable => "auth_unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("{0}")]
    Protocol(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{command} requires {required}")]
    Permission {
        command: &'static str,
        required: &'static str,
    },
    #[error(transparent)]
    Delegate(#[from] BanError),
}

impl BusError {
    pub fn code(&self) -> &'static str {
        match self {
            BusError::Protocol(_) => "invalid_format",
            BusError::Auth(e) => e.code(),
            BusError::Permission { .. } => "permission_denied",
            BusError::Delegate(e) => e.code(),
        }
    }
}
