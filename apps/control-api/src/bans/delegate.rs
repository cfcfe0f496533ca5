//! Ban execution boundary.
//!
//! The delegate owns persistence and session invalidation. It knows nothing
//! about connections or rooms; notification is the caller's job and happens
//! only after `ban_user` has returned `Ok`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::credentials::CredentialVerifier;
use crate::db::status::UserStatusTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BanError {
    #[error("user is already banned")]
    AlreadyBanned,
    #[error("operators cannot ban themselves")]
    SelfBan,
    #[error("invalid ban target")]
    InvalidTarget,
    #[error("failed to invalidate the user's sessions")]
    SessionInvalidation,
    #[error("ban store unavailable")]
    Unavailable,
}

impl BanError {
    pub fn code(&self) -> &'static str {
        match self {
            BanError::AlreadyBanned => "already_banned",
            BanError::SelfBan => "self_ban",
            BanError::InvalidTarget => "invalid_target",
            BanError::SessionInvalidation => "session_invalidation_failed",
            BanError::Unavailable => "ban_store_unavailable",
        }
    }
}

/// A persisted ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    pub user_id: String,
    pub reason: String,
    pub banned_by: String,
    /// Unix milliseconds.
    pub banned_at: i64,
}

#[async_trait]
pub trait BanDelegate: Send + Sync {
    /// Persist the ban and invalidate the user's sessions.
    async fn ban_user(&self, user_id: &str, reason: &str, actor_id: &str) -> Result<BanRecord, BanError>;

    /// The user's current ban, if any.
    async fn ban_status(&self, user_id: &str) -> Result<Option<BanRecord>, BanError>;

    /// Lift an existing ban. Returns `false` if the user was not banned.
    async fn lift_ban(&self, user_id: &str) -> Result<bool, BanError>;
}

// ---------------------------------------------------------------------------
// user_status implementation
// ---------------------------------------------------------------------------

/// Delegate backed by the in-process `user_status` table. Every committed
/// write reaches the change feed through the table itself.
pub struct StatusBanDelegate {
    table: Arc<UserStatusTable>,
    verifier: Arc<CredentialVerifier>,
}

impl StatusBanDelegate {
    pub fn new(table: Arc<UserStatusTable>, verifier: Arc<CredentialVerifier>) -> Self {
        Self { table, verifier }
    }
}

#[async_trait]
impl BanDelegate for StatusBanDelegate {
    async fn ban_user(&self, user_id: &str, reason: &str, actor_id: &str) -> Result<BanRecord, BanError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(BanError::InvalidTarget);
        }
        if user_id == actor_id {
            return Err(BanError::SelfBan);
        }
        if self.table.get(user_id).is_some_and(|row| row.is_banned()) {
            return Err(BanError::AlreadyBanned);
        }

        // Sessions are invalidated before the row is written.
        self.verifier.revoke_subject(user_id).await.map_err(|e| {
            tracing::error!(%user_id, error = %e, "session invalidation failed");
            BanError::SessionInvalidation
        })?;

        let row = self
            .table
            .ban(user_id, reason, actor_id, warden_common::now_ms())
            .ok_or(BanError::AlreadyBanned)?;

        tracing::info!(%user_id, banned_by = %actor_id, %reason, "ban persisted");

        Ok(BanRecord {
            user_id: row.user_id,
            reason: reason.to_string(),
            banned_by: actor_id.to_string(),
            banned_at: row.updated_at,
        })
    }

    async fn ban_status(&self, user_id: &str) -> Result<Option<BanRecord>, BanError> {
        Ok(self.table.get(user_id).filter(|row| row.is_banned()).map(|row| BanRecord {
            reason: row.ban_reason.unwrap_or_default(),
            banned_by: row.banned_by.unwrap_or_default(),
            banned_at: row.updated_at,
            user_id: row.user_id,
        }))
    }

    async fn lift_ban(&self, user_id: &str) -> Result<bool, BanError> {
        let lifted = self.table.lift_ban(user_id, warden_common::now_ms());
        if lifted {
            tracing::info!(%user_id, "ban lifted");
        }
        Ok(lifted)
    }
}
