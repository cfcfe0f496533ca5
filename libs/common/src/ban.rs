//! Ban event model shared by the server and the client listener.
//!
//! A ban is persisted once as a `user_status` row and reaches the client via
//! two independent paths: the live `ban_executed` push and the change-feed row
//! event. Both carry the same `(timestamp, reason)` pair, which is the event
//! identity used for deduplication.

use serde::{Deserialize, Serialize};

/// `user_status.status` value for a banned user.
pub const STATUS_BANNED: &str = "banned";

/// `user_status.status` value for an active (unbanned) user.
pub const STATUS_ACTIVE: &str = "active";

/// Name of the table the change feed reports on.
pub const USER_STATUS_TABLE: &str = "user_status";

/// A ban notification as observed by a client, regardless of which channel
/// delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanNotice {
    pub reason: String,
    pub banned_by: String,
    /// Unix milliseconds of the persisted ban.
    pub timestamp: i64,
}

impl BanNotice {
    pub fn event_id(&self) -> BanEventId {
        BanEventId {
            timestamp: self.timestamp,
            reason: self.reason.clone(),
        }
    }
}

/// Deduplication key for ban events: `(timestamp, reason)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BanEventId {
    pub timestamp: i64,
    pub reason: String,
}

impl std::fmt::Display for BanEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.timestamp, self.reason)
    }
}

/// A row of the `user_status` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatusRow {
    pub user_id: String,
    pub status: String,
    #[serde(default)]
    pub ban_reason: Option<String>,
    #[serde(default)]
    pub banned_by: Option<String>,
    /// Unix milliseconds of the last change to this row.
    pub updated_at: i64,
}

impl UserStatusRow {
    pub fn is_banned(&self) -> bool {
        self.status == STATUS_BANNED
    }
}

/// Kind of row change reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Current row state, sent on subscribe and after a lagged receiver.
    Snapshot,
}

/// One row-level change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub event_type: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub new: Option<UserStatusRow>,
    #[serde(default)]
    pub old: Option<UserStatusRow>,
    pub commit_timestamp: i64,
}

impl RowChange {
    /// The user this change is about, taken from whichever side is present.
    pub fn user_id(&self) -> Option<&str> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|row| row.user_id.as_str())
    }

    /// If this change puts its row into the banned state, the ban it describes.
    pub fn ban_notice(&self) -> Option<BanNotice> {
        if self.event_type == ChangeKind::Delete {
            return None;
        }
        let row = self.new.as_ref()?;
        if !row.is_banned() {
            return None;
        }
        Some(BanNotice {
            reason: row
                .ban_reason
                .clone()
                .unwrap_or_else(|| "Account suspended".to_string()),
            banned_by: row.banned_by.clone().unwrap_or_else(|| "System".to_string()),
            timestamp: row.updated_at,
        })
    }
}
