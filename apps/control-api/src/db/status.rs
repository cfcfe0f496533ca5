//! In-memory `user_status` table.
//!
//! Writes are atomic per row (DashMap entry lock) and every committed write is
//! published on the [`ChangeFeed`] after the row lock is released.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use warden_common::ban::{
    ChangeKind, RowChange, UserStatusRow, STATUS_ACTIVE, STATUS_BANNED, USER_STATUS_TABLE,
};

use crate::feed::ChangeFeed;

pub struct UserStatusTable {
    rows: DashMap<String, UserStatusRow>,
    feed: ChangeFeed,
}

impl UserStatusTable {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            rows: DashMap::new(),
            feed,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn get(&self, user_id: &str) -> Option<UserStatusRow> {
        self.rows.get(user_id).map(|r| r.clone())
    }

    /// Put the user into the banned state.
    ///
    /// Returns `None` without writing if the user is already banned.
    pub fn ban(
        &self,
        user_id: &str,
        reason: &str,
        banned_by: &str,
        at_ms: i64,
    ) -> Option<UserStatusRow> {
        let row = UserStatusRow {
            user_id: user_id.to_string(),
            status: STATUS_BANNED.to_string(),
            ban_reason: Some(reason.to_string()),
            banned_by: Some(banned_by.to_string()),
            updated_at: at_ms,
        };

        let change = match self.rows.entry(user_id.to_string()) {
            Entry::Occupied(existing) if existing.get().is_banned() => return None,
            Entry::Occupied(mut existing) => {
                let old = existing.insert(row.clone());
                row_change(ChangeKind::Update, Some(row.clone()), Some(old), at_ms)
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
                row_change(ChangeKind::Insert, Some(row.clone()), None, at_ms)
            }
        };

        self.feed.publish(change);
        Some(row)
    }

    /// Put the user back into the active state. Returns `false` if the user
    /// was not banned.
    pub fn lift_ban(&self, user_id: &str, at_ms: i64) -> bool {
        let change = {
            let Some(mut existing) = self.rows.get_mut(user_id) else {
                return false;
            };
            if !existing.is_banned() {
                return false;
            }
            let old = existing.clone();
            existing.status = STATUS_ACTIVE.to_string();
            existing.ban_reason = None;
            existing.banned_by = None;
            existing.updated_at = at_ms;
            row_change(ChangeKind::Update, Some(existing.clone()), Some(old), at_ms)
        };

        self.feed.publish(change);
        true
    }

    /// The current row as a `SNAPSHOT` change, for subscribers that need to
    /// (re)synchronise.
    pub fn snapshot(&self, user_id: &str) -> Option<RowChange> {
        let row = self.get(user_id)?;
        let at = row.updated_at;
        Some(row_change(ChangeKind::Snapshot, Some(row), None, at))
    }
}

fn row_change(
    kind: ChangeKind,
    new: Option<UserStatusRow>,
    old: Option<UserStatusRow>,
    commit_timestamp: i64,
) -> RowChange {
    RowChange {
        event_type: kind,
        table: USER_STATUS_TABLE.to_string(),
        new,
        old,
        commit_timestamp,
    }
}
