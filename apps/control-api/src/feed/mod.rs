//! Durable-channel stand-in: row-change events for the `user_status` table.
//!
//! Every committed write to the table is published once on a
//! `tokio::sync::broadcast` channel. Subscribers filter by user id locally;
//! a lagged subscriber is resynchronised with a snapshot of the current row.

pub mod server;

use std::sync::Arc;

use tokio::sync::broadcast;
use warden_common::ban::RowChange;

/// Capacity of the change channel. Receivers that fall behind skip events
/// (`RecvError::Lagged`) and must resync from the table.
const FEED_CAPACITY: usize = 1024;

/// The change feed hub. Cloneable; store in AppState.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Arc<RowChange>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RowChange>> {
        self.sender.subscribe()
    }

    /// Publish a committed row change.
    pub fn publish(&self, change: RowChange) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(change));
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
