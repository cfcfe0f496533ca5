//! Room addressing: "all admins", "all users", and "this user".
//!
//! The dispatcher and the ban notifier only see [`RoomRouter`]. Two
//! implementations exist: direct delivery through the local registry, and a
//! backplane that publishes room envelopes onto an unbounded queue drained by
//! a relay task into the registry. The queue never drops an envelope.

use std::sync::Arc;

use tokio::sync::mpsc;
use warden_common::protocol::ServerMessage;

use super::registry::ConnectionRegistry;

/// Delivery never fails from the caller's point of view: dead targets are
/// dropped and scheduled for unregistration by the registry.
pub trait RoomRouter: Send + Sync {
    /// Returns the number of admin connections the message was queued for.
    fn broadcast_to_admins(&self, message: ServerMessage) -> usize;

    /// Returns the number of user connections the message was queued for.
    fn broadcast_to_users(&self, message: ServerMessage) -> usize;

    /// `false` means the user has no live connection, which is not an error.
    fn send_to_user(&self, user_id: &str, message: ServerMessage) -> bool;
}

// ---------------------------------------------------------------------------
// In-memory router
// ---------------------------------------------------------------------------

pub struct InMemoryRouter {
    registry: Arc<ConnectionRegistry>,
}

impl InMemoryRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

impl RoomRouter for InMemoryRouter {
    fn broadcast_to_admins(&self, message: ServerMessage) -> usize {
        self.registry.deliver_to_admins(Arc::new(message))
    }

    fn broadcast_to_users(&self, message: ServerMessage) -> usize {
        self.registry.deliver_to_users(Arc::new(message))
    }

    fn send_to_user(&self, user_id: &str, message: ServerMessage) -> bool {
        self.registry.deliver_to_user(user_id, Arc::new(message))
    }
}

// ---------------------------------------------------------------------------
// Backplane router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Room {
    Admins,
    Users,
    User(String),
}

#[derive(Debug, Clone)]
pub struct RoomEnvelope {
    pub room: Room,
    pub message: Arc<ServerMessage>,
}

/// Publishes room envelopes instead of writing to connections directly.
///
/// Counts and the `send_to_user` result reflect local membership at publish
/// time; delivery itself happens on the relay task.
pub struct BackplaneRouter {
    sender: mpsc::UnboundedSender<RoomEnvelope>,
    registry: Arc<ConnectionRegistry>,
}

impl BackplaneRouter {
    /// Create the router and spawn the relay that drains the backplane into
    /// the local registry. Must be called inside a tokio runtime.
    pub fn spawn(registry: Arc<ConnectionRegistry>) -> Self {
        let (sender, rx) = mpsc::unbounded_channel();
        tokio::spawn(relay(rx, registry.clone()));
        Self { sender, registry }
    }

    /// `false` only once the relay task is gone.
    fn publish(&self, room: Room, message: ServerMessage) -> bool {
        self.sender
            .send(RoomEnvelope {
                room,
                message: Arc::new(message),
            })
            .is_ok()
    }
}

impl RoomRouter for BackplaneRouter {
    fn broadcast_to_admins(&self, message: ServerMessage) -> usize {
        let members = self.registry.admin_count();
        if self.publish(Room::Admins, message) { members } else { 0 }
    }

    fn broadcast_to_users(&self, message: ServerMessage) -> usize {
        let members = self.registry.user_count();
        if self.publish(Room::Users, message) { members } else { 0 }
    }

    fn send_to_user(&self, user_id: &str, message: ServerMessage) -> bool {
        self.registry.user_connection(user_id).is_some()
            && self.publish(Room::User(user_id.to_string()), message)
    }
}

async fn relay(mut rx: mpsc::UnboundedReceiver<RoomEnvelope>, registry: Arc<ConnectionRegistry>) {
    while let Some(envelope) = rx.recv().await {
        match envelope.room {
            Room::Admins => {
                registry.deliver_to_admins(envelope.message);
            }
            Room::Users => {
                registry.deliver_to_users(envelope.message);
            }
            Room::User(user_id) => {
                registry.deliver_to_user(&user_id, envelope.message);
            }
        }
    }
    tracing::warn!("backplane relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{CredentialKeys, CredentialVerifier, TokenIssuer};
    use crate::config::Config;
    use crate::db::kv::{KeyValueStore, MemoryStore};
    use crate::permissions::Role;

    fn setup() -> (Arc<ConnectionRegistry>, TokenIssuer) {
        let keys = Arc::new(CredentialKeys::from_config(&Config::for_development()));
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        (
            Arc::new(ConnectionRegistry::new(Arc::new(CredentialVerifier::new(keys.clone(), kv)))),
            TokenIssuer::new(keys),
        )
    }

    async fn join(
        registry: &ConnectionRegistry,
        issuer: &TokenIssuer,
        subject: &str,
        role: Role,
    ) -> mpsc::UnboundedReceiver<Arc<ServerMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = registry.register(tx);
        let token = issuer.mint_access(subject, role, &[]).unwrap().token;
        registry.authenticate(&conn, &token).await.unwrap();
        rx
    }

    #[tokio::test]
    async fn in_memory_rooms_are_disjoint() {
        let (registry, issuer) = setup();
        let router = InMemoryRouter::new(registry.clone());
        let mut admin = join(&registry, &issuer, "opr_1", Role::Admin).await;
        let mut user = join(&registry, &issuer, "u1", Role::User).await;

        assert_eq!(router.broadcast_to_admins(ServerMessage::event("broadcast", serde_json::json!({}))), 1);
        assert_eq!(router.broadcast_to_users(ServerMessage::event("announcement", serde_json::json!({}))), 1);
        assert!(!router.send_to_user("nobody", ServerMessage::pong()));

        assert_eq!(admin.recv().await.unwrap().kind, "broadcast");
        assert_eq!(user.recv().await.unwrap().kind, "announcement");
        assert!(admin.try_recv().is_err());
        assert!(user.try_recv().is_err());
    }

    #[tokio::test]
    async fn backplane_relays_into_registry() {
        let (registry, issuer) = setup();
        let router = BackplaneRouter::spawn(registry.clone());
        let mut user = join(&registry, &issuer, "u1", Role::User).await;

        assert!(router.send_to_user("u1", ServerMessage::event("ban_executed", serde_json::json!({}))));
        assert!(!router.send_to_user("u2", ServerMessage::pong()));

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), user.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.kind, "ban_executed");
    }

    #[tokio::test]
    async fn backplane_burst_is_delivered_in_full_and_in_order() {
        let (registry, issuer) = setup();
        let router = BackplaneRouter::spawn(registry.clone());
        let mut admin = join(&registry, &issuer, "opr_1", Role::Admin).await;

        const BURST: u64 = 5000;
        for seq in 0..BURST {
            let sent = router.broadcast_to_admins(ServerMessage::event("broadcast", serde_json::json!({ "seq": seq })));
            assert_eq!(sent, 1);
        }

        for seq in 0..BURST {
            let received = tokio::time::timeout(std::time::Duration::from_secs(5), admin.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.data.as_ref().unwrap()["seq"], seq);
        }
        assert!(admin.try_recv().is_err());
    }
}
