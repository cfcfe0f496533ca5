//! Connection registry and room membership indexes.
//!
//! Three `DashMap`s give shard-level locking: every live connection, the
//! admins room, and the per-user rooms. Every authenticated connection,
//! operators included, owns the user room of its subject; the users room
//! broadcast skips operator slots. Each connection entry carries a
//! `parking_lot::Mutex` guarding its identity. No lock is held across the
//! credential check.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use warden_common::id::{prefix, prefixed_ulid};
use warden_common::protocol::ServerMessage;

use crate::auth::credentials::{CredentialVerifier, OperatorIdentity};
use super::error::AuthError;

pub type ConnectionId = String;

/// Per-connection outbound queue. Unbounded so room sends never block;
/// FIFO per connection.
pub type Outbound = mpsc::UnboundedSender<Arc<ServerMessage>>;

struct ConnectionEntry {
    identity: Option<OperatorIdentity>,
    joined_at: i64,
    outbound: Outbound,
}

/// Occupant of a per-user room.
#[derive(Clone)]
struct UserSlot {
    connection_id: ConnectionId,
    outbound: Outbound,
    admin: bool,
}

/// Snapshot of a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub identity: Option<OperatorIdentity>,
    pub joined_at: i64,
}

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Mutex<ConnectionEntry>>,
    admins: DashMap<ConnectionId, Outbound>,
    /// subject id -> newest authenticated connection of that subject.
    users: DashMap<String, UserSlot>,
    verifier: Arc<CredentialVerifier>,
}

impl ConnectionRegistry {
    pub fn new(verifier: Arc<CredentialVerifier>) -> Self {
        Self {
            connections: DashMap::new(),
            admins: DashMap::new(),
            users: DashMap::new(),
            verifier,
        }
    }

    /// Track a freshly accepted connection as unauthenticated.
    pub fn register(&self, outbound: Outbound) -> ConnectionId {
        let connection_id = prefixed_ulid(prefix::CONNECTION);
        self.connections.insert(
            connection_id.clone(),
            Mutex::new(ConnectionEntry {
                identity: None,
                joined_at: warden_common::now_ms(),
                outbound,
            }),
        );
        connection_id
    }

    /// Verify `credential` and move the connection into its rooms.
    ///
    /// On error nothing changes; the caller closes the connection.
    pub async fn authenticate(
        &self,
        connection_id: &str,
        credential: &str,
    ) -> Result<OperatorIdentity, AuthError> {
        {
            let entry = self
                .connections
                .get(connection_id)
                .ok_or(AuthError::UnknownConnection)?;
            if entry.lock().identity.is_some() {
                return Err(AuthError::AlreadyAuthenticated);
            }
        }

        let identity = self.verifier.verify(credential).await?;

        // Holding the entry keeps a concurrent unregister from slipping in
        // between the identity write and the room inserts.
        let entry = self
            .connections
            .get(connection_id)
            .ok_or(AuthError::UnknownConnection)?;
        let mut e = entry.lock();
        if e.identity.is_some() {
            return Err(AuthError::AlreadyAuthenticated);
        }
        e.identity = Some(identity.clone());

        let admin = identity.is_admin();
        if admin {
            self.admins.insert(connection_id.to_string(), e.outbound.clone());
        }
        let slot = UserSlot {
            connection_id: connection_id.to_string(),
            outbound: e.outbound.clone(),
            admin,
        };
        if let Some(previous) = self.users.insert(identity.operator_id.clone(), slot) {
            tracing::debug!(
                user_id = %identity.operator_id,
                previous_connection = %previous.connection_id,
                connection_id,
                "newer connection took over user room"
            );
        }

        Ok(identity)
    }

    /// Remove the connection from every index. Idempotent.
    pub fn unregister(&self, connection_id: &str) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return;
        };
        self.admins.remove(connection_id);
        if let Some(identity) = entry.into_inner().identity {
            self.users
                .remove_if(&identity.operator_id, |_, slot| slot.connection_id == connection_id);
        }
    }

    pub fn connection(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let entry = self.connections.get(connection_id)?;
        let e = entry.lock();
        Some(ConnectionInfo {
            connection_id: connection_id.to_string(),
            identity: e.identity.clone(),
            joined_at: e.joined_at,
        })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    /// Members of the users room (non-operator subjects).
    pub fn user_count(&self) -> usize {
        self.users.iter().filter(|slot| !slot.admin).count()
    }

    /// The connection currently addressable as `user_id`.
    pub fn user_connection(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).map(|r| r.connection_id.clone())
    }

    // -----------------------------------------------------------------------
    // Room delivery
    // -----------------------------------------------------------------------

    pub(crate) fn deliver_to_admins(&self, message: Arc<ServerMessage>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for member in self.admins.iter() {
            if member.value().send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(member.key().clone());
            }
        }
        self.reap(dead);
        delivered
    }

    pub(crate) fn deliver_to_users(&self, message: Arc<ServerMessage>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for member in self.users.iter().filter(|slot| !slot.admin) {
            if member.outbound.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(member.connection_id.clone());
            }
        }
        self.reap(dead);
        delivered
    }

    pub(crate) fn deliver_to_user(&self, user_id: &str, message: Arc<ServerMessage>) -> bool {
        let slot = self.users.get(user_id).map(|r| r.value().clone());
        let Some(slot) = slot else {
            return false;
        };
        if slot.outbound.send(message).is_ok() {
            return true;
        }
        self.reap(vec![slot.connection_id]);
        false
    }

    /// Unregister half-closed targets found during delivery. Runs after the
    /// room iteration has released its shard guards.
    fn reap(&self, dead: Vec<ConnectionId>) {
        for connection_id in dead {
            tracing::debug!(%connection_id, "dropping half-closed connection");
            self.unregister(&connection_id);
        }
    }
}
