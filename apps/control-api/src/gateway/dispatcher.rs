//! Command dispatch: parse, check the requirement table, execute, reply.
//!
//! Each connection task owns a [`ConnectionState`] and feeds every inbound
//! text frame through [`Dispatcher::handle_text`]. Replies to the sender go
//! through the connection's own outbound queue, fan-out goes through the
//! [`RoomRouter`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use warden_common::protocol::{
    AdminBanResultPayload, AnnouncePayload, AuthPayload, BanUserPayload, BroadcastPayload,
    CommandEnvelope, ForceReloadPayload, MessageType, ReadOnlyPayload, ServerMessage,
};

use crate::auth::credentials::OperatorIdentity;
use crate::bans::notifier::BanCoordinator;
use crate::permissions::{CommandKind, Requirement};

use super::error::{AuthError, BusError};
use super::history::{CommandLog, CommandRecord};
use super::registry::{ConnectionId, ConnectionRegistry, Outbound};
use super::rooms::RoomRouter;

/// Consecutive malformed messages tolerated before the connection is closed.
pub const MAX_MALFORMED_STREAK: u8 = 3;

/// Announcement display time when the operator gives none.
pub const DEFAULT_ANNOUNCE_TTL_SECS: u64 = 60;

pub const CLOSE_AUTH_FAILED: u16 = 4001;
pub const CLOSE_MALFORMED: u16 = 4002;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    AwaitingAuth,
    Authenticated(OperatorIdentity),
    Closed,
}

/// What the connection task should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(u16, &'static str),
}

pub struct ConnectionState {
    pub connection_id: ConnectionId,
    pub phase: Phase,
    malformed_streak: u8,
    outbound: Outbound,
}

impl ConnectionState {
    pub fn new(connection_id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            connection_id,
            phase: Phase::AwaitingAuth,
            malformed_streak: 0,
            outbound,
        }
    }

    pub fn identity(&self) -> Option<&OperatorIdentity> {
        match &self.phase {
            Phase::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    fn reply(&self, message: ServerMessage) {
        // A closed queue means the connection task is already gone.
        let _ = self.outbound.send(Arc::new(message));
    }
}

/// A parsed, typed command.
#[derive(Debug)]
enum Command {
    Ping,
    Auth(AuthPayload),
    Broadcast(BroadcastPayload),
    BanUser(BanUserPayload),
    RefreshAnalytics,
    Announce(AnnouncePayload),
    ForceReload(ForceReloadPayload),
    ReadOnly(ReadOnlyPayload),
}

impl Command {
    fn parse(kind: CommandKind, data: Value) -> Result<Self, BusError> {
        Ok(match kind {
            CommandKind::Ping => Command::Ping,
            CommandKind::Auth => Command::Auth(payload(kind, data)?),
            CommandKind::Broadcast => Command::Broadcast(payload(kind, data)?),
            CommandKind::BanUser => Command::BanUser(payload(kind, data)?),
            CommandKind::RefreshAnalytics => Command::RefreshAnalytics,
            CommandKind::Announce => Command::Announce(payload(kind, data)?),
            CommandKind::ForceReload if data.is_null() => Command::ForceReload(ForceReloadPayload::default()),
            CommandKind::ForceReload => Command::ForceReload(payload(kind, data)?),
            CommandKind::ReadOnly => Command::ReadOnly(payload(kind, data)?),
        })
    }
}

fn payload<T: DeserializeOwned>(kind: CommandKind, data: Value) -> Result<T, BusError> {
    serde_json::from_value(data)
        .map_err(|e| BusError::Protocol(format!("Invalid {} payload: {e}", kind.as_str())))
}

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    router: Arc<dyn RoomRouter>,
    bans: Arc<BanCoordinator>,
    log: Arc<CommandLog>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<dyn RoomRouter>,
        bans: Arc<BanCoordinator>,
        log: Arc<CommandLog>,
    ) -> Self {
        Self {
            registry,
            router,
            bans,
            log,
        }
    }

    pub async fn handle_text(&self, conn: &mut ConnectionState, text: &str) -> Flow {
        if conn.phase == Phase::Closed {
            return Flow::Continue;
        }

        let (kind, data) = match parse_envelope(text) {
            Ok(parsed) => parsed,
            Err(e) => return self.malformed(conn, e),
        };

        if let Err(e) = check_requirement(kind, &conn.phase) {
            conn.malformed_streak = 0;
            let reply_type = match e {
                BusError::Auth(_) => MessageType::AUTH_ERROR,
                _ => MessageType::ERROR,
            };
            tracing::debug!(
                connection_id = %conn.connection_id,
                command = kind.as_str(),
                code = e.code(),
                "command refused"
            );
            conn.reply(ServerMessage::error(reply_type, e.code(), e.to_string()));
            return Flow::Continue;
        }

        let command = match Command::parse(kind, data) {
            Ok(command) => command,
            Err(e) => return self.malformed(conn, e),
        };
        conn.malformed_streak = 0;

        self.execute(conn, command).await
    }

    fn malformed(&self, conn: &mut ConnectionState, err: BusError) -> Flow {
        conn.malformed_streak += 1;
        tracing::debug!(
            connection_id = %conn.connection_id,
            streak = conn.malformed_streak,
            error = %err,
            "malformed message"
        );
        conn.reply(ServerMessage::error(MessageType::ERROR, err.code(), err.to_string()));
        if conn.malformed_streak >= MAX_MALFORMED_STREAK {
            return Flow::Close(CLOSE_MALFORMED, "Too many malformed messages");
        }
        Flow::Continue
    }

    async fn execute(&self, conn: &mut ConnectionState, command: Command) -> Flow {
        let actor = match (&command, conn.identity()) {
            (Command::Ping | Command::Auth(_), _) => None,
            (_, Some(identity)) => Some(identity.clone()),
            // Unreachable after check_requirement.
            (_, None) => return Flow::Continue,
        };

        match (command, actor) {
            (Command::Ping, _) => {
                conn.reply(ServerMessage::pong());
                Flow::Continue
            }
            (Command::Auth(auth), _) => self.authenticate(conn, &auth.credential).await,
            (Command::Broadcast(p), Some(actor)) => {
                let data = json!({
                    "message": p.message,
                    "from": actor.operator_id,
                    "timestamp": warden_common::now_ms(),
                });
                let delivered = self
                    .router
                    .broadcast_to_admins(ServerMessage::event(MessageType::BROADCAST, data.clone()));
                self.record(CommandKind::Broadcast, &actor, data, delivered);
                Flow::Continue
            }
            (Command::BanUser(p), Some(actor)) => {
                let result = self.bans.execute(&actor, &p.user_id, p.reason.as_deref()).await;
                let reply = match result {
                    Ok(_) => AdminBanResultPayload {
                        target_user_id: p.user_id,
                        success: true,
                        error: None,
                    },
                    Err(e) => AdminBanResultPayload {
                        target_user_id: p.user_id,
                        success: false,
                        error: Some(BusError::from(e).to_string()),
                    },
                };
                conn.reply(ServerMessage::event(MessageType::BAN_EXECUTED, to_value(&reply)));
                Flow::Continue
            }
            (Command::RefreshAnalytics, Some(actor)) => {
                let data = json!({
                    "triggeredBy": actor.operator_id,
                    "timestamp": warden_common::now_ms(),
                });
                let delivered = self
                    .router
                    .broadcast_to_admins(ServerMessage::event(MessageType::ANALYTICS_REFRESH, data.clone()));
                self.record(CommandKind::RefreshAnalytics, &actor, data, delivered);
                Flow::Continue
            }
            (Command::Announce(p), Some(actor)) => {
                let data = json!({
                    "title": p.title,
                    "body": p.body,
                    "ttlSec": p.ttl_sec.unwrap_or(DEFAULT_ANNOUNCE_TTL_SECS),
                    "from": actor.operator_id,
                    "timestamp": warden_common::now_ms(),
                });
                self.fan_out_to_users(conn, CommandKind::Announce, MessageType::ANNOUNCEMENT, &actor, data);
                Flow::Continue
            }
            (Command::ForceReload(p), Some(actor)) => {
                let data = json!({
                    "reason": p.reason,
                    "from": actor.operator_id,
                    "timestamp": warden_common::now_ms(),
                });
                self.fan_out_to_users(conn, CommandKind::ForceReload, MessageType::FORCE_RELOAD, &actor, data);
                Flow::Continue
            }
            (Command::ReadOnly(p), Some(actor)) => {
                let data = json!({
                    "enabled": p.enabled,
                    "reason": p.reason,
                    "from": actor.operator_id,
                    "timestamp": warden_common::now_ms(),
                });
                self.fan_out_to_users(conn, CommandKind::ReadOnly, MessageType::READ_ONLY, &actor, data);
                Flow::Continue
            }
            (_, None) => Flow::Continue,
        }
    }

    async fn authenticate(&self, conn: &mut ConnectionState, credential: &str) -> Flow {
        match self.registry.authenticate(&conn.connection_id, credential).await {
            Ok(identity) => {
                tracing::info!(
                    connection_id = %conn.connection_id,
                    operator_id = %identity.operator_id,
                    role = identity.role.as_str(),
                    "connection authenticated"
                );
                let mut permissions: Vec<&str> = identity.permissions.iter().map(|p| p.as_str()).collect();
                permissions.sort_unstable();
                conn.reply(ServerMessage::event(
                    MessageType::AUTH_SUCCESS,
                    json!({
                        "connectionId": conn.connection_id,
                        "operatorId": identity.operator_id,
                        "role": identity.role,
                        "isAdmin": identity.is_admin(),
                        "permissions": permissions,
                    }),
                ));
                conn.phase = Phase::Authenticated(identity);
                Flow::Continue
            }
            Err(AuthError::AlreadyAuthenticated) => {
                let err = BusError::from(AuthError::AlreadyAuthenticated);
                conn.reply(ServerMessage::error(MessageType::AUTH_ERROR, err.code(), err.to_string()));
                Flow::Continue
            }
            Err(e) => {
                tracing::info!(connection_id = %conn.connection_id, code = e.code(), "authentication failed");
                conn.reply(ServerMessage::error(MessageType::AUTH_ERROR, e.code(), e.to_string()));
                conn.phase = Phase::Closed;
                Flow::Close(CLOSE_AUTH_FAILED, "Authentication failed")
            }
        }
    }

    fn fan_out_to_users(
        &self,
        conn: &ConnectionState,
        kind: CommandKind,
        message_type: &str,
        actor: &OperatorIdentity,
        data: Value,
    ) {
        let delivered = self
            .router
            .broadcast_to_users(ServerMessage::event(message_type, data.clone()));
        conn.reply(ServerMessage::event(
            MessageType::COMMAND_ACK,
            json!({ "command": kind.as_str(), "delivered": delivered }),
        ));
        self.record(kind, actor, data, delivered);
    }

    fn record(&self, kind: CommandKind, actor: &OperatorIdentity, data: Value, delivered: usize) {
        tracing::info!(
            operator_id = %actor.operator_id,
            command = kind.as_str(),
            delivered,
            "admin command executed"
        );
        self.log.record(CommandRecord::new(kind.as_str(), &actor.operator_id, data));
    }
}

fn parse_envelope(text: &str) -> Result<(CommandKind, Value), BusError> {
    let envelope: CommandEnvelope =
        serde_json::from_str(text).map_err(|_| BusError::Protocol("Invalid message format".to_string()))?;
    let kind = CommandKind::parse(&envelope.kind)
        .ok_or_else(|| BusError::Protocol(format!("Unknown command type: {}", envelope.kind)))?;
    Ok((kind, envelope.data))
}

/// Evaluate the requirement table for `kind` in the current phase.
fn check_requirement(kind: CommandKind, phase: &Phase) -> Result<(), BusError> {
    match (kind.requirement(), phase) {
        (Requirement::Any, _) => Ok(()),
        (Requirement::Unauthenticated, Phase::AwaitingAuth) => Ok(()),
        (Requirement::Unauthenticated, _) => Err(AuthError::AlreadyAuthenticated.into()),
        (Requirement::Admin(_), Phase::AwaitingAuth | Phase::Closed) => Err(BusError::Permission {
            command: kind.as_str(),
            required: "authentication",
        }),
        (Requirement::Admin(_), Phase::Authenticated(identity)) if !identity.is_admin() => {
            Err(BusError::Permission {
                command: kind.as_str(),
                required: "admin",
            })
        }
        (Requirement::Admin(Some(permission)), Phase::Authenticated(identity))
            if !identity.has_permission(permission) =>
        {
            Err(BusError::Permission {
                command: kind.as_str(),
                required: permission.as_str(),
            })
        }
        (Requirement::Admin(_), Phase::Authenticated(_)) => Ok(()),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
