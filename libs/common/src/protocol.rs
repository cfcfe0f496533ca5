//! Command bus wire format: inbound command envelopes, outbound messages, and
//! per-command payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Inbound command type strings.
pub struct CommandType;

impl CommandType {
    pub const PING: &'static str = "ping";
    pub const AUTH: &'static str = "auth";
    pub const ADMIN_BROADCAST: &'static str = "admin:broadcast";
    pub const ADMIN_BAN_USER: &'static str = "admin:ban_user";
    pub const ADMIN_REFRESH_ANALYTICS: &'static str = "admin:refresh_analytics";
    pub const ADMIN_ANNOUNCE: &'static str = "admin:announce";
    pub const ADMIN_FORCE_RELOAD: &'static str = "admin:force_reload";
    pub const ADMIN_READ_ONLY: &'static str = "admin:read_only";
}

/// Outbound message type strings.
pub struct MessageType;

impl MessageType {
    pub const PONG: &'static str = "pong";
    pub const AUTH_SUCCESS: &'static str = "auth:success";
    pub const AUTH_ERROR: &'static str = "auth:error";
    pub const ERROR: &'static str = "error";
    pub const BROADCAST: &'static str = "broadcast";
    pub const BAN_EXECUTED: &'static str = "ban_executed";
    pub const ANALYTICS_REFRESH: &'static str = "analytics_refresh";
    pub const ANNOUNCEMENT: &'static str = "announcement";
    pub const FORCE_RELOAD: &'static str = "force_reload";
    pub const READ_ONLY: &'static str = "read_only";
    pub const COMMAND_ACK: &'static str = "command_ack";
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A command received from a client. The payload stays untyped until the
/// dispatcher knows which command it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl CommandEnvelope {
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    pub fn auth(credential: &str) -> Self {
        Self::new(
            CommandType::AUTH,
            serde_json::json!({ "credential": credential }),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastPayload {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanUserPayload {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncePayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub ttl_sec: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceReloadPayload {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadOnlyPayload {
    pub enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A message sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl ServerMessage {
    /// Build a message carrying a data payload.
    pub fn event(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data: Some(data),
            error: None,
            timestamp: crate::now_ms(),
        }
    }

    /// Build a PONG reply.
    pub fn pong() -> Self {
        Self {
            kind: MessageType::PONG.to_string(),
            data: None,
            error: None,
            timestamp: crate::now_ms(),
        }
    }

    /// Build an error reply of the given type with a machine-readable code.
    pub fn error(kind: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            data: Some(serde_json::json!({ "code": code })),
            error: Some(message.into()),
            timestamp: crate::now_ms(),
        }
    }

    /// The `code` field of an error reply, if present.
    pub fn error_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("code")?.as_str()
    }
}

/// Payload of `ban_executed` when addressed to the banned user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBanPayload {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub banned_by: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Payload of `ban_executed` when addressed to the requesting admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBanResultPayload {
    pub target_user_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_without_data_parses_as_null() {
        let env: CommandEnvelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind, "ping");
        assert!(env.data.is_null());
    }

    #[test]
    fn ban_user_payload_uses_camel_case() {
        let payload: BanUserPayload =
            serde_json::from_value(serde_json::json!({ "userId": "u1", "reason": "spam" })).unwrap();
        assert_eq!(payload.user_id, "u1");
        assert_eq!(payload.reason.as_deref(), Some("spam"));
    }

    #[test]
    fn error_message_exposes_code() {
        let msg = ServerMessage::error(MessageType::ERROR, "permission_denied", "Admin access required");
        assert_eq!(msg.error_code(), Some("permission_denied"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "Admin access required");
    }

    #[test]
    fn pong_omits_data() {
        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }
}
