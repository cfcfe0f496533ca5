//! Live half of the dual-channel ban notification, and the coordinator that
//! runs delegate, notifier and command log in order.

use std::sync::Arc;

use warden_common::protocol::{CommandType, MessageType, ServerMessage, UserBanPayload};

use crate::auth::credentials::OperatorIdentity;
use crate::gateway::history::{CommandLog, CommandRecord};
use crate::gateway::rooms::RoomRouter;

use super::delegate::{BanDelegate, BanError, BanRecord};

/// Reason recorded when the operator gives none.
pub const DEFAULT_BAN_REASON: &str = "Policy violation";

/// Pushes `ban_executed` to the banned user's live connection.
///
/// The durable half needs no driving here: the delegate's write already
/// produced the row change on the feed.
pub struct BanNotifier {
    router: Arc<dyn RoomRouter>,
}

impl BanNotifier {
    pub fn new(router: Arc<dyn RoomRouter>) -> Self {
        Self { router }
    }

    /// Best effort. Returns whether a live connection was addressed.
    pub fn notify(&self, record: &BanRecord) -> bool {
        let payload = UserBanPayload {
            reason: Some(record.reason.clone()),
            banned_by: Some(record.banned_by.clone()),
            timestamp: Some(record.banned_at),
        };
        let data = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(?e, "failed to encode ban notification");
                return false;
            }
        };

        let delivered = self
            .router
            .send_to_user(&record.user_id, ServerMessage::event(MessageType::BAN_EXECUTED, data));
        tracing::info!(user_id = %record.user_id, delivered, "live ban notification");
        delivered
    }
}

#[derive(Debug, Clone)]
pub struct BanOutcome {
    pub record: BanRecord,
    /// Whether the banned user had a live connection to push to.
    pub notified_live: bool,
}

/// Single ban path shared by the WebSocket command and the HTTP route.
pub struct BanCoordinator {
    delegate: Arc<dyn BanDelegate>,
    notifier: BanNotifier,
    log: Arc<CommandLog>,
}

impl BanCoordinator {
    pub fn new(delegate: Arc<dyn BanDelegate>, notifier: BanNotifier, log: Arc<CommandLog>) -> Self {
        Self {
            delegate,
            notifier,
            log,
        }
    }

    pub fn delegate(&self) -> &Arc<dyn BanDelegate> {
        &self.delegate
    }

    /// Ban `user_id` on behalf of `actor`. Notification happens only after
    /// the delegate confirmed persistence, and exactly once.
    pub async fn execute(
        &self,
        actor: &OperatorIdentity,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<BanOutcome, BanError> {
        let reason = resolve_reason(reason);
        let entry = CommandRecord::new(
            CommandType::ADMIN_BAN_USER,
            &actor.operator_id,
            serde_json::json!({ "userId": user_id, "reason": reason }),
        );

        match self.delegate.ban_user(user_id, &reason, &actor.operator_id).await {
            Ok(record) => {
                let notified_live = self.notifier.notify(&record);
                self.log.record(entry);
                Ok(BanOutcome {
                    record,
                    notified_live,
                })
            }
            Err(e) => {
                tracing::warn!(
                    %user_id,
                    operator_id = %actor.operator_id,
                    code = e.code(),
                    "ban rejected"
                );
                self.log.record(entry.failed(e.to_string()));
                Err(e)
            }
        }
    }
}

fn resolve_reason(reason: Option<&str>) -> String {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_BAN_REASON.to_string(),
    }
}
