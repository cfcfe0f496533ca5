//! Bounded log of executed admin commands, for operator UI display only.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use warden_common::id::{prefix, prefixed_ulid};

/// Maximum number of commands kept; the oldest entry is evicted first.
pub const MAX_COMMAND_LOG: usize = 50;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub command: String,
    pub operator_id: String,
    #[schema(value_type = Object)]
    pub data: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl CommandRecord {
    pub fn new(command: &str, operator_id: &str, data: Value) -> Self {
        Self {
            id: prefixed_ulid(prefix::COMMAND),
            command: command.to_string(),
            operator_id: operator_id.to_string(),
            data,
            success: true,
            error: None,
            timestamp: warden_common::now_ms(),
        }
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

pub struct CommandLog {
    entries: Mutex<VecDeque<CommandRecord>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_COMMAND_LOG)),
        }
    }

    pub fn record(&self, entry: CommandRecord) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > MAX_COMMAND_LOG {
            entries.pop_front();
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<CommandRecord> {
        self.entries.lock().iter().rev().cloned().collect()
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new()
    }
}
