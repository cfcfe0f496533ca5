pub mod ban;
pub mod id;
pub mod protocol;

pub use ban::{BanEventId, BanNotice};

/// Current time as unix milliseconds, the timestamp unit used on the wire.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
