use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ApiError;

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: usize = 1024;

/// Abstraction over a key-value store used for credential revocation.
///
/// Backed by an in-memory map; a shared store (e.g. Redis) slots in here when
/// the control API runs as more than one process.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Sharded TTL map. Expired entries are dropped when read, and swept in bulk
/// every [`SWEEP_EVERY`] writes.
pub struct MemoryStore {
    data: DashMap<String, (String, Instant)>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.data.retain(|_, (_, exp)| *exp > now);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.data.insert(key.to_string(), (value.to_string(), expires_at));
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let now = Instant::now();
        if let Some(entry) = self.data.get(key) {
            let (value, exp) = entry.value();
            if *exp > now {
                return Ok(Some(value.clone()));
            }
        }
        self.data.remove_if(key, |_, (_, exp)| *exp <= now);
        Ok(None)
    }
}
