//! Time-bounded memo of tool results.

use chrono::{DateTime, Utc};
use dex_auth::Clock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Entry {
    value: Value,
    stored_at: DateTime<Utc>,
}

/// Caches results by key for a fixed TTL.
pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A live entry for `key`. Expired entries are evicted on the way.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;

        let age = (now - entry.stored_at).to_std().unwrap_or_default();
        if age > self.ttl {
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store `value` under `key`, stamped with the current time.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let entry = Entry {
            value,
            stored_at: self.clock.now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), entry);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of stored entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
