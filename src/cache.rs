//! Short-TTL key-value cache abstraction.
//!
//! The engine treats the cache as optional infrastructure: an absent or
//! failing backend silently degrades to "always fetch". Values cross the
//! trait boundary as JSON so backends stay interchangeable.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Generic get/set cache with a per-entry TTL.
pub trait CacheStore: Send + Sync {
    /// Returns the value for `key` if present and unexpired.
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    /// Stores `value` under `key` for at most `ttl`.
    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
}

/// In-process cache backend with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, serde_json::Value)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        match entries.get(key) {
            Some((expires_at, value)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
    }
}
