use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache key for the rendered index listing
pub const INDEX_CACHE_KEY: &str = "posts:index";

/// How long a cached page stays fresh
pub const DEFAULT_TTL_SECS: u64 = 20;

struct CacheEntry {
    body: Vec<u8>,
    stored_at: Instant,
}

/// Rendered-page cache with a fixed TTL and explicit invalidation.
///
/// Entries are returned unconditionally inside their window, even if the
/// underlying data changed; `clear` is the only way to force freshness
/// before expiry.
pub struct PageCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, body: Vec<u8>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every cached page
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
