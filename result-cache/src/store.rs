use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use treehole_core::{CacheError, Post};

/// Search results stored under the hash of their keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub keyword: String,
    pub payload: Vec<Post>,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.written_at < ttl
    }
}

/// Backend holding cache entries. `store` replaces any existing entry with
/// the same key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError>;
}
