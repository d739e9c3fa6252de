use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use treehole_core::{CacheConfig, CoreError, ErrorExt, Post};

use crate::store::{CacheEntry, CacheStore};

/// Lowercase hex SHA-256 of the trimmed keyword.
pub fn cache_key(keyword: &str) -> String {
    let digest = Sha256::digest(keyword.trim().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Saturates at the largest representable duration, so an oversized TTL
/// means "never expires".
fn ttl_duration(ttl_secs: u64) -> Duration {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Keyword-keyed, TTL-bounded memo of search results.
///
/// Backend failures never reach the caller: a failed read is a miss and a
/// failed write is logged and dropped.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl: ttl_duration(ttl_secs),
        }
    }

    pub fn from_config(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::new(store, config.ttl_secs)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, keyword: &str) -> Option<Vec<Post>> {
        self.get_at(keyword, Utc::now()).await
    }

    /// Lookup as of `now`. Expired entries are a full miss.
    pub async fn get_at(&self, keyword: &str, now: DateTime<Utc>) -> Option<Vec<Post>> {
        let key = cache_key(keyword);
        let entry = match self.store.load(&key).await {
            Ok(entry) => entry?,
            Err(e) => {
                CoreError::from(e).log_warn();
                return None;
            }
        };

        if entry.is_fresh(now, self.ttl) {
            info!("使用缓存结果: {}", keyword.trim());
            Some(entry.payload)
        } else {
            debug!(
                "Cache entry for '{}' expired (written {})",
                keyword.trim(),
                entry.written_at
            );
            None
        }
    }

    pub async fn put(&self, keyword: &str, posts: &[Post]) {
        self.put_at(keyword, posts, Utc::now()).await
    }

    /// Writes the full result set, replacing whatever the key held before.
    pub async fn put_at(&self, keyword: &str, posts: &[Post], now: DateTime<Utc>) {
        let entry = CacheEntry {
            key: cache_key(keyword),
            keyword: keyword.trim().to_string(),
            payload: posts.to_vec(),
            written_at: now,
        };

        if let Err(e) = self.store.store(entry).await {
            CoreError::from(e).log_warn();
        }
    }
}
