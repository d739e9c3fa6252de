use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use treehole_core::CacheError;

use crate::store::{CacheEntry, CacheStore};

/// Process-local backend; one instance per session.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }
}
