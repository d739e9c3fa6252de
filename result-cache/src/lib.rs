pub mod cache;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use cache::{cache_key, ResultCache};
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use store::{CacheEntry, CacheStore};

use std::sync::Arc;
use treehole_core::{CacheBackend, CacheConfig, CacheError};

/// Builds the cache described by `config`, or `None` when caching is off.
pub async fn open_cache(config: &CacheConfig) -> Result<Option<ResultCache>, CacheError> {
    if !config.enabled {
        return Ok(None);
    }

    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
        CacheBackend::Sqlite => Arc::new(SqliteCacheStore::connect(&config.sqlite_url).await?),
    };

    Ok(Some(ResultCache::from_config(store, config)))
}
