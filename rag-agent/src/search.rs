use std::sync::Arc;
use tracing::{info, warn};
use treehole_client::{ForumApi, SearchRequest};
use treehole_core::{ErrorExt, Post};

use result_cache::ResultCache;

/// Posts returned by one keyword search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub posts: Vec<Post>,
    pub from_cache: bool,
    /// Set when the live search failed; `posts` is then empty.
    pub failure: Option<String>,
}

/// Keyword search through the result cache, falling back to the forum.
///
/// Failures degrade to an empty result and are never written to the cache.
#[derive(Clone)]
pub struct PostSearcher {
    api: Arc<dyn ForumApi>,
    cache: Option<ResultCache>,
}

impl PostSearcher {
    pub fn new(api: Arc<dyn ForumApi>, cache: Option<ResultCache>) -> Self {
        Self { api, cache }
    }

    pub fn api(&self) -> Arc<dyn ForumApi> {
        Arc::clone(&self.api)
    }

    pub async fn search(&self, keyword: &str, limit: u32) -> SearchOutcome {
        if let Some(cache) = &self.cache {
            if let Some(posts) = cache.get(keyword).await {
                return SearchOutcome {
                    posts,
                    from_cache: true,
                    failure: None,
                };
            }
        }

        info!("正在搜索树洞: {}", keyword);
        let request = SearchRequest::new(keyword, limit);

        match self.api.search_posts(&request).await {
            Ok(response) if response.success => {
                let mut posts = response.posts;
                posts.truncate(limit as usize);

                if let Some(cache) = &self.cache {
                    cache.put(keyword, &posts).await;
                }

                SearchOutcome {
                    posts,
                    from_cache: false,
                    failure: None,
                }
            }
            Ok(response) => {
                let message = if response.message.is_empty() {
                    "未知错误".to_string()
                } else {
                    response.message
                };
                warn!("搜索失败: {}", message);
                SearchOutcome {
                    failure: Some(message),
                    ..Default::default()
                }
            }
            Err(e) => {
                e.log_error();
                SearchOutcome {
                    failure: Some(e.user_friendly_message()),
                    ..Default::default()
                }
            }
        }
    }
}
