pub mod api;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use api::TreeholeApiClient;

use async_trait::async_trait;
use treehole_core::{Comment, CoreError, Post};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub keyword: String,
    pub page: u32,
    pub limit: u32,
    pub comment_preview_limit: u32,
}

impl SearchRequest {
    pub fn new(keyword: impl Into<String>, limit: u32) -> Self {
        Self {
            keyword: keyword.into(),
            page: 1,
            limit,
            comment_preview_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub success: bool,
    pub posts: Vec<Post>,
    pub total: i64,
    pub message: String,
}

impl SearchResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPageRequest {
    pub post_id: i64,
    pub page: u32,
    pub page_size: u32,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentPage {
    pub success: bool,
    pub comments: Vec<Comment>,
    pub last_page: u32,
}

/// The two forum calls the retrieval engine depends on.
///
/// Transport faults come back as `Err`; an upstream `success: false` comes
/// back as `Ok` with `success` unset so callers can degrade to "no results".
#[async_trait]
pub trait ForumApi: Send + Sync {
    async fn search_posts(&self, request: &SearchRequest) -> Result<SearchResponse, CoreError>;

    async fn get_comment_page(&self, request: &CommentPageRequest)
        -> Result<CommentPage, CoreError>;
}
