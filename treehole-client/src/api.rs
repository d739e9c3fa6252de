use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::{CommentPage, CommentPageRequest, ForumApi, SearchRequest, SearchResponse};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use treehole_core::{Comment, CoreError, ForumApiError, ForumConfig, Post, ANONYMOUS_TAG};

const SEARCH_PATH: &str = "/chapi/api/v3/hole/list_comments";
const COMMENT_PATH: &str = "/api/pku_comment_v3";
const SEARCH_SUCCESS_CODE: i64 = 20000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub code: i64,
    #[serde(default)]
    pub data: Option<SearchData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub list: Vec<PostData>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostData {
    pub pid: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub likenum: i64,
    #[serde(default)]
    pub reply: i64,
    #[serde(default)]
    pub comment_total: i64,
    #[serde(default)]
    pub tag: Option<Value>,
    #[serde(default)]
    pub comments: Option<Vec<CommentData>>,
    #[serde(default)]
    pub comment_list: Option<Vec<CommentData>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentData {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_lz: Option<Value>,
    #[serde(default)]
    pub name_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<CommentListData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentListData {
    #[serde(default)]
    pub data: Vec<CommentData>,
    #[serde(default)]
    pub last_page: Option<u32>,
}

impl From<CommentData> for Comment {
    fn from(data: CommentData) -> Self {
        let is_original_author = match data.is_lz {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::Bool(b)) => b,
            _ => false,
        };
        Self {
            text: data.text.unwrap_or_default(),
            is_original_author,
            display_tag: data
                .name_tag
                .filter(|tag| !tag.is_empty())
                .unwrap_or_else(|| ANONYMOUS_TAG.to_string()),
        }
    }
}

impl From<PostData> for Post {
    fn from(data: PostData) -> Self {
        // `comments` wins when populated, then `comment_list`, then nothing
        let comments = data
            .comments
            .filter(|list| !list.is_empty())
            .or(data.comment_list.filter(|list| !list.is_empty()))
            .unwrap_or_default();

        let tag = match data.tag {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Null) | None => None,
            Some(Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        };

        Self {
            id: data.pid,
            text: data.text.unwrap_or_default(),
            timestamp_utc: data.timestamp,
            like_count: data.likenum,
            reply_count: data.reply,
            comment_total: data.comment_total,
            tag,
            comments: comments.into_iter().map(Comment::from).collect(),
        }
    }
}

impl From<SearchEnvelope> for SearchResponse {
    fn from(envelope: SearchEnvelope) -> Self {
        let message = envelope.message.unwrap_or_default();
        if envelope.code != SEARCH_SUCCESS_CODE {
            return SearchResponse::failed(if message.is_empty() {
                format!("code {}", envelope.code)
            } else {
                message
            });
        }
        let data = envelope.data.unwrap_or(SearchData {
            list: Vec::new(),
            total: 0,
        });
        SearchResponse {
            success: true,
            posts: data.list.into_iter().map(Post::from).collect(),
            total: data.total,
            message,
        }
    }
}

impl From<CommentEnvelope> for CommentPage {
    fn from(envelope: CommentEnvelope) -> Self {
        if !envelope.success {
            return CommentPage {
                success: false,
                comments: Vec::new(),
                last_page: 0,
            };
        }
        let data = envelope.data.unwrap_or(CommentListData {
            data: Vec::new(),
            last_page: None,
        });
        CommentPage {
            success: true,
            comments: data.data.into_iter().map(Comment::from).collect(),
            last_page: data.last_page.unwrap_or(1),
        }
    }
}

/// HTTP client for the treehole API, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct TreeholeApiClient {
    http_client: Client,
    base_url: String,
    token: String,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    retry: Arc<RetryExecutor>,
}

impl TreeholeApiClient {
    pub fn new(config: &ForumConfig, max_attempts: u32) -> Result<Self, CoreError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ForumApiError::InvalidToken)?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::treehole())),
            metrics: Arc::new(MetricsCollector::new()),
            retry: Arc::new(RetryExecutor::new(RetryConfig::treehole(max_attempts))),
        })
    }

    async fn make_request(
        &self,
        endpoint: &str,
        path: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, path);
        let start_time = Instant::now();

        let _permit = self.rate_limiter.acquire_permit().await;
        debug!("Acquired rate limit permit for {}", endpoint);

        let result = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query_params)
            .send()
            .await;

        let (outcome, status_code, error_type) = match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                (Ok(response), Some(status), None)
            }
            Ok(response) => {
                let status = response.status().as_u16();
                error!("Request failed with status {} for {}", status, endpoint);
                let error = match status {
                    429 => {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!("Rate limited, retry after {} seconds", retry_after);
                        ForumApiError::RateLimitExceeded { retry_after }
                    }
                    401 => ForumApiError::InvalidToken,
                    403 => ForumApiError::Forbidden {
                        resource: path.to_string(),
                    },
                    s if s >= 500 => ForumApiError::ServerError { status_code: s },
                    _ => ForumApiError::InvalidResponse {
                        details: format!("unexpected status {}", status),
                    },
                };
                let error_type = match &error {
                    ForumApiError::RateLimitExceeded { .. } => "rate_limited",
                    ForumApiError::InvalidToken => "unauthorized",
                    ForumApiError::Forbidden { .. } => "forbidden",
                    ForumApiError::ServerError { .. } => "server_error",
                    _ => "bad_status",
                };
                (Err(error.into()), Some(status), Some(error_type.to_string()))
            }
            Err(e) => {
                error!("Network error for {}: {}", endpoint, e);
                let error = if e.is_timeout() {
                    CoreError::ForumApi(ForumApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                };
                (Err(error), None, Some("network_error".to_string()))
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: outcome.is_ok(),
                rate_limited: status_code == Some(429),
                error_type,
            })
            .await;

        outcome
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        endpoint: &str,
        path: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        self.retry
            .execute(endpoint, || async move {
                let response = self.make_request(endpoint, path, query_params).await?;
                response.json::<T>().await.map_err(|e| {
                    error!("Failed to parse {} response: {}", endpoint, e);
                    CoreError::ForumApi(ForumApiError::InvalidResponse {
                        details: format!("failed to decode {} payload", endpoint),
                    })
                })
            })
            .await
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

#[async_trait]
impl ForumApi for TreeholeApiClient {
    async fn search_posts(&self, request: &SearchRequest) -> Result<SearchResponse, CoreError> {
        let params = [
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
            ("comment_limit", request.comment_preview_limit.to_string()),
            ("keyword", request.keyword.clone()),
        ];

        let envelope: SearchEnvelope = self.get_json("search", SEARCH_PATH, &params).await?;
        let response = SearchResponse::from(envelope);
        if response.success {
            info!(
                "Search '{}' returned {} posts (total {})",
                request.keyword,
                response.posts.len(),
                response.total
            );
        } else {
            warn!("Search '{}' failed: {}", request.keyword, response.message);
        }
        Ok(response)
    }

    async fn get_comment_page(
        &self,
        request: &CommentPageRequest,
    ) -> Result<CommentPage, CoreError> {
        let path = format!("{}/{}", COMMENT_PATH, request.post_id);
        let params = [
            ("page", request.page.to_string()),
            ("limit", request.page_size.to_string()),
            ("sort", request.sort_order.as_str().to_string()),
        ];

        let envelope: CommentEnvelope = self.get_json("comments", &path, &params).await?;
        let page = CommentPage::from(envelope);
        debug!(
            "Fetched comment page {}/{} for post #{} ({} comments)",
            request.page,
            page.last_page,
            request.post_id,
            page.comments.len()
        );
        Ok(page)
    }
}
