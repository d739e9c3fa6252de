#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use llm_interface::{ChatMessage, EngineReply, OutputSink, ReasoningEngine, ToolCall, ToolDefinition};
use treehole_client::{
    CommentPage, CommentPageRequest, ForumApi, SearchRequest, SearchResponse,
};
use treehole_core::{AppConfig, Comment, CoreError, ForumApiError, LlmError, Post};

pub fn post(id: i64, text: &str) -> Post {
    Post {
        id,
        text: text.to_string(),
        timestamp_utc: 0,
        like_count: 0,
        reply_count: 0,
        comment_total: 0,
        tag: None,
        comments: Vec::new(),
    }
}

pub fn comment(text: &str, is_op: bool) -> Comment {
    Comment {
        text: text.to_string(),
        is_original_author: is_op,
        display_tag: if is_op { "洞主".to_string() } else { "Alice".to_string() },
    }
}

/// Config with every delay zeroed.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.agent.search_delay_ms = 0;
    config.agent.inter_post_delay_ms = 0;
    config.forum.comment_page_size = 10;
    config
}

/// In-memory forum keyed by exact search keyword.
#[derive(Default)]
pub struct FakeForum {
    results: HashMap<String, Vec<Post>>,
    comments: HashMap<i64, Vec<Comment>>,
    failing_keywords: HashSet<String>,
    unreachable_keywords: HashSet<String>,
    searches: Mutex<Vec<String>>,
    comment_requests: Mutex<Vec<CommentPageRequest>>,
}

impl FakeForum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, keyword: &str, posts: Vec<Post>) -> Self {
        self.results.insert(keyword.to_string(), posts);
        self
    }

    /// Full comment list served through paging; attached lists on posts are
    /// set separately.
    pub fn with_comments(mut self, post_id: i64, comments: Vec<Comment>) -> Self {
        self.comments.insert(post_id, comments);
        self
    }

    pub fn failing(mut self, keyword: &str) -> Self {
        self.failing_keywords.insert(keyword.to_string());
        self
    }

    /// Searches for `keyword` fail at the transport level.
    pub fn unreachable(mut self, keyword: &str) -> Self {
        self.unreachable_keywords.insert(keyword.to_string());
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn comment_requests(&self) -> Vec<CommentPageRequest> {
        self.comment_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForumApi for FakeForum {
    async fn search_posts(&self, request: &SearchRequest) -> Result<SearchResponse, CoreError> {
        self.searches.lock().unwrap().push(request.keyword.clone());

        if self.unreachable_keywords.contains(&request.keyword) {
            return Err(ForumApiError::RequestTimeout.into());
        }
        if self.failing_keywords.contains(&request.keyword) {
            return Ok(SearchResponse::failed("upstream refused"));
        }

        let posts = self
            .results
            .get(&request.keyword)
            .cloned()
            .unwrap_or_default();
        Ok(SearchResponse {
            success: true,
            total: posts.len() as i64,
            posts,
            message: String::new(),
        })
    }

    async fn get_comment_page(
        &self,
        request: &CommentPageRequest,
    ) -> Result<CommentPage, CoreError> {
        self.comment_requests.lock().unwrap().push(request.clone());

        let all = self
            .comments
            .get(&request.post_id)
            .ok_or_else(|| ForumApiError::Upstream {
                message: format!("no comments for post #{}", request.post_id),
            })?;
        let size = request.page_size as usize;
        let last_page = ((all.len() + size - 1) / size).max(1) as u32;
        let start = (request.page as usize - 1) * size;
        let comments = all.iter().skip(start).take(size).cloned().collect();

        Ok(CommentPage {
            success: true,
            comments,
            last_page,
        })
    }
}

/// Replays queued decision replies, then keeps returning `fallback`.
/// Streaming emits `answer` in two chunks, or fails when `answer` is `None`.
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<EngineReply>>,
    fallback: EngineReply,
    answer: Option<String>,
    decision_calls: Mutex<Vec<Vec<ChatMessage>>>,
    stream_calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedEngine {
    pub fn new(answer: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: EngineReply::default(),
            answer: Some(answer.to_string()),
            decision_calls: Mutex::new(Vec::new()),
            stream_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_stream() -> Self {
        Self {
            answer: None,
            ..Self::new("")
        }
    }

    pub fn then(self, reply: EngineReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn otherwise(mut self, reply: EngineReply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn decision_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.decision_calls.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.stream_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tool: Option<&ToolDefinition>,
    ) -> Result<EngineReply, CoreError> {
        self.decision_calls.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &dyn OutputSink,
    ) -> Result<String, CoreError> {
        self.stream_calls.lock().unwrap().push(messages.to_vec());
        match &self.answer {
            Some(answer) => {
                let split = answer.char_indices().nth(answer.chars().count() / 2);
                let (head, tail) = answer.split_at(split.map_or(answer.len(), |(i, _)| i));
                sink.emit(head);
                sink.emit(tail);
                sink.finish();
                Ok(answer.clone())
            }
            None => Err(LlmError::ServiceUnavailable {
                provider: "Scripted".to_string(),
            }
            .into()),
        }
    }
}

pub fn search_call(id: &str, keyword: &str) -> ToolCall {
    ToolCall::function(
        id,
        "search_treehole",
        serde_json::json!({ "keyword": keyword, "reason": "test" }).to_string(),
    )
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
