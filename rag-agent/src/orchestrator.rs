use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use llm_interface::{
    answer_or_apologize, complete_or_empty, search_tool, ChatMessage, EngineReply, OutputSink,
    ReasoningEngine, SearchDecision, SEARCH_TOOL_NAME,
};
use treehole_core::{AgentConfig, Post, SearchIteration};

use crate::context::{format_posts_batch, smart_truncate, CommentLimit};
use crate::progress::ProgressSink;
use crate::prompts;
use crate::search::PostSearcher;

/// Cap on posts per tool search and on posts shown in one observation.
const OBSERVATION_POST_CAP: usize = 30;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_iterations: u32,
    pub results_per_search: u32,
    pub observation_posts: usize,
    pub observation_tokens: usize,
    pub comment_limit: CommentLimit,
    pub search_delay: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_search_iterations,
            results_per_search: config.max_search_results.min(OBSERVATION_POST_CAP as u32),
            observation_posts: OBSERVATION_POST_CAP,
            observation_tokens: config.tool_observation_tokens,
            comment_limit: CommentLimit::from_setting(config.max_comments_per_post),
            search_delay: config.search_delay(),
        }
    }

    /// Decision rounds allowed in total, so a run of undecodable tool calls
    /// cannot keep the loop alive.
    fn max_rounds(&self) -> u32 {
        self.max_iterations.saturating_mul(2).max(1)
    }
}

/// Result of one iterative search session.
#[derive(Debug, Clone, Default)]
pub struct SearchRun {
    pub answer: String,
    pub history: Vec<SearchIteration>,
    /// Every retrieved post, unique by id, in first-seen order.
    pub posts: Vec<Post>,
    pub transcript: Vec<ChatMessage>,
}

enum Step {
    AwaitingDecision,
    Searching(EngineReply),
    Finalizing,
}

/// Posts keyed by id; a later copy replaces an earlier one in place.
#[derive(Debug, Default)]
struct PostAccumulator {
    posts: Vec<Post>,
    index: HashMap<i64, usize>,
}

impl PostAccumulator {
    fn merge(&mut self, posts: Vec<Post>) {
        for post in posts {
            match self.index.get(&post.id) {
                Some(&i) => self.posts[i] = post,
                None => {
                    self.index.insert(post.id, self.posts.len());
                    self.posts.push(post);
                }
            }
        }
    }
}

/// Bounded loop in which the reasoning engine picks search keywords, reads
/// the results and decides when to answer.
pub struct SearchOrchestrator<'a> {
    searcher: &'a PostSearcher,
    engine: &'a dyn ReasoningEngine,
    settings: OrchestratorSettings,
    progress: Option<&'a dyn ProgressSink>,
}

impl<'a> SearchOrchestrator<'a> {
    pub fn new(
        searcher: &'a PostSearcher,
        engine: &'a dyn ReasoningEngine,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            searcher,
            engine,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    fn report(&self, message: &str) {
        info!("{}", message);
        if let Some(progress) = self.progress {
            progress.report(message);
        }
    }

    pub async fn run(&self, question: &str, sink: &dyn OutputSink) -> SearchRun {
        let tool = search_tool();
        let mut messages = vec![
            ChatMessage::system(prompts::auto_system(self.settings.max_iterations)),
            ChatMessage::user(prompts::auto_user(question)),
        ];
        let mut history: Vec<SearchIteration> = Vec::new();
        let mut accumulated = PostAccumulator::default();
        let mut rounds = 0u32;

        self.report("✓ LLM 开始分析问题...");

        let mut step = Step::AwaitingDecision;
        loop {
            step = match step {
                Step::AwaitingDecision => {
                    let searches = history.len() as u32;
                    if searches >= self.settings.max_iterations {
                        info!("Search bound of {} reached", self.settings.max_iterations);
                        Step::Finalizing
                    } else if rounds >= self.settings.max_rounds() {
                        warn!("Giving up after {} decision rounds", rounds);
                        Step::Finalizing
                    } else {
                        rounds += 1;
                        let reply = complete_or_empty(self.engine, &messages, Some(&tool)).await;
                        if reply.requests_tools() {
                            Step::Searching(reply)
                        } else {
                            debug!("Engine requested no further searches");
                            Step::Finalizing
                        }
                    }
                }
                Step::Searching(reply) => {
                    self.handle_tool_calls(reply, &mut messages, &mut history, &mut accumulated)
                        .await;
                    Step::AwaitingDecision
                }
                Step::Finalizing => break,
            };
        }

        let posts = accumulated.posts;
        self.report(&format!(
            "✓ 总共找到 {} 个不重复的帖子，正在生成回答...",
            posts.len()
        ));

        messages.push(ChatMessage::user(prompts::AUTO_FINALIZE));
        let answer = answer_or_apologize(self.engine, &messages, sink).await;

        SearchRun {
            answer,
            history,
            posts,
            transcript: messages,
        }
    }

    async fn handle_tool_calls(
        &self,
        reply: EngineReply,
        messages: &mut Vec<ChatMessage>,
        history: &mut Vec<SearchIteration>,
        accumulated: &mut PostAccumulator,
    ) {
        let decisions = SearchDecision::decode_reply(&reply);
        let mut answered = Vec::new();
        let mut observations = Vec::new();

        for (call, decision) in reply.tool_calls.iter().zip(decisions) {
            match decision {
                SearchDecision::Continue {
                    call_id,
                    keyword,
                    reason,
                } => {
                    if history.len() as u32 >= self.settings.max_iterations {
                        debug!("Dropping search for '{}': bound reached", keyword);
                        continue;
                    }

                    let index = history.len() as u32 + 1;
                    let (observation, posts) = self.search(index, &keyword, reason.as_deref()).await;
                    history.push(SearchIteration {
                        index,
                        keyword,
                        reason,
                    });
                    accumulated.merge(posts);

                    answered.push(call.clone());
                    observations.push(ChatMessage::tool_result(
                        call_id,
                        SEARCH_TOOL_NAME,
                        observation,
                    ));

                    if !self.settings.search_delay.is_zero() {
                        tokio::time::sleep(self.settings.search_delay).await;
                    }
                }
                SearchDecision::Malformed { call_id, details } => {
                    answered.push(call.clone());
                    observations.push(ChatMessage::tool_result(
                        call_id,
                        call.name(),
                        prompts::malformed_observation(&details),
                    ));
                }
                SearchDecision::Finalize => {}
            }
        }

        if !answered.is_empty() {
            messages.push(ChatMessage::assistant_tool_calls(reply.content, answered));
            messages.extend(observations);
        }
    }

    async fn search(
        &self,
        index: u32,
        keyword: &str,
        reason: Option<&str>,
    ) -> (String, Vec<Post>) {
        let outcome = self
            .searcher
            .search(keyword, self.settings.results_per_search)
            .await;
        let posts = outcome.posts;

        let mut summary = format!("[第{}次搜索] 关键词: {}", index, keyword);
        if let Some(reason) = reason {
            summary.push_str(&format!("\n搜索原因: {}", reason));
        }
        summary.push_str(&format!("\n✓ 找到 {} 个帖子", posts.len()));
        self.report(&summary);

        let observation = if posts.is_empty() {
            prompts::search_empty_observation(keyword)
        } else {
            let head = &posts[..posts.len().min(self.settings.observation_posts)];
            let shown = smart_truncate(head, self.settings.observation_tokens);
            prompts::search_observation(
                posts.len(),
                shown.len(),
                &format_posts_batch(shown, self.settings.comment_limit),
            )
        };

        (observation, posts)
    }
}
