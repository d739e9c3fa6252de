use std::sync::Arc;
use tracing::info;

use llm_interface::{answer_or_apologize, BufferedSink, ChatMessage, OutputSink, ReasoningEngine};
use result_cache::ResultCache;
use treehole_client::ForumApi;
use treehole_core::text::{dedup_labels, parse_labels};
use treehole_core::{AgentConfig, AppConfig, EntityResult, QueryAnswer, SourceRef};

use crate::comment_store::CommentStore;
use crate::comparison::{
    comparison_sources, compound_keyword, ComparisonAggregator, ComparisonLimits,
    ComparisonPayload,
};
use crate::context::{format_posts_batch, smart_truncate, CommentLimit};
use crate::orchestrator::{OrchestratorSettings, SearchOrchestrator};
use crate::progress::ProgressSink;
use crate::prompts;
use crate::review_extractor::ReviewExtractor;
use crate::search::PostSearcher;

/// Posts listed as sources after an iterative search.
const AUTO_SOURCE_LIMIT: usize = 20;
/// Reviews listed as sources for a single-entity review.
const REVIEW_SOURCE_LIMIT: usize = 10;
/// Post ids listed when posts were found but no review matched.
const FALLBACK_SOURCE_LIMIT: usize = 5;

/// One retrieval session. Owns its comment memo; the forum client, engine
/// and cache may be shared with other sessions.
pub struct TreeholeAgent {
    searcher: PostSearcher,
    engine: Arc<dyn ReasoningEngine>,
    comments: CommentStore,
    extractor: ReviewExtractor,
    config: AgentConfig,
    sink: Option<Arc<dyn OutputSink>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl TreeholeAgent {
    pub fn new(
        api: Arc<dyn ForumApi>,
        engine: Arc<dyn ReasoningEngine>,
        config: &AppConfig,
    ) -> Self {
        Self {
            searcher: PostSearcher::new(Arc::clone(&api), None),
            engine,
            comments: CommentStore::new(api, config.forum.comment_page_size),
            extractor: ReviewExtractor::new(config.agent.inter_post_delay()),
            config: config.agent.clone(),
            sink: None,
            progress: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<ResultCache>) -> Self {
        self.searcher = PostSearcher::new(self.searcher.api(), cache);
        self
    }

    /// Where streamed answers go. Without one the text is only returned.
    pub fn with_output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn comment_store(&self) -> &CommentStore {
        &self.comments
    }

    fn report(&self, message: &str) {
        info!("{}", message);
        if let Some(progress) = &self.progress {
            progress.report(message);
        }
    }

    /// Answer produced without consulting the engine; still goes to the sink.
    fn direct_answer(&self, answer: String) -> QueryAnswer {
        if let Some(sink) = &self.sink {
            sink.emit(&answer);
            sink.finish();
        }
        QueryAnswer::text(answer)
    }

    async fn synthesize(&self, messages: &[ChatMessage]) -> String {
        match &self.sink {
            Some(sink) => answer_or_apologize(self.engine.as_ref(), messages, sink.as_ref()).await,
            None => {
                answer_or_apologize(self.engine.as_ref(), messages, &BufferedSink::new()).await
            }
        }
    }

    /// Answers `question` from a single search for `keyword`.
    pub async fn manual_search(&mut self, keyword: &str, question: &str) -> QueryAnswer {
        let keyword = keyword.trim();
        let posts = self
            .searcher
            .search(keyword, self.config.max_search_results)
            .await
            .posts;

        if posts.is_empty() {
            return QueryAnswer {
                keyword: Some(keyword.to_string()),
                ..self.direct_answer(format!("抱歉，没有找到关于「{}」的相关树洞内容。", keyword))
            };
        }
        self.report(&format!("✓ 找到 {} 个帖子", posts.len()));

        let head = &posts[..posts.len().min(self.config.max_context_posts)];
        let context_posts = smart_truncate(head, self.config.manual_context_tokens);
        self.report(&format!("✓ 使用 {} 个帖子作为上下文", context_posts.len()));

        let context = format_posts_batch(
            context_posts,
            CommentLimit::from_setting(self.config.max_comments_per_post),
        );
        let messages = vec![
            ChatMessage::system(prompts::MANUAL_SYSTEM),
            ChatMessage::user(prompts::manual_user(&context, question)),
        ];
        let answer = self.synthesize(&messages).await;

        QueryAnswer {
            answer,
            sources: context_posts.iter().map(SourceRef::from_post).collect(),
            num_sources: context_posts.len(),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        }
    }

    /// Lets the engine search iteratively, then answers from everything found.
    pub async fn auto_search(&mut self, question: &str) -> QueryAnswer {
        let orchestrator = SearchOrchestrator::new(
            &self.searcher,
            self.engine.as_ref(),
            OrchestratorSettings::from_config(&self.config),
        )
        .with_progress(self.progress.as_deref());

        let run = match &self.sink {
            Some(sink) => orchestrator.run(question, sink.as_ref()).await,
            None => orchestrator.run(question, &BufferedSink::new()).await,
        };

        QueryAnswer {
            answer: run.answer,
            sources: run
                .posts
                .iter()
                .take(AUTO_SOURCE_LIMIT)
                .map(SourceRef::from_post)
                .collect(),
            num_sources: run.posts.len(),
            search_history: Some(run.history),
            ..Default::default()
        }
    }

    /// Course review for `subject`. `labels_text` names zero or more
    /// instructors; more than one switches to a side-by-side comparison.
    pub async fn course_review(&mut self, subject: &str, labels_text: &str) -> QueryAnswer {
        let labels = parse_labels(labels_text);
        if labels.len() > 1 {
            return self.compare_course(subject, &labels).await;
        }
        let label = labels.into_iter().next().unwrap_or_default();
        self.single_course_review(subject.trim(), &label).await
    }

    /// Side-by-side review of `subject` across several instructors.
    pub async fn compare_course(&mut self, subject: &str, labels: &[String]) -> QueryAnswer {
        let subject = subject.trim();
        let labels = dedup_labels(labels.iter().cloned());

        match labels.len() {
            0 => return self.single_course_review(subject, "").await,
            1 => return self.single_course_review(subject, &labels[0]).await,
            _ => {}
        }

        self.report(&format!(
            "目标课程: {}，待对比老师: {}",
            subject,
            labels.join(", ")
        ));

        let aggregator = ComparisonAggregator::new(
            &self.searcher,
            &self.extractor,
            ComparisonLimits::from_config(&self.config),
        )
        .with_progress(self.progress.as_deref());

        let results = aggregator.collect(&mut self.comments, subject, &labels).await;
        let entity_stats = results.iter().map(EntityResult::stats).collect();

        match aggregator.build_payload(&results) {
            ComparisonPayload::InsufficientEvidence { summary } => QueryAnswer {
                subject: Some(subject.to_string()),
                entities: labels,
                entity_stats: Some(entity_stats),
                ..self.direct_answer(format!(
                    "抱歉，未能提取到「{}」不同老师的有效测评。检索情况：{}",
                    subject, summary
                ))
            },
            ComparisonPayload::Ready {
                context,
                missing,
                used_reviews,
            } => {
                let missing_info = if missing.is_empty() {
                    "无".to_string()
                } else {
                    missing.join("、")
                };
                let messages = vec![
                    ChatMessage::system(prompts::comparison_system(subject)),
                    ChatMessage::user(prompts::comparison_user(subject, &context, &missing_info)),
                ];
                let answer = self.synthesize(&messages).await;

                QueryAnswer {
                    answer,
                    sources: comparison_sources(&results),
                    num_sources: used_reviews,
                    subject: Some(subject.to_string()),
                    entities: labels,
                    entity_stats: Some(entity_stats),
                    ..Default::default()
                }
            }
        }
    }

    async fn single_course_review(&mut self, subject: &str, label: &str) -> QueryAnswer {
        let label_display = if label.is_empty() { "未指定老师" } else { label };
        let entities: Vec<String> = if label.is_empty() {
            Vec::new()
        } else {
            vec![label.to_string()]
        };

        let keyword = compound_keyword(subject, label);
        self.report(&format!("搜索关键词: {}", keyword));

        let mut posts = self
            .searcher
            .search(&keyword, self.config.max_search_results)
            .await
            .posts;

        if posts.is_empty() {
            return QueryAnswer {
                subject: Some(subject.to_string()),
                entities,
                ..self.direct_answer(format!(
                    "抱歉，没有找到关于「{} {}」课程的测评内容。",
                    subject, label_display
                ))
            };
        }
        self.report(&format!("✓ 找到 {} 个帖子", posts.len()));
        self.report("✓ 正在从评论中提取课程测评...");

        let reviews = self
            .extractor
            .extract_reviews(&mut self.comments, &mut posts, subject, label)
            .await;

        if reviews.is_empty() {
            let sources: Vec<SourceRef> = posts
                .iter()
                .take(FALLBACK_SOURCE_LIMIT)
                .map(SourceRef::from_post)
                .collect();
            return QueryAnswer {
                num_sources: sources.len(),
                sources,
                subject: Some(subject.to_string()),
                entities,
                ..self.direct_answer(format!(
                    "找到了 {} 个帖子，但没有发现包含「{}」的详细测评内容。",
                    posts.len(),
                    subject
                ))
            };
        }
        self.report(&format!("✓ 提取到 {} 条与课程相关的测评", reviews.len()));

        let mut reviews_text = String::new();
        for (i, review) in reviews.iter().enumerate() {
            let op_mark = if review.is_original_author { "[洞主]" } else { "" };
            reviews_text.push_str(&format!(
                "\n--- 评论 {} {} (帖子#{}) ---\n{}\n",
                i + 1,
                op_mark,
                review.post_id,
                review.text
            ));
        }

        let messages = vec![
            ChatMessage::system(prompts::course_review_system(subject, label_display)),
            ChatMessage::user(prompts::course_review_user(
                subject,
                label_display,
                &reviews_text,
            )),
        ];
        let answer = self.synthesize(&messages).await;

        QueryAnswer {
            answer,
            sources: reviews
                .iter()
                .take(REVIEW_SOURCE_LIMIT)
                .map(|r| SourceRef::from_review(r, None))
                .collect(),
            num_sources: reviews.len(),
            subject: Some(subject.to_string()),
            entities,
            ..Default::default()
        }
    }
}
