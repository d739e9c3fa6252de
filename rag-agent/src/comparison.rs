use tracing::info;
use treehole_core::text::truncate_chars;
use treehole_core::{AgentConfig, EntityResult, SourceRef};

use crate::comment_store::CommentStore;
use crate::progress::ProgressSink;
use crate::review_extractor::ReviewExtractor;
use crate::search::PostSearcher;

/// Tag appended to every course-review search.
pub const REVIEW_SUFFIX: &str = "测评";

/// Reviews per entity that make it into the source list.
const SOURCES_PER_ENTITY: usize = 5;

/// `subject label 测评`, or `subject 测评` without a label.
pub fn compound_keyword(subject: &str, label: &str) -> String {
    let mut parts = vec![subject];
    if !label.is_empty() {
        parts.push(label);
    }
    parts.push(REVIEW_SUFFIX);
    parts.join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonLimits {
    pub max_search_results: u32,
    pub max_reviews_per_entity: usize,
    pub max_review_chars: usize,
}

impl ComparisonLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_search_results: config.max_search_results,
            max_reviews_per_entity: config.max_reviews_per_entity,
            max_review_chars: config.max_review_chars,
        }
    }
}

/// What the synthesis step receives for a multi-entity comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonPayload {
    /// No entity produced a single review; the engine is not consulted.
    InsufficientEvidence { summary: String },
    Ready {
        context: String,
        /// Labels of entities without reviews, listed to the engine as such.
        missing: Vec<String>,
        used_reviews: usize,
    },
}

pub struct ComparisonAggregator<'a> {
    searcher: &'a PostSearcher,
    extractor: &'a ReviewExtractor,
    limits: ComparisonLimits,
    progress: Option<&'a dyn ProgressSink>,
}

impl<'a> ComparisonAggregator<'a> {
    pub fn new(
        searcher: &'a PostSearcher,
        extractor: &'a ReviewExtractor,
        limits: ComparisonLimits,
    ) -> Self {
        Self {
            searcher,
            extractor,
            limits,
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

    /// Searches and extracts reviews for each label independently, in order.
    pub async fn collect(
        &self,
        store: &mut CommentStore,
        subject: &str,
        labels: &[String],
    ) -> Vec<EntityResult> {
        let mut results = Vec::with_capacity(labels.len());

        for label in labels {
            let search_keyword = compound_keyword(subject, label);
            self.report(&format!("[{}] 搜索关键词: {}", label, search_keyword));

            let mut posts = self
                .searcher
                .search(&search_keyword, self.limits.max_search_results)
                .await
                .posts;

            if posts.is_empty() {
                self.report(&format!("[{}] 未找到帖子", label));
                results.push(EntityResult {
                    entity_label: label.clone(),
                    search_keyword,
                    posts,
                    reviews: Vec::new(),
                });
                continue;
            }

            self.report(&format!(
                "[{}] 找到 {} 个帖子，提取测评中...",
                label,
                posts.len()
            ));
            let reviews = self
                .extractor
                .extract_reviews(store, &mut posts, subject, label)
                .await;
            self.report(&format!("[{}] 提取到 {} 条测评", label, reviews.len()));

            results.push(EntityResult {
                entity_label: label.clone(),
                search_keyword,
                posts,
                reviews,
            });
        }

        results
    }

    pub fn build_payload(&self, results: &[EntityResult]) -> ComparisonPayload {
        build_payload(results, self.limits)
    }
}

pub fn build_payload(results: &[EntityResult], limits: ComparisonLimits) -> ComparisonPayload {
    if results.iter().all(|r| r.reviews.is_empty()) {
        let summary = results
            .iter()
            .map(|r| format!("{}: {}帖/0测评", r.entity_label, r.posts.len()))
            .collect::<Vec<_>>()
            .join("；");
        return ComparisonPayload::InsufficientEvidence { summary };
    }

    let mut context = String::new();
    let mut used_reviews = 0;

    for result in results.iter().filter(|r| !r.reviews.is_empty()) {
        let label = &result.entity_label;
        let shown = &result.reviews[..result.reviews.len().min(limits.max_reviews_per_entity)];
        used_reviews += shown.len();

        context.push_str(&format!("\n===== 老师：{} =====\n", label));
        context.push_str(&format!("搜索关键词：{}\n", result.search_keyword));
        context.push_str(&format!(
            "帖子数：{}，测评数：{}\n",
            result.posts.len(),
            result.reviews.len()
        ));

        for (i, review) in shown.iter().enumerate() {
            let op_mark = if review.is_original_author { "[洞主]" } else { "" };
            context.push_str(&format!(
                "\n--- {} 评论{} {} (帖子#{}) ---\n{}\n",
                label,
                i + 1,
                op_mark,
                review.post_id,
                truncate_chars(&review.text, limits.max_review_chars)
            ));
        }

        let omitted = result.reviews.len() - shown.len();
        if omitted > 0 {
            context.push_str(&format!("\n[注] {} 还有 {} 条测评未展开\n", label, omitted));
        }
    }

    let missing = results
        .iter()
        .filter(|r| r.reviews.is_empty())
        .map(|r| r.entity_label.clone())
        .collect();

    ComparisonPayload::Ready {
        context,
        missing,
        used_reviews,
    }
}

/// First few reviews of every entity that has any, tagged with its label.
pub fn comparison_sources(results: &[EntityResult]) -> Vec<SourceRef> {
    results
        .iter()
        .flat_map(|r| {
            r.reviews
                .iter()
                .take(SOURCES_PER_ENTITY)
                .map(move |review| SourceRef::from_review(review, Some(r.entity_label.as_str())))
        })
        .collect()
}
