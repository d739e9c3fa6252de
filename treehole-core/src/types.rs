use serde::{Deserialize, Serialize};

/// Display tag used when the forum does not supply one for a comment.
pub const ANONYMOUS_TAG: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub timestamp_utc: i64,
    pub like_count: i64,
    pub reply_count: i64,
    pub comment_total: i64,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    /// True when the attached comment list already covers every comment.
    pub fn has_complete_comments(&self) -> bool {
        self.comment_total <= self.comments.len() as i64
    }

    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.text.chars().take(max_chars).collect();
        preview.push_str("...");
        preview
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub is_original_author: bool,
    pub display_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewKind {
    Post,
    Comment,
}

impl std::fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewKind::Post => write!(f, "post"),
            ReviewKind::Comment => write!(f, "comment"),
        }
    }
}

/// A relevant excerpt taken from a post or one of its comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub post_id: i64,
    pub kind: ReviewKind,
    pub text: String,
    pub is_original_author: bool,
    pub display_tag: Option<String>,
}

impl Review {
    /// Uniqueness key: `(post_id, kind, trimmed text)`.
    pub fn dedup_key(&self) -> (i64, ReviewKind, String) {
        (self.post_id, self.kind, self.text.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIteration {
    pub index: u32,
    pub keyword: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityResult {
    pub entity_label: String,
    pub search_keyword: String,
    pub posts: Vec<Post>,
    pub reviews: Vec<Review>,
}

impl EntityResult {
    pub fn stats(&self) -> EntityStats {
        EntityStats {
            entity_label: self.entity_label.clone(),
            num_posts: self.posts.len(),
            num_reviews: self.reviews.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub entity_label: String,
    pub num_posts: usize,
    pub num_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub post_id: i64,
    pub text_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_label: Option<String>,
}

impl SourceRef {
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id,
            text_preview: post.preview(100),
            entity_label: None,
        }
    }

    pub fn from_review(review: &Review, entity_label: Option<&str>) -> Self {
        let mut text_preview: String = review.text.chars().take(100).collect();
        text_preview.push_str("...");
        Self {
            post_id: review.post_id,
            text_preview,
            entity_label: entity_label.map(str::to_string),
        }
    }
}

/// What every query mode hands back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub num_sources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_history: Option<Vec<SearchIteration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_stats: Option<Vec<EntityStats>>,
}

impl QueryAnswer {
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }
}
