//! Rendering posts for the reasoning engine and fitting them into a token
//! budget.

use chrono::{Local, TimeZone};
use treehole_core::text::estimate_tokens;
use treehole_core::Post;

/// How many comments to render under each post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentLimit {
    None,
    First(usize),
    All,
}

impl CommentLimit {
    /// `-1` (any negative) means all comments, `0` none.
    pub fn from_setting(value: i32) -> Self {
        match value {
            v if v < 0 => CommentLimit::All,
            0 => CommentLimit::None,
            v => CommentLimit::First(v as usize),
        }
    }

    fn take(self, available: usize) -> usize {
        match self {
            CommentLimit::None => 0,
            CommentLimit::First(n) => n.min(available),
            CommentLimit::All => available,
        }
    }
}

fn format_timestamp(timestamp: i64) -> String {
    if timestamp == 0 {
        return "unknown".to_string();
    }
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_post(post: &Post, comments: CommentLimit) -> String {
    let mut lines = vec![
        format!("=== 帖子 #{} ===", post.id),
        format!("时间: {}", format_timestamp(post.timestamp_utc)),
        format!("\n内容:\n{}", post.text),
        format!("\n点赞: {} | 回复: {}", post.like_count, post.reply_count),
    ];

    if let Some(tag) = post.tag.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("标签: {}", tag));
    }

    let shown = comments.take(post.comments.len());
    if shown > 0 {
        lines.push("\n--- 评论 ---".to_string());
        for (i, comment) in post.comments.iter().take(shown).enumerate() {
            lines.push(format!("{}. [{}] {}", i + 1, comment.display_tag, comment.text));
        }
    }

    lines.push("=".repeat(50));
    lines.push(String::new());
    lines.join("\n")
}

pub fn format_posts_batch(posts: &[Post], comments: CommentLimit) -> String {
    posts
        .iter()
        .map(|post| format_post(post, comments))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Longest prefix of `posts` whose estimated size, rendered without
/// comments, stays within `max_tokens`. Stops at the first post that would
/// overflow.
pub fn smart_truncate(posts: &[Post], max_tokens: usize) -> &[Post] {
    let mut total = 0;
    for (i, post) in posts.iter().enumerate() {
        let tokens = estimate_tokens(&format_post(post, CommentLimit::None));
        if total + tokens > max_tokens {
            return &posts[..i];
        }
        total += tokens;
    }
    posts
}
