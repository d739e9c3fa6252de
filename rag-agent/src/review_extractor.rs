use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use treehole_core::text::contains_term;
use treehole_core::{Comment, Post, Review, ReviewKind};

use crate::comment_store::CommentStore;

/// Turns posts and their full comment lists into deduplicated reviews of a
/// target term, optionally narrowed by a secondary term such as an
/// instructor name.
#[derive(Debug, Clone)]
pub struct ReviewExtractor {
    inter_post_delay: Duration,
}

impl ReviewExtractor {
    pub fn new(inter_post_delay: Duration) -> Self {
        Self { inter_post_delay }
    }

    /// Target containment is case-sensitive; the secondary term matches
    /// case-insensitively and always matches when empty. Each post gets its
    /// full comment list attached as a side effect.
    pub async fn extract_reviews(
        &self,
        store: &mut CommentStore,
        posts: &mut [Post],
        target: &str,
        secondary: &str,
    ) -> Vec<Review> {
        let mut reviews = Vec::new();
        let mut seen = HashSet::new();

        for post in posts.iter_mut() {
            let relevant = is_relevant_post(post, target, secondary);
            if relevant {
                push_unique(
                    &mut reviews,
                    &mut seen,
                    Review {
                        post_id: post.id,
                        kind: ReviewKind::Post,
                        text: post.text.clone(),
                        is_original_author: true,
                        display_tag: None,
                    },
                );
            }

            let comments = store.fetch_all_comments(post).await;
            for comment in &comments {
                if includes_comment(comment, relevant, target, secondary) {
                    push_unique(
                        &mut reviews,
                        &mut seen,
                        Review {
                            post_id: post.id,
                            kind: ReviewKind::Comment,
                            text: comment.text.clone(),
                            is_original_author: comment.is_original_author,
                            display_tag: Some(comment.display_tag.clone()),
                        },
                    );
                }
            }
            post.comments = comments;

            if !self.inter_post_delay.is_zero() {
                tokio::time::sleep(self.inter_post_delay).await;
            }
        }

        debug!(
            "Extracted {} reviews for '{}' / '{}' from {} posts",
            reviews.len(),
            target,
            secondary,
            posts.len()
        );
        reviews
    }
}

pub fn is_relevant_post(post: &Post, target: &str, secondary: &str) -> bool {
    post.text.contains(target) && contains_term(&post.text, secondary)
}

pub fn includes_comment(
    comment: &Comment,
    post_relevant: bool,
    target: &str,
    secondary: &str,
) -> bool {
    let has_target = comment.text.contains(target);
    let has_secondary = contains_term(&comment.text, secondary);
    let is_op = comment.is_original_author;

    (secondary.is_empty() && is_op)
        || (has_target && has_secondary)
        || (is_op && post_relevant && (has_target || has_secondary))
}

fn push_unique(
    reviews: &mut Vec<Review>,
    seen: &mut HashSet<(i64, ReviewKind, String)>,
    review: Review,
) {
    if review.text.trim().is_empty() {
        return;
    }
    if seen.insert(review.dedup_key()) {
        reviews.push(review);
    }
}
