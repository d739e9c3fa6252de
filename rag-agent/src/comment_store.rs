use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use treehole_client::{CommentPage, CommentPageRequest, ForumApi, SortOrder};
use treehole_core::{Comment, CoreError, ErrorExt, ForumApiError, Post};

/// Full comment lists per post, fetched once per session.
pub struct CommentStore {
    api: Arc<dyn ForumApi>,
    page_size: u32,
    memo: HashMap<i64, Vec<Comment>>,
}

impl CommentStore {
    pub fn new(api: Arc<dyn ForumApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            memo: HashMap::new(),
        }
    }

    /// Every comment of `post` in page order.
    ///
    /// Posts whose attached list already covers `comment_total` need no
    /// network call. If any page fails the attached list is returned
    /// instead; that result is memoized like a complete one.
    pub async fn fetch_all_comments(&mut self, post: &Post) -> Vec<Comment> {
        if post.id == 0 {
            return post.comments.clone();
        }

        if let Some(comments) = self.memo.get(&post.id) {
            debug!("Comment memo hit for post #{}", post.id);
            return comments.clone();
        }

        let comments = if post.has_complete_comments() {
            post.comments.clone()
        } else {
            info!(
                "正在获取帖子 #{} 的全部 {} 条评论...",
                post.id, post.comment_total
            );
            match self.fetch_pages(post.id).await {
                Ok(comments) => comments,
                Err(e) => {
                    warn!(
                        "Falling back to {} attached comments for post #{}: {}",
                        post.comments.len(),
                        post.id,
                        e
                    );
                    post.comments.clone()
                }
            }
        };

        self.memo.insert(post.id, comments.clone());
        comments
    }

    pub fn memoized(&self, post_id: i64) -> Option<&[Comment]> {
        self.memo.get(&post_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    async fn fetch_pages(&self, post_id: i64) -> Result<Vec<Comment>, CoreError> {
        let first = self.fetch_page(post_id, 1).await?;
        let last_page = first.last_page.max(1);
        let mut comments = first.comments;

        for page in 2..=last_page {
            let next = self.fetch_page(post_id, page).await?;
            comments.extend(next.comments);
        }

        debug!(
            "Fetched {} comments over {} pages for post #{}",
            comments.len(),
            last_page,
            post_id
        );
        Ok(comments)
    }

    async fn fetch_page(&self, post_id: i64, page: u32) -> Result<CommentPage, CoreError> {
        let request = CommentPageRequest {
            post_id,
            page,
            page_size: self.page_size,
            sort_order: SortOrder::Asc,
        };

        let result = self.api.get_comment_page(&request).await;
        match result {
            Ok(page_data) if page_data.success => Ok(page_data),
            Ok(_) => Err(ForumApiError::Upstream {
                message: format!("comment page {} of post #{} reported failure", page, post_id),
            }
            .into()),
            Err(e) => {
                e.log_warn();
                Err(e)
            }
        }
    }
}
