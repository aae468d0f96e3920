use std::sync::Arc;

use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::repos::Store;
use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn Store>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Every post, oldest first.
    pub async fn all_posts(&self, ctx: &RequestContext) -> Result<Vec<PostRecord>, AppError> {
        const OP: &str = "get_all_posts";
        debug!(op = OP, "loading posts");

        let posts = self
            .store
            .list_posts(ctx)
            .await
            .map_err(AppError::repo(OP))?;
        if posts.is_empty() {
            return Err(DomainError::PostsEmpty.into());
        }

        debug!(op = OP, count = posts.len(), "posts loaded");
        Ok(posts)
    }

    pub async fn post(&self, ctx: &RequestContext, post_id: i64) -> Result<PostRecord, AppError> {
        const OP: &str = "get_post";
        debug!(op = OP, post_id, "loading post");

        self.store
            .find_post(ctx, post_id)
            .await
            .map_err(AppError::repo(OP))?
            .ok_or_else(|| DomainError::post_not_found().into())
    }
}
