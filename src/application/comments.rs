//! Comment reads served cache-aside.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::repos::Store;
use crate::application::tree::index_comments;
use crate::cache::{BranchLookup, CommentCache};
use crate::domain::entities::CommentRecord;
use crate::domain::error::{DomainError, MissingEntity};
use crate::domain::path::CommentPath;

pub(crate) const METRIC_BRANCH_REBUILD: &str = "threadline_cache_branch_rebuild_total";

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn Store>,
    cache: Option<CommentCache>,
}

impl CommentService {
    pub fn new(store: Arc<dyn Store>, cache: Option<CommentCache>) -> Self {
        Self { store, cache }
    }

    /// Direct replies of the comment at `path`, or the top-level comments of
    /// the post when `path` is empty.
    ///
    /// A comment without replies yields an empty list; a path that matches
    /// no comment of the post is `NotFound`.
    pub async fn comments_branch(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: &str,
    ) -> Result<Vec<CommentRecord>, AppError> {
        const OP: &str = "get_comments_branch";
        debug!(op = OP, post_id, path, "loading comment branch");

        let path = if path.is_empty() {
            None
        } else {
            Some(CommentPath::parse(path).map_err(|_| DomainError::path_not_found())?)
        };

        if let Some(cache) = &self.cache {
            match cache.get_branch(ctx, post_id, path.as_ref()).await {
                Ok(BranchLookup::Hit(comments)) => return Ok(comments),
                Ok(BranchLookup::NotFound) => return Err(DomainError::path_not_found().into()),
                Ok(BranchLookup::Miss) => {}
                Err(err) => err.log_degraded(OP, post_id),
            }
        }

        self.rebuild_branch(ctx, post_id, path).await
    }

    async fn rebuild_branch(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: Option<CommentPath>,
    ) -> Result<Vec<CommentRecord>, AppError> {
        const OP: &str = "get_comments_branch";

        let comments = self
            .store
            .list_post_comments(ctx, post_id)
            .await
            .map_err(AppError::repo(OP))?;
        if comments.is_empty() {
            return Err(DomainError::CommentsEmpty.into());
        }

        counter!(METRIC_BRANCH_REBUILD).increment(1);
        let tree = index_comments(comments);
        debug!(
            op = OP,
            post_id,
            comments = tree.len(),
            branches = tree.children.len(),
            "comment tree rebuilt"
        );

        let cache = self.cache.as_ref();
        if let Some(cache) = cache
            && let Err(err) = cache.populate_tree(ctx, post_id, &tree).await
        {
            err.log_degraded(OP, post_id);
        }

        let Some(path) = path else {
            return Ok(tree.roots);
        };

        if let Some(branch) = tree.branch(&path) {
            return Ok(branch.to_vec());
        }

        if tree.contains_path(&path) {
            if let Some(cache) = cache
                && let Err(err) = cache.mark_leaf(ctx, post_id, &path).await
            {
                err.log_degraded(OP, post_id);
            }
            return Ok(Vec::new());
        }

        if let Some(cache) = cache
            && let Err(err) = cache.mark_missing(ctx, post_id, &path).await
        {
            err.log_degraded(OP, post_id);
        }
        Err(DomainError::path_not_found().into())
    }

    pub async fn comment_path(
        &self,
        ctx: &RequestContext,
        comment_id: i64,
    ) -> Result<CommentPath, AppError> {
        self.store
            .find_comment_path(ctx, comment_id)
            .await
            .map_err(AppError::repo("get_comment_path"))?
            .ok_or_else(|| DomainError::not_found(MissingEntity::Comment).into())
    }
}
