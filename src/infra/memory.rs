//! Process-local store implementing the same contract as Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::repos::{
    CommentsRepo, CreatePostParams, InsertCommentParams, PostsRepo, RepoError, StoreTx,
    TransactionalRepo,
};
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::path::CommentPath;

#[derive(Debug, Default)]
struct MemoryState {
    posts: Vec<PostRecord>,
    post_index: HashMap<i64, usize>,
    comments: HashMap<i64, CommentRecord>,
    /// post id → ids of its top-level comments, ascending.
    roots: HashMap<i64, Vec<i64>>,
    /// parent path → ids of its direct replies, ascending.
    replies: HashMap<CommentPath, Vec<i64>>,
    last_post_id: i64,
    last_comment_id: i64,
}

impl MemoryState {
    fn post(&self, post_id: i64) -> Option<&PostRecord> {
        self.post_index
            .get(&post_id)
            .and_then(|&index| self.posts.get(index))
    }

    fn post_mut(&mut self, post_id: i64) -> Option<&mut PostRecord> {
        let index = *self.post_index.get(&post_id)?;
        self.posts.get_mut(index)
    }

    fn push_post(&mut self, post: PostRecord) {
        self.post_index.insert(post.id, self.posts.len());
        self.posts.push(post);
    }

    fn push_comment(&mut self, comment: CommentRecord) {
        let siblings = match comment.path.parent() {
            Some(parent) => self.replies.entry(parent).or_default(),
            None => self.roots.entry(comment.post_id).or_default(),
        };
        let position = siblings.partition_point(|&id| id < comment.id);
        siblings.insert(position, comment.id);
        self.comments.insert(comment.id, comment);
    }

    /// Depth-first walk from the roots, which yields numeric path order.
    fn comments_of(&self, post_id: i64) -> Vec<CommentRecord> {
        let mut ordered = Vec::new();
        let Some(roots) = self.roots.get(&post_id) else {
            return ordered;
        };

        let mut stack: Vec<i64> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(comment) = self.comments.get(&id) else {
                continue;
            };
            if let Some(children) = self.replies.get(&comment.path) {
                stack.extend(children.iter().rev().copied());
            }
            ordered.push(comment.clone());
        }
        ordered
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read(
        &self,
        ctx: &RequestContext,
    ) -> Result<RwLockReadGuard<'_, MemoryState>, RepoError> {
        ctx.run(async { Ok::<_, RepoError>(self.state.read().await) })
            .await
    }

    async fn write(
        &self,
        ctx: &RequestContext,
    ) -> Result<RwLockWriteGuard<'_, MemoryState>, RepoError> {
        ctx.run(async { Ok::<_, RepoError>(self.state.write().await) })
            .await
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn create_post(
        &self,
        ctx: &RequestContext,
        params: CreatePostParams,
    ) -> Result<PostRecord, RepoError> {
        let mut state = self.write(ctx).await?;
        state.last_post_id += 1;
        let post = PostRecord {
            id: state.last_post_id,
            author_id: params.author_id,
            title: params.title,
            text: params.text,
            comments_enabled: params.comments_enabled,
            created_at: params.created_at,
        };
        state.push_post(post.clone());
        debug!(post_id = post.id, "post stored in memory");
        Ok(post)
    }

    async fn list_posts(&self, ctx: &RequestContext) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.read(ctx).await?.posts.clone())
    }

    async fn find_post(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.read(ctx).await?.post(post_id).cloned())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_post_comments(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        Ok(self.read(ctx).await?.comments_of(post_id))
    }

    async fn find_comment_path(
        &self,
        ctx: &RequestContext,
        comment_id: i64,
    ) -> Result<Option<CommentPath>, RepoError> {
        Ok(self
            .read(ctx)
            .await?
            .comments
            .get(&comment_id)
            .map(|comment| comment.path.clone()))
    }
}

#[async_trait]
impl TransactionalRepo for MemoryStore {
    async fn begin(&self, ctx: &RequestContext) -> Result<Box<dyn StoreTx>, RepoError> {
        let lock = Arc::clone(&self.state);
        let state = ctx
            .run(async move { Ok::<_, RepoError>(lock.write_owned().await) })
            .await?;
        Ok(Box::new(MemoryTx {
            state,
            ctx: ctx.clone(),
            staged_comments: Vec::new(),
            staged_flags: HashMap::new(),
        }))
    }
}

struct StagedComment {
    id: i64,
    params: InsertCommentParams,
    path: Option<CommentPath>,
}

/// Holds the store lock until committed or dropped. Writes are staged and
/// only applied on commit; identities taken by a dropped transaction are not
/// reused.
pub struct MemoryTx {
    state: OwnedRwLockWriteGuard<MemoryState>,
    ctx: RequestContext,
    staged_comments: Vec<StagedComment>,
    staged_flags: HashMap<i64, bool>,
}

impl MemoryTx {
    fn staged(&self, comment_id: i64) -> Option<&StagedComment> {
        self.staged_comments
            .iter()
            .find(|staged| staged.id == comment_id)
    }

    fn comment_post(&self, comment_id: i64) -> Option<i64> {
        self.state
            .comments
            .get(&comment_id)
            .map(|comment| comment.post_id)
            .or_else(|| self.staged(comment_id).map(|staged| staged.params.post_id))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_post_for_update(
        &mut self,
        post_id: i64,
    ) -> Result<Option<PostRecord>, RepoError> {
        self.ctx.check()?;
        let mut post = self.state.post(post_id).cloned();
        if let (Some(post), Some(&enabled)) = (post.as_mut(), self.staged_flags.get(&post_id)) {
            post.comments_enabled = enabled;
        }
        Ok(post)
    }

    async fn comments_enabled(&mut self, post_id: i64) -> Result<Option<bool>, RepoError> {
        self.ctx.check()?;
        Ok(self.state.post(post_id).map(|post| {
            self.staged_flags
                .get(&post_id)
                .copied()
                .unwrap_or(post.comments_enabled)
        }))
    }

    async fn parent_path(
        &mut self,
        post_id: i64,
        parent_id: i64,
    ) -> Result<Option<CommentPath>, RepoError> {
        self.ctx.check()?;
        if let Some(parent) = self.state.comments.get(&parent_id) {
            return Ok((parent.post_id == post_id).then(|| parent.path.clone()));
        }
        Ok(self
            .staged(parent_id)
            .filter(|staged| staged.params.post_id == post_id)
            .and_then(|staged| staged.path.clone()))
    }

    async fn insert_comment(&mut self, params: &InsertCommentParams) -> Result<i64, RepoError> {
        self.ctx.check()?;
        if self.state.post(params.post_id).is_none() {
            return Err(RepoError::InvalidInput {
                message: format!("post {} does not exist", params.post_id),
            });
        }
        if let Some(parent_id) = params.parent_id
            && self.comment_post(parent_id).is_none()
        {
            return Err(RepoError::InvalidInput {
                message: format!("parent comment {parent_id} does not exist"),
            });
        }

        self.state.last_comment_id += 1;
        let id = self.state.last_comment_id;
        self.staged_comments.push(StagedComment {
            id,
            params: params.clone(),
            path: None,
        });
        Ok(id)
    }

    async fn assign_path(&mut self, comment_id: i64, path: &CommentPath) -> Result<(), RepoError> {
        self.ctx.check()?;
        let staged = self
            .staged_comments
            .iter_mut()
            .find(|staged| staged.id == comment_id)
            .ok_or(RepoError::NotFound)?;
        staged.path = Some(path.clone());
        Ok(())
    }

    async fn set_comments_enabled(&mut self, post_id: i64, enabled: bool) -> Result<(), RepoError> {
        self.ctx.check()?;
        if self.state.post(post_id).is_none() {
            return Err(RepoError::NotFound);
        }
        self.staged_flags.insert(post_id, enabled);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryTx {
            mut state,
            ctx,
            staged_comments,
            staged_flags,
        } = *self;
        ctx.check()?;

        let comments = staged_comments
            .into_iter()
            .map(|staged| {
                let path = staged.path.ok_or_else(|| {
                    RepoError::integrity(format!("comment {} has no path", staged.id))
                })?;
                Ok(CommentRecord {
                    id: staged.id,
                    author_id: staged.params.author_id,
                    post_id: staged.params.post_id,
                    parent_id: staged.params.parent_id,
                    path,
                    text: staged.params.text,
                    created_at: staged.params.created_at,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        for comment in comments {
            state.push_comment(comment);
        }
        for (post_id, enabled) in staged_flags {
            if let Some(post) = state.post_mut(post_id) {
                post.comments_enabled = enabled;
            }
        }
        Ok(())
    }
}
