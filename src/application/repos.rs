//! Repository traits describing persistence adapters.
//!
//! Both the Postgres and the in-memory backend implement [`Store`]; callers
//! never learn which one they were handed.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::context::{ContextError, RequestContext};
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::path::CommentPath;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

impl From<ContextError> for RepoError {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::Cancelled => RepoError::Cancelled,
            ContextError::DeadlineExceeded => RepoError::Timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: Uuid,
    pub title: String,
    pub text: String,
    pub comments_enabled: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct InsertCommentParams {
    pub author_id: Uuid,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn create_post(
        &self,
        ctx: &RequestContext,
        params: CreatePostParams,
    ) -> Result<PostRecord, RepoError>;

    /// All posts, oldest first.
    async fn list_posts(&self, ctx: &RequestContext) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_post(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Every comment of a post ordered by numeric path segments, so each
    /// parent precedes its replies.
    async fn list_post_comments(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Vec<CommentRecord>, RepoError>;

    async fn find_comment_path(
        &self,
        ctx: &RequestContext,
        comment_id: i64,
    ) -> Result<Option<CommentPath>, RepoError>;
}

#[async_trait]
pub trait TransactionalRepo: Send + Sync {
    /// Open a transaction bound to `ctx`. Dropping the returned handle
    /// without calling [`StoreTx::commit`] discards every staged write.
    async fn begin(&self, ctx: &RequestContext) -> Result<Box<dyn StoreTx>, RepoError>;
}

/// Write steps available inside one store transaction.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks the post row for the rest of the transaction.
    async fn find_post_for_update(&mut self, post_id: i64)
    -> Result<Option<PostRecord>, RepoError>;

    async fn comments_enabled(&mut self, post_id: i64) -> Result<Option<bool>, RepoError>;

    /// Path of `parent_id`, only if that comment belongs to `post_id`.
    async fn parent_path(
        &mut self,
        post_id: i64,
        parent_id: i64,
    ) -> Result<Option<CommentPath>, RepoError>;

    /// Inserts the row and returns its generated identity. The path is
    /// assigned afterwards with [`StoreTx::assign_path`].
    async fn insert_comment(&mut self, params: &InsertCommentParams) -> Result<i64, RepoError>;

    async fn assign_path(&mut self, comment_id: i64, path: &CommentPath) -> Result<(), RepoError>;

    async fn set_comments_enabled(&mut self, post_id: i64, enabled: bool)
    -> Result<(), RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}

/// Combined persistence contract.
pub trait Store: PostsRepo + CommentsRepo + TransactionalRepo {}

impl<T> Store for T where T: PostsRepo + CommentsRepo + TransactionalRepo {}
