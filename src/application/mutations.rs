//! Transactional writes: posts, comments and the comments-enabled flag.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::repos::{CreatePostParams, InsertCommentParams, Store, StoreTx};
use crate::cache::CommentCache;
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::error::DomainError;
use crate::domain::path::CommentPath;
use crate::domain::validation::{validate_comment_text, validate_post_content};

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub text: String,
    pub comments_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: Uuid,
    pub parent_id: Option<i64>,
    pub text: String,
}

#[derive(Clone)]
pub struct MutationOrchestrator {
    store: Arc<dyn Store>,
    cache: Option<CommentCache>,
}

impl MutationOrchestrator {
    pub fn new(store: Arc<dyn Store>, cache: Option<CommentCache>) -> Self {
        Self { store, cache }
    }

    pub async fn add_post(
        &self,
        ctx: &RequestContext,
        command: NewPost,
    ) -> Result<PostRecord, AppError> {
        validate_post_content(&command.title, &command.text)?;

        let params = CreatePostParams {
            author_id: command.author_id,
            title: command.title,
            text: command.text,
            comments_enabled: command.comments_enabled,
            created_at: OffsetDateTime::now_utc(),
        };
        let post = self
            .store
            .create_post(ctx, params)
            .await
            .map_err(AppError::repo("add_post"))?;

        info!(post_id = post.id, author_id = %post.author_id, "post created");
        Ok(post)
    }

    /// Inserts a comment and assigns its materialized path in one
    /// transaction, then patches the cached branch it belongs to.
    pub async fn add_comment(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        command: NewComment,
    ) -> Result<CommentRecord, AppError> {
        const OP: &str = "add_comment";
        validate_comment_text(&command.text)?;

        let mut tx = self.store.begin(ctx).await.map_err(AppError::repo(OP))?;
        let comment = match insert_comment(tx.as_mut(), post_id, command).await {
            Ok(comment) => comment,
            Err(err) => {
                debug!(op = OP, post_id, error = %err, "transaction abandoned");
                return Err(err);
            }
        };
        tx.commit().await.map_err(AppError::repo(OP))?;

        debug!(
            op = OP,
            post_id,
            comment_id = comment.id,
            path = %comment.path,
            "comment committed"
        );

        if let Some(cache) = &self.cache {
            match cache.append_to_branch(ctx, &comment).await {
                Ok(patched) => debug!(op = OP, post_id, patched, "comment cache updated"),
                Err(err) => err.log_degraded(OP, post_id),
            }
        }

        Ok(comment)
    }

    /// Only the post's author may toggle comments. Concurrent toggles are
    /// last-writer-wins.
    pub async fn update_comments_enabled(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        author_id: Uuid,
        enabled: bool,
    ) -> Result<PostRecord, AppError> {
        const OP: &str = "update_comments_enabled";

        let mut tx = self.store.begin(ctx).await.map_err(AppError::repo(OP))?;
        let post = match toggle_comments(tx.as_mut(), post_id, author_id, enabled).await {
            Ok(post) => post,
            Err(err) => {
                debug!(op = OP, post_id, error = %err, "transaction abandoned");
                return Err(err);
            }
        };
        tx.commit().await.map_err(AppError::repo(OP))?;

        info!(post_id, enabled, "comments flag updated");
        Ok(post)
    }
}

async fn insert_comment(
    tx: &mut dyn StoreTx,
    post_id: i64,
    command: NewComment,
) -> Result<CommentRecord, AppError> {
    let repo = || AppError::repo("add_comment");

    let enabled = tx
        .comments_enabled(post_id)
        .await
        .map_err(repo())?
        .ok_or_else(DomainError::post_not_found)?;
    if !enabled {
        return Err(DomainError::CommentsDisabled.into());
    }

    let parent_path = match command.parent_id {
        Some(parent_id) => Some(
            tx.parent_path(post_id, parent_id)
                .await
                .map_err(repo())?
                .ok_or_else(DomainError::parent_not_found)?,
        ),
        None => None,
    };

    let params = InsertCommentParams {
        author_id: command.author_id,
        post_id,
        parent_id: command.parent_id,
        text: command.text,
        created_at: OffsetDateTime::now_utc(),
    };
    let id = tx.insert_comment(&params).await.map_err(repo())?;

    let path = match &parent_path {
        Some(parent) => parent.child(id),
        None => CommentPath::root(id),
    };
    tx.assign_path(id, &path).await.map_err(repo())?;

    Ok(CommentRecord {
        id,
        author_id: params.author_id,
        post_id,
        parent_id: params.parent_id,
        path,
        text: params.text,
        created_at: params.created_at,
    })
}

async fn toggle_comments(
    tx: &mut dyn StoreTx,
    post_id: i64,
    author_id: Uuid,
    enabled: bool,
) -> Result<PostRecord, AppError> {
    let repo = || AppError::repo("update_comments_enabled");

    let mut post = tx
        .find_post_for_update(post_id)
        .await
        .map_err(repo())?
        .ok_or_else(DomainError::post_not_found)?;
    if post.author_id != author_id {
        return Err(DomainError::Unauthorized.into());
    }

    tx.set_comments_enabled(post_id, enabled)
        .await
        .map_err(repo())?;
    post.comments_enabled = enabled;
    Ok(post)
}
