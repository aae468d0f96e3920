use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::repos::{InsertCommentParams, RepoError, StoreTx, TransactionalRepo};
use crate::domain::entities::PostRecord;
use crate::domain::path::CommentPath;

use super::types::{POST_COLUMNS, PostRow};
use super::{PostgresRepositories, map_sqlx_error};

/// Open database transaction. Dropped without [`StoreTx::commit`], sqlx
/// rolls it back when the connection returns to the pool.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    ctx: RequestContext,
}

#[async_trait]
impl TransactionalRepo for PostgresRepositories {
    async fn begin(&self, ctx: &RequestContext) -> Result<Box<dyn StoreTx>, RepoError> {
        let tx = ctx
            .run(async { self.pool().begin().await.map_err(map_sqlx_error) })
            .await?;
        Ok(Box::new(PostgresTx {
            tx,
            ctx: ctx.clone(),
        }))
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn find_post_for_update(
        &mut self,
        post_id: i64,
    ) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE");
        let Self { tx, ctx } = self;
        let row = ctx
            .run(async {
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(post_id)
                    .fetch_optional(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;
        Ok(row.map(PostRecord::from))
    }

    async fn comments_enabled(&mut self, post_id: i64) -> Result<Option<bool>, RepoError> {
        let Self { tx, ctx } = self;
        // Row lock holds off a concurrent disable until this transaction ends.
        ctx.run(async {
            sqlx::query_scalar::<_, bool>(
                "SELECT comments_enabled FROM posts WHERE id = $1 FOR SHARE",
            )
            .bind(post_id)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(map_sqlx_error)
        })
        .await
    }

    async fn parent_path(
        &mut self,
        post_id: i64,
        parent_id: i64,
    ) -> Result<Option<CommentPath>, RepoError> {
        let Self { tx, ctx } = self;
        let raw: Option<String> = ctx
            .run(async {
                sqlx::query_scalar("SELECT path FROM comments WHERE id = $1 AND post_id = $2")
                    .bind(parent_id)
                    .bind(post_id)
                    .fetch_optional(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        raw.map(|raw| {
            CommentPath::parse(&raw).map_err(|err| {
                RepoError::integrity(format!("comment {parent_id} has invalid path: {err}"))
            })
        })
        .transpose()
    }

    async fn insert_comment(&mut self, params: &InsertCommentParams) -> Result<i64, RepoError> {
        let Self { tx, ctx } = self;
        let id = ctx
            .run(async {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO comments \
                     (author_id, post_id, parent_id, path, depth, text, created_at) \
                     VALUES ($1, $2, $3, '', 0, $4, $5) RETURNING id",
                )
                .bind(params.author_id)
                .bind(params.post_id)
                .bind(params.parent_id)
                .bind(&params.text)
                .bind(params.created_at)
                .fetch_one(tx.as_mut())
                .await
                .map_err(map_sqlx_error)
            })
            .await?;
        debug!(comment_id = id, post_id = params.post_id, "comment row inserted");
        Ok(id)
    }

    async fn assign_path(&mut self, comment_id: i64, path: &CommentPath) -> Result<(), RepoError> {
        let Self { tx, ctx } = self;
        let result = ctx
            .run(async {
                sqlx::query("UPDATE comments SET path = $1, depth = $2 WHERE id = $3")
                    .bind(path.as_str())
                    .bind(path.depth())
                    .bind(comment_id)
                    .execute(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_comments_enabled(&mut self, post_id: i64, enabled: bool) -> Result<(), RepoError> {
        let Self { tx, ctx } = self;
        let result = ctx
            .run(async {
                sqlx::query("UPDATE posts SET comments_enabled = $1 WHERE id = $2")
                    .bind(enabled)
                    .bind(post_id)
                    .execute(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let PostgresTx { tx, ctx } = *self;
        ctx.run(async { tx.commit().await.map_err(map_sqlx_error) })
            .await
    }
}
