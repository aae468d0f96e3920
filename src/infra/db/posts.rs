use async_trait::async_trait;
use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::repos::{CreatePostParams, PostsRepo, RepoError};
use crate::domain::entities::PostRecord;

use super::types::{POST_COLUMNS, PostRow};
use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn create_post(
        &self,
        ctx: &RequestContext,
        params: CreatePostParams,
    ) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "INSERT INTO posts (author_id, title, text, comments_enabled, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {POST_COLUMNS}"
        );
        let row = ctx
            .run(async {
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(params.author_id)
                    .bind(&params.title)
                    .bind(&params.text)
                    .bind(params.comments_enabled)
                    .bind(params.created_at)
                    .fetch_one(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        debug!(post_id = row.id, "post inserted");
        Ok(PostRecord::from(row))
    }

    async fn list_posts(&self, ctx: &RequestContext) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at ASC, id ASC");
        let rows = ctx
            .run(async {
                sqlx::query_as::<_, PostRow>(&sql)
                    .fetch_all(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_post(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = ctx
            .run(async {
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(post_id)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        Ok(row.map(PostRecord::from))
    }
}
