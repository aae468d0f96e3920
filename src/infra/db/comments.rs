use async_trait::async_trait;

use crate::application::context::RequestContext;
use crate::application::repos::{CommentsRepo, RepoError};
use crate::domain::entities::CommentRecord;
use crate::domain::path::CommentPath;

use super::types::{COMMENT_COLUMNS, CommentRow};
use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_post_comments(
        &self,
        ctx: &RequestContext,
        post_id: i64,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE post_id = $1 \
             ORDER BY string_to_array(path, '.')::bigint[], created_at DESC"
        );
        let rows = ctx
            .run(async {
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(post_id)
                    .fetch_all(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        rows.into_iter().map(CommentRecord::try_from).collect()
    }

    async fn find_comment_path(
        &self,
        ctx: &RequestContext,
        comment_id: i64,
    ) -> Result<Option<CommentPath>, RepoError> {
        let path: Option<String> = ctx
            .run(async {
                sqlx::query_scalar("SELECT path FROM comments WHERE id = $1")
                    .bind(comment_id)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        path.map(|raw| {
            CommentPath::parse(&raw).map_err(|err| {
                RepoError::integrity(format!("comment {comment_id} has invalid path: {err}"))
            })
        })
        .transpose()
    }
}
