use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::path::CommentPath;

pub(crate) const POST_COLUMNS: &str = "id, author_id, title, text, comments_enabled, created_at";

pub(crate) const COMMENT_COLUMNS: &str =
    "id, author_id, post_id, parent_id, path, text, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: i64,
    pub(crate) author_id: Uuid,
    pub(crate) title: String,
    pub(crate) text: String,
    pub(crate) comments_enabled: bool,
    pub(crate) created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            title: row.title,
            text: row.text,
            comments_enabled: row.comments_enabled,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub(crate) id: i64,
    pub(crate) author_id: Uuid,
    pub(crate) post_id: i64,
    pub(crate) parent_id: Option<i64>,
    pub(crate) path: String,
    pub(crate) text: String,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<CommentRow> for CommentRecord {
    type Error = RepoError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let path = CommentPath::parse(&row.path).map_err(|err| {
            RepoError::integrity(format!("comment {} has invalid path: {err}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            author_id: row.author_id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            path,
            text: row.text,
            created_at: row.created_at,
        })
    }
}
