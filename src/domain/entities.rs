//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::path::CommentPath;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub author_id: Uuid,
    pub title: String,
    pub text: String,
    pub comments_enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: i64,
    pub author_id: Uuid,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub path: CommentPath,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CommentRecord {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn depth(&self) -> i32 {
        self.path.depth()
    }
}
