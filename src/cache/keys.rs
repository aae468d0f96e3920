//! Cache key layout.

use std::fmt;

use crate::domain::path::CommentPath;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Root comments of a post: `post:<post_id>`.
    PostRoots(i64),
    /// Direct replies of the comment at a path: `comments:<path>`.
    Branch(CommentPath),
}

impl CacheKey {
    /// Key holding the list a comment with parent `parent` belongs to.
    pub fn for_parent(post_id: i64, parent: Option<&CommentPath>) -> Self {
        match parent {
            Some(path) => CacheKey::Branch(path.clone()),
            None => CacheKey::PostRoots(post_id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::PostRoots(post_id) => write!(f, "post:{post_id}"),
            CacheKey::Branch(path) => write!(f, "comments:{path}"),
        }
    }
}
