//! Rebuilds the reply tree of one post from its flat comment list.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::entities::CommentRecord;
use crate::domain::path::CommentPath;

/// Parent path → direct replies, plus the top-level comments of a post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    pub roots: Vec<CommentRecord>,
    pub children: HashMap<CommentPath, Vec<CommentRecord>>,
    paths: HashMap<i64, CommentPath>,
}

impl CommentTree {
    /// Whether a comment with exactly this path was indexed.
    pub fn contains_path(&self, path: &CommentPath) -> bool {
        self.paths.get(&path.last_id()) == Some(path)
    }

    pub fn branch(&self, path: &CommentPath) -> Option<&[CommentRecord]> {
        self.children.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Single pass over `comments`, which must list every parent before its
/// replies. A reply whose parent has not been seen yet is dropped.
pub fn index_comments(comments: Vec<CommentRecord>) -> CommentTree {
    let mut tree = CommentTree {
        roots: Vec::new(),
        children: HashMap::new(),
        paths: HashMap::with_capacity(comments.len()),
    };

    for comment in comments {
        tree.paths.insert(comment.id, comment.path.clone());

        let Some(parent_id) = comment.parent_id else {
            tree.roots.push(comment);
            continue;
        };

        match tree.paths.get(&parent_id) {
            Some(parent_path) => {
                let parent_path = parent_path.clone();
                tree.children.entry(parent_path).or_default().push(comment);
            }
            None => {
                warn!(
                    comment_id = comment.id,
                    parent_id,
                    post_id = comment.post_id,
                    "comment listed before its parent, skipping"
                );
                tree.paths.remove(&comment.id);
            }
        }
    }

    tree
}
