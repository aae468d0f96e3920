//! Materialized comment paths.
//!
//! A path lists every ancestor id of a comment followed by its own id, joined
//! with `.`. Root comments carry just their own id. Ordering compares the
//! segments numerically so a parent always sorts before its descendants and
//! `2` sorts before `10`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PATH_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("comment path must not be empty")]
    Empty,
    #[error("invalid comment path segment `{segment}`")]
    InvalidSegment { segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommentPath(String);

impl CommentPath {
    /// Path of a comment without a parent.
    pub fn root(id: i64) -> Self {
        Self(id.to_string())
    }

    /// Path of a direct reply to the comment at `self`.
    pub fn child(&self, id: i64) -> Self {
        Self(format!("{}{PATH_SEPARATOR}{id}", self.0))
    }

    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        for segment in raw.split(PATH_SEPARATOR) {
            parse_segment(segment)?;
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Replies level: one for root comments, plus one per ancestor.
    pub fn depth(&self) -> i32 {
        let separators = self.0.matches(PATH_SEPARATOR).count();
        i32::try_from(separators).map_or(i32::MAX, |count| count.saturating_add(1))
    }

    pub fn parent(&self) -> Option<CommentPath> {
        self.0
            .rsplit_once(PATH_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Id of the comment the path points at.
    pub fn last_id(&self) -> i64 {
        self.segments().last().unwrap_or_default()
    }

    pub fn segments(&self) -> impl Iterator<Item = i64> + '_ {
        // Segments were validated on construction.
        self.0
            .split(PATH_SEPARATOR)
            .map(|segment| segment.parse::<i64>().unwrap_or_default())
    }
}

fn parse_segment(segment: &str) -> Result<i64, PathError> {
    let invalid = || PathError::InvalidSegment {
        segment: segment.to_string(),
    };

    if segment.is_empty()
        || segment.starts_with('0')
        || !segment.bytes().all(|byte| byte.is_ascii_digit())
    {
        return Err(invalid());
    }

    segment.parse::<i64>().map_err(|_| invalid())
}

impl Ord for CommentPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for CommentPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CommentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommentPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)?;
        Ok(Self(value))
    }
}

impl From<CommentPath> for String {
    fn from(path: CommentPath) -> Self {
        path.0
    }
}

impl AsRef<str> for CommentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_bare_id() {
        let path = CommentPath::root(5);
        assert_eq!(path.as_str(), "5");
        assert_eq!(path.depth(), 1);
        assert_eq!(path.parent(), None);
        assert_eq!(path.last_id(), 5);
    }

    #[test]
    fn child_path_appends_id_after_separator() {
        let parent = CommentPath::root(5);
        let child = parent.child(9);
        let grandchild = child.child(14);

        assert_eq!(child.as_str(), "5.9");
        assert_eq!(grandchild.as_str(), "5.9.14");
        assert_eq!(grandchild.depth(), 3);
        assert_eq!(grandchild.parent(), Some(child.clone()));
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert_eq!(CommentPath::parse(""), Err(PathError::Empty));
        for raw in ["5.", ".5", "5..9", "a", "5.x", "05", "5.-1", "+5", "5 .9"] {
            assert!(
                matches!(CommentPath::parse(raw), Err(PathError::InvalidSegment { .. })),
                "`{raw}` should be rejected"
            );
        }
    }

    #[test]
    fn ordering_is_numeric_per_segment() {
        let mut paths: Vec<CommentPath> = ["10", "2", "2.11", "2.3", "10.4", "2.3.1"]
            .into_iter()
            .map(|raw| CommentPath::parse(raw).expect("valid path"))
            .collect();
        paths.sort();

        let rendered: Vec<&str> = paths.iter().map(CommentPath::as_str).collect();
        assert_eq!(rendered, ["2", "2.3", "2.3.1", "2.11", "10", "10.4"]);
    }

    #[test]
    fn serde_uses_plain_string_form() {
        let path = CommentPath::root(7).child(12);
        let json = serde_json::to_string(&path).expect("serialize");
        assert_eq!(json, "\"7.12\"");

        let back: CommentPath = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, path);
        assert!(serde_json::from_str::<CommentPath>("\"7..12\"").is_err());
    }
}
