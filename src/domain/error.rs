use std::fmt;

use thiserror::Error;

/// Entities whose absence is reported back to the caller verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntity {
    Post,
    Comment,
    ParentComment,
    Path,
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MissingEntity::Post => "post",
            MissingEntity::Comment => "comment",
            MissingEntity::ParentComment => "parent comment",
            MissingEntity::Path => "comment path",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{entity} not found")]
    NotFound { entity: MissingEntity },
    #[error("user doesn't have access rights")]
    Unauthorized,
    #[error("comments are disabled for this post")]
    CommentsDisabled,
    #[error("no posts have been created yet")]
    PostsEmpty,
    #[error("no comments have been created yet")]
    CommentsEmpty,
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: MissingEntity) -> Self {
        Self::NotFound { entity }
    }

    pub fn post_not_found() -> Self {
        Self::not_found(MissingEntity::Post)
    }

    pub fn parent_not_found() -> Self {
        Self::not_found(MissingEntity::ParentComment)
    }

    pub fn path_not_found() -> Self {
        Self::not_found(MissingEntity::Path)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
