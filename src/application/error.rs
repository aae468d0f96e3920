use std::error::Error as StdError;

use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Flattened error chain, kept for logs only.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn joined(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{op} failed")]
    Repo {
        op: &'static str,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Wraps a store failure with the name of the operation that hit it.
    pub fn repo(op: &'static str) -> impl FnOnce(RepoError) -> Self {
        move |source| Self::Repo { op, source }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.domain().is_none()
    }

    /// Message safe to hand to a client: domain errors verbatim, everything
    /// else collapsed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Domain(err) => err.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn report(&self, source: &'static str) -> ErrorReport {
        ErrorReport::from_error(source, self)
    }
}
