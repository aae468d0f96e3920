use thiserror::Error;

use crate::application::context::ContextError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("cache write task failed: {0}")]
    Task(String),
    #[error("{failed} of {attempted} branch writes failed")]
    Populate {
        attempted: usize,
        failed: usize,
        #[source]
        first: Box<CacheError>,
    },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Cache failures never fail a request; they are reported and dropped.
    pub fn log_degraded(&self, op: &'static str, post_id: i64) {
        tracing::warn!(op, post_id, error = %self, "comment cache degraded");
    }
}
