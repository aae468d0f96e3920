//! Comment branch cache.
//!
//! A disposable projection of the store: root comment lists keyed by post
//! (`post:<id>`) and reply lists keyed by parent path (`comments:<path>`).
//! Entries expire after a configurable TTL and are rebuilt from the store on
//! the next read that misses.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"          # redis | memory | disabled
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_seconds = 1800
//! ```

mod branch;
mod config;
mod error;
mod keys;
mod store;

pub use branch::{BranchLookup, CommentCache};
pub(crate) use branch::{
    METRIC_BRANCH_HIT, METRIC_BRANCH_MISS, METRIC_BRANCH_NOT_FOUND, METRIC_POPULATE_FAILED,
    METRIC_POPULATE_MS,
};
pub use config::CacheConfig;
pub use error::CacheError;
pub use keys::CacheKey;
pub use store::{CacheStore, MemoryCacheStore};
