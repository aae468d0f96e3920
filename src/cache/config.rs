//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_MEMORY_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of every branch entry, refreshed on rewrite.
    pub ttl_seconds: u64,
    /// Entry capacity of the in-process backend.
    pub memory_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl.as_secs(),
            memory_max_entries: settings.memory_max_entries.get(),
        }
    }
}

impl CacheConfig {
    /// TTL as a duration, clamped to at least one second.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
