//! Cache-aside projection of comment branches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::application::context::RequestContext;
use crate::application::tree::CommentTree;
use crate::domain::entities::CommentRecord;
use crate::domain::path::CommentPath;

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::store::CacheStore;

pub(crate) const METRIC_BRANCH_HIT: &str = "threadline_cache_branch_hit_total";
pub(crate) const METRIC_BRANCH_MISS: &str = "threadline_cache_branch_miss_total";
pub(crate) const METRIC_BRANCH_NOT_FOUND: &str = "threadline_cache_branch_not_found_total";
pub(crate) const METRIC_POPULATE_FAILED: &str = "threadline_cache_populate_failed_total";
pub(crate) const METRIC_POPULATE_MS: &str = "threadline_cache_populate_ms";

/// Stored value. `comments: None` records that the path was proven absent
/// by the last rebuild of `post_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BranchEntry {
    post_id: i64,
    comments: Option<Vec<CommentRecord>>,
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchLookup {
    Hit(Vec<CommentRecord>),
    /// Nothing usable is cached; rebuild from the store.
    Miss,
    /// A rebuild already proved the requested path does not exist in this post.
    NotFound,
}

#[derive(Clone)]
pub struct CommentCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CommentCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: config.ttl(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads the root list of `post_id`, or the replies under `path`.
    ///
    /// A branch lookup only counts as a hit while the root list of the post
    /// is cached too.
    pub async fn get_branch(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: Option<&CommentPath>,
    ) -> Result<BranchLookup, CacheError> {
        let lookup = self.lookup(ctx, post_id, path).await?;
        let metric = match lookup {
            BranchLookup::Hit(_) => METRIC_BRANCH_HIT,
            BranchLookup::Miss => METRIC_BRANCH_MISS,
            BranchLookup::NotFound => METRIC_BRANCH_NOT_FOUND,
        };
        counter!(metric).increment(1);
        Ok(lookup)
    }

    async fn lookup(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: Option<&CommentPath>,
    ) -> Result<BranchLookup, CacheError> {
        let roots = match self.read(ctx, &CacheKey::PostRoots(post_id)).await? {
            Some(BranchEntry {
                comments: Some(roots),
                ..
            }) if !roots.is_empty() => roots,
            _ => return Ok(BranchLookup::Miss),
        };

        let Some(path) = path else {
            return Ok(BranchLookup::Hit(roots));
        };

        let Some(entry) = self.read(ctx, &CacheKey::Branch(path.clone())).await? else {
            return Ok(BranchLookup::Miss);
        };

        Ok(match (entry.post_id == post_id, entry.comments) {
            (true, Some(comments)) => BranchLookup::Hit(comments),
            (true, None) => BranchLookup::NotFound,
            // The path is a comment of another post.
            (false, Some(_)) => BranchLookup::NotFound,
            // Another post proved this path absent; says nothing about ours.
            (false, None) => BranchLookup::Miss,
        })
    }

    /// Writes one entry per parent path in `tree`, concurrently, then the
    /// root list. The root list is written even when branch writes fail; the
    /// first failure in path order is returned.
    pub async fn populate_tree(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        tree: &CommentTree,
    ) -> Result<(), CacheError> {
        let mut branches: Vec<(CommentPath, Vec<CommentRecord>)> = tree
            .children
            .iter()
            .map(|(path, comments)| (path.clone(), comments.clone()))
            .collect();
        branches.sort_by(|a, b| a.0.cmp(&b.0));
        let attempted = branches.len();
        let started_at = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, (path, comments)) in branches.into_iter().enumerate() {
            let cache = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let entry = BranchEntry {
                    post_id,
                    comments: Some(comments),
                };
                let result = cache.write(&ctx, &CacheKey::Branch(path), &entry).await;
                (index, result)
            });
        }

        let mut failures: Vec<(usize, CacheError)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(err))) => failures.push((index, err)),
                Err(err) => failures.push((usize::MAX, CacheError::Task(err.to_string()))),
            }
        }

        let roots = BranchEntry {
            post_id,
            comments: Some(tree.roots.clone()),
        };
        let root_result = self.write(ctx, &CacheKey::PostRoots(post_id), &roots).await;
        histogram!(METRIC_POPULATE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        if !failures.is_empty() {
            counter!(METRIC_POPULATE_FAILED).increment(1);
            failures.sort_by_key(|(index, _)| *index);
            let failed = failures.len();
            let first = failures.swap_remove(0).1;
            warn!(
                post_id,
                attempted,
                failed,
                error = %first,
                "comment branch writes failed"
            );
            return Err(CacheError::Populate {
                attempted,
                failed,
                first: Box::new(first),
            });
        }

        root_result?;
        debug!(post_id, branches = attempted, "comment tree cached");
        Ok(())
    }

    /// Appends `comment` to the cached list of its parent if that list is
    /// present, and drops whatever is cached at the comment's own path.
    ///
    /// Returns whether the parent list was patched. A missing list is left
    /// alone so the next read rebuilds it in full. Replies may already be
    /// committed under `comment`, so its own path is never cached as empty
    /// here.
    pub async fn append_to_branch(
        &self,
        ctx: &RequestContext,
        comment: &CommentRecord,
    ) -> Result<bool, CacheError> {
        let post_id = comment.post_id;
        let parent_key = CacheKey::for_parent(post_id, comment.path.parent().as_ref());

        let own_key = CacheKey::Branch(comment.path.clone()).to_string();
        ctx.run(self.store.delete(&own_key)).await?;

        let mut entry = match self.read(ctx, &parent_key).await? {
            Some(entry @ BranchEntry {
                comments: Some(_), ..
            }) if entry.post_id == post_id => entry,
            _ => return Ok(false),
        };

        if let Some(comments) = entry.comments.as_mut() {
            comments.push(comment.clone());
        }
        self.write(ctx, &parent_key, &entry).await?;
        Ok(true)
    }

    /// Records that `path` does not exist in `post_id`.
    pub async fn mark_missing(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: &CommentPath,
    ) -> Result<(), CacheError> {
        let entry = BranchEntry {
            post_id,
            comments: None,
        };
        self.write(ctx, &CacheKey::Branch(path.clone()), &entry).await
    }

    /// Records that the comment at `path` exists but has no replies.
    pub async fn mark_leaf(
        &self,
        ctx: &RequestContext,
        post_id: i64,
        path: &CommentPath,
    ) -> Result<(), CacheError> {
        let entry = BranchEntry {
            post_id,
            comments: Some(Vec::new()),
        };
        self.write(ctx, &CacheKey::Branch(path.clone()), &entry).await
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
    ) -> Result<Option<BranchEntry>, CacheError> {
        let key = key.to_string();
        let raw = ctx.run(self.store.get(&key)).await?;
        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entry) => Ok(Some(entry)),
                Err(err) => {
                    warn!(key = %key, error = %err, "discarding undecodable cache entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        entry: &BranchEntry,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(entry)?;
        ctx.run(self.store.set(&key.to_string(), payload, self.ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tree::index_comments;
    use crate::cache::store::MemoryCacheStore;
    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn comment(post_id: i64, id: i64, parent: Option<&CommentRecord>) -> CommentRecord {
        CommentRecord {
            id,
            author_id: Uuid::nil(),
            post_id,
            parent_id: parent.map(|p| p.id),
            path: match parent {
                Some(p) => p.path.child(id),
                None => CommentPath::root(id),
            },
            text: format!("c{id}"),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn memory_store() -> Arc<MemoryCacheStore> {
        Arc::new(MemoryCacheStore::new(&CacheConfig::default()))
    }

    fn cache_with(store: Arc<dyn CacheStore>) -> CommentCache {
        CommentCache::new(store, &CacheConfig::default())
    }

    #[tokio::test]
    async fn empty_cache_misses() {
        let cache = cache_with(memory_store());
        let ctx = RequestContext::new();
        assert_eq!(
            cache.get_branch(&ctx, 1, None).await.unwrap(),
            BranchLookup::Miss
        );
        assert_eq!(
            cache
                .get_branch(&ctx, 1, Some(&CommentPath::root(3)))
                .await
                .unwrap(),
            BranchLookup::Miss
        );
    }

    #[tokio::test]
    async fn populate_then_hit() {
        let store = memory_store();
        let cache = cache_with(store.clone());
        let ctx = RequestContext::new();

        let root = comment(1, 1, None);
        let reply = comment(1, 2, Some(&root));
        let tree = index_comments(vec![root.clone(), reply.clone()]);

        cache.populate_tree(&ctx, 1, &tree).await.unwrap();
        assert_eq!(
            store.keys(),
            vec!["comments:1".to_string(), "post:1".to_string()]
        );
        assert_eq!(
            cache.get_branch(&ctx, 1, None).await.unwrap(),
            BranchLookup::Hit(vec![root.clone()])
        );
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&root.path)).await.unwrap(),
            BranchLookup::Hit(vec![reply.clone()])
        );
        // Leaf paths are not written by a rebuild.
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&reply.path)).await.unwrap(),
            BranchLookup::Miss
        );
    }

    #[tokio::test]
    async fn branch_without_roots_is_a_miss() {
        let store = memory_store();
        let cache = cache_with(store.clone());
        let ctx = RequestContext::new();
        let path = CommentPath::root(7);

        cache.mark_leaf(&ctx, 1, &path).await.unwrap();
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&path)).await.unwrap(),
            BranchLookup::Miss
        );
    }

    #[tokio::test]
    async fn markers_are_scoped_to_their_post() {
        let cache = cache_with(memory_store());
        let ctx = RequestContext::new();

        for post_id in [1, 2] {
            let tree = index_comments(vec![comment(post_id, post_id * 10, None)]);
            cache.populate_tree(&ctx, post_id, &tree).await.unwrap();
        }

        let unknown = CommentPath::root(99);
        cache.mark_missing(&ctx, 1, &unknown).await.unwrap();
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&unknown)).await.unwrap(),
            BranchLookup::NotFound
        );
        assert_eq!(
            cache.get_branch(&ctx, 2, Some(&unknown)).await.unwrap(),
            BranchLookup::Miss
        );

        let leaf = CommentPath::root(20);
        cache.mark_leaf(&ctx, 2, &leaf).await.unwrap();
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&leaf)).await.unwrap(),
            BranchLookup::NotFound
        );
        assert_eq!(
            cache.get_branch(&ctx, 2, Some(&leaf)).await.unwrap(),
            BranchLookup::Hit(Vec::new())
        );
    }

    #[tokio::test]
    async fn append_patches_cached_parent_only() {
        let store = memory_store();
        let cache = cache_with(store.clone());
        let ctx = RequestContext::new();

        let root = comment(1, 1, None);
        let tree = index_comments(vec![root.clone()]);
        cache.populate_tree(&ctx, 1, &tree).await.unwrap();

        let second = comment(1, 2, None);
        assert!(cache.append_to_branch(&ctx, &second).await.unwrap());
        assert_eq!(
            cache.get_branch(&ctx, 1, None).await.unwrap(),
            BranchLookup::Hit(vec![root.clone(), second.clone()])
        );

        // No list cached under the first root yet.
        let reply = comment(1, 3, Some(&root));
        assert!(!cache.append_to_branch(&ctx, &reply).await.unwrap());
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&root.path)).await.unwrap(),
            BranchLookup::Miss
        );
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&reply.path)).await.unwrap(),
            BranchLookup::Miss
        );
        assert_eq!(store.keys(), vec!["post:1".to_string()]);
    }

    #[tokio::test]
    async fn append_clears_stale_marker() {
        let cache = cache_with(memory_store());
        let ctx = RequestContext::new();

        let root = comment(1, 1, None);
        cache
            .populate_tree(&ctx, 1, &index_comments(vec![root.clone()]))
            .await
            .unwrap();

        let reply = comment(1, 2, Some(&root));
        cache.mark_missing(&ctx, 1, &reply.path).await.unwrap();
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&reply.path)).await.unwrap(),
            BranchLookup::NotFound
        );

        cache.append_to_branch(&ctx, &reply).await.unwrap();
        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&reply.path)).await.unwrap(),
            BranchLookup::Miss
        );
    }

    #[tokio::test]
    async fn reply_appended_before_its_parent_stays_visible() {
        let cache = cache_with(memory_store());
        let ctx = RequestContext::new();

        let first = comment(1, 1, None);
        cache
            .populate_tree(&ctx, 1, &index_comments(vec![first.clone()]))
            .await
            .unwrap();

        // The reply's cache patch lands before its parent's.
        let parent = comment(1, 2, None);
        let reply = comment(1, 3, Some(&parent));
        assert!(!cache.append_to_branch(&ctx, &reply).await.unwrap());
        assert!(cache.append_to_branch(&ctx, &parent).await.unwrap());

        assert_eq!(
            cache.get_branch(&ctx, 1, Some(&parent.path)).await.unwrap(),
            BranchLookup::Miss
        );
        assert_eq!(
            cache.get_branch(&ctx, 1, None).await.unwrap(),
            BranchLookup::Hit(vec![first, parent])
        );
    }

    /// Fails every write whose key is in `failing`.
    struct FlakyStore {
        inner: MemoryCacheStore,
        failing: Vec<String>,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            if self.failing.iter().any(|k| k == key) {
                return Err(CacheError::backend(format!("refused {key}")));
            }
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn populate_reports_first_failure_and_still_writes_roots() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCacheStore::new(&CacheConfig::default()),
            failing: vec!["comments:2".to_string(), "comments:10".to_string()],
        });
        let cache = cache_with(store.clone());
        let ctx = RequestContext::new();

        let a = comment(1, 2, None);
        let b = comment(1, 10, None);
        let c = comment(1, 11, None);
        let tree = index_comments(vec![
            a.clone(),
            comment(1, 3, Some(&a)),
            b.clone(),
            comment(1, 12, Some(&b)),
            c.clone(),
            comment(1, 13, Some(&c)),
        ]);

        let err = cache.populate_tree(&ctx, 1, &tree).await.unwrap_err();
        match err {
            CacheError::Populate {
                attempted,
                failed,
                first,
            } => {
                assert_eq!(attempted, 3);
                assert_eq!(failed, 2);
                assert_eq!(first.to_string(), "cache backend error: refused comments:2");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(
            store.inner.keys(),
            vec!["comments:11".to_string(), "post:1".to_string()]
        );
    }

    #[tokio::test]
    async fn cancelled_context_fails_cache_calls() {
        let cache = cache_with(memory_store());
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = cache.get_branch(&ctx, 1, None).await.unwrap_err();
        assert!(matches!(err, CacheError::Context(_)));
    }
}
