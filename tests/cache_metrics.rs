use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use threadline::application::{NewComment, NewPost, RequestContext};
use threadline::cache::{CacheConfig, CommentCache, MemoryCacheStore};
use threadline::infra::bootstrap::Services;
use threadline::infra::memory::MemoryStore;
use uuid::Uuid;

#[tokio::test]
async fn branch_reads_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let services = Services::new(
        Arc::new(MemoryStore::new()),
        Some(CommentCache::new(
            Arc::new(MemoryCacheStore::new(&CacheConfig::default())),
            &CacheConfig::default(),
        )),
        Duration::from_secs(5),
    );
    let ctx = RequestContext::new();

    let post = services
        .mutations
        .add_post(
            &ctx,
            NewPost {
                author_id: Uuid::new_v4(),
                title: "Metrics".to_string(),
                text: "body".to_string(),
                comments_enabled: true,
            },
        )
        .await
        .expect("create post");
    let root = services
        .mutations
        .add_comment(
            &ctx,
            post.id,
            NewComment {
                author_id: Uuid::new_v4(),
                parent_id: None,
                text: "root".to_string(),
            },
        )
        .await
        .expect("create comment");

    // miss + rebuild + populate, then hit, then a proven absence
    services
        .comments
        .comments_branch(&ctx, post.id, "")
        .await
        .expect("first read");
    services
        .comments
        .comments_branch(&ctx, post.id, "")
        .await
        .expect("cached read");
    let unknown = root.path.child(root.id + 50);
    for _ in 0..2 {
        services
            .comments
            .comments_branch(&ctx, post.id, unknown.as_str())
            .await
            .expect_err("unknown path");
    }

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "threadline_cache_branch_hit_total",
        "threadline_cache_branch_miss_total",
        "threadline_cache_branch_not_found_total",
        "threadline_cache_branch_rebuild_total",
        "threadline_cache_populate_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
