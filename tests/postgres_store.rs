//! Postgres adapter tests. Need `DATABASE_URL`; run with `--ignored`.

use sqlx::PgPool;
use threadline::application::context::RequestContext;
use threadline::application::repos::{
    CommentsRepo, CreatePostParams, InsertCommentParams, PostsRepo, RepoError, StoreTx,
    TransactionalRepo,
};
use threadline::domain::entities::PostRecord;
use threadline::domain::path::CommentPath;
use threadline::infra::db::PostgresRepositories;
use time::OffsetDateTime;
use uuid::Uuid;

async fn seed_post(repos: &PostgresRepositories, comments_enabled: bool) -> PostRecord {
    repos
        .create_post(
            &RequestContext::new(),
            CreatePostParams {
                author_id: Uuid::new_v4(),
                title: "Postgres".to_string(),
                text: "body".to_string(),
                comments_enabled,
                created_at: OffsetDateTime::now_utc(),
            },
        )
        .await
        .expect("create post")
}

async fn add_comment(
    repos: &PostgresRepositories,
    post_id: i64,
    parent: Option<&CommentPath>,
) -> CommentPath {
    let ctx = RequestContext::new();
    let mut tx = repos.begin(&ctx).await.expect("begin");
    let id = tx
        .insert_comment(&InsertCommentParams {
            author_id: Uuid::new_v4(),
            post_id,
            parent_id: parent.map(CommentPath::last_id),
            text: "comment".to_string(),
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("insert comment");
    let path = match parent {
        Some(parent) => parent.child(id),
        None => CommentPath::root(id),
    };
    tx.assign_path(id, &path).await.expect("assign path");
    tx.commit().await.expect("commit");
    path
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn comments_are_listed_in_numeric_path_order(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let post = seed_post(&repos, true).await;

    let mut roots = Vec::new();
    for _ in 0..10 {
        roots.push(add_comment(&repos, post.id, None).await);
    }
    let reply = add_comment(&repos, post.id, Some(&roots[1])).await;

    let listed: Vec<CommentPath> = repos
        .list_post_comments(&RequestContext::new(), post.id)
        .await
        .expect("list comments")
        .into_iter()
        .map(|comment| comment.path)
        .collect();

    let mut expected = roots.clone();
    expected.insert(2, reply);
    assert_eq!(listed, expected);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn dropped_transaction_rolls_back(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let post = seed_post(&repos, true).await;
    let ctx = RequestContext::new();

    {
        let mut tx = repos.begin(&ctx).await.expect("begin");
        let id = tx
            .insert_comment(&InsertCommentParams {
                author_id: Uuid::new_v4(),
                post_id: post.id,
                parent_id: None,
                text: "discarded".to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("insert");
        tx.assign_path(id, &CommentPath::root(id))
            .await
            .expect("assign path");
        tx.set_comments_enabled(post.id, false)
            .await
            .expect("toggle");
    }

    assert!(
        repos
            .list_post_comments(&ctx, post.id)
            .await
            .expect("list")
            .is_empty()
    );
    let reloaded = repos.find_post(&ctx, post.id).await.expect("find").expect("post");
    assert!(reloaded.comments_enabled);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn transaction_steps_see_their_own_post(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let first = seed_post(&repos, true).await;
    let second = seed_post(&repos, false).await;
    let root = add_comment(&repos, first.id, None).await;

    let ctx = RequestContext::new();
    let mut tx = repos.begin(&ctx).await.expect("begin");
    assert_eq!(tx.comments_enabled(second.id).await.unwrap(), Some(false));
    assert_eq!(tx.comments_enabled(second.id + 100).await.unwrap(), None);
    assert_eq!(
        tx.parent_path(first.id, root.last_id()).await.unwrap(),
        Some(root.clone())
    );
    assert_eq!(tx.parent_path(second.id, root.last_id()).await.unwrap(), None);

    let locked = tx
        .find_post_for_update(first.id)
        .await
        .unwrap()
        .expect("post");
    assert_eq!(locked.id, first.id);
    assert!(matches!(
        tx.set_comments_enabled(first.id + 100, true).await,
        Err(RepoError::NotFound)
    ));

    let path = repos
        .find_comment_path(&RequestContext::new(), root.last_id())
        .await
        .unwrap();
    assert_eq!(path, Some(root));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn posts_listed_oldest_first(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let first = seed_post(&repos, true).await;
    let second = seed_post(&repos, true).await;

    let posts = repos.list_posts(&RequestContext::new()).await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn disable_waits_for_open_comment_transaction(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let post = seed_post(&repos, true).await;
    let ctx = RequestContext::new();

    let mut adding = repos.begin(&ctx).await.expect("begin");
    assert_eq!(adding.comments_enabled(post.id).await.unwrap(), Some(true));

    let disabler = repos.clone();
    let post_id = post.id;
    let disable = tokio::spawn(async move {
        let ctx = RequestContext::new();
        let mut tx = disabler.begin(&ctx).await.expect("begin");
        tx.set_comments_enabled(post_id, false).await.expect("toggle");
        tx.commit().await.expect("commit");
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!disable.is_finished());

    let id = adding
        .insert_comment(&InsertCommentParams {
            author_id: Uuid::new_v4(),
            post_id: post.id,
            parent_id: None,
            text: "before disable".to_string(),
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("insert");
    adding
        .assign_path(id, &CommentPath::root(id))
        .await
        .expect("assign path");
    adding.commit().await.expect("commit");

    disable.await.expect("disable task");
    let reloaded = repos.find_post(&ctx, post.id).await.expect("find").expect("post");
    assert!(!reloaded.comments_enabled);
    assert_eq!(repos.list_post_comments(&ctx, post.id).await.unwrap().len(), 1);
}
