use std::process;

use threadline::{
    application::{AppError, NewComment, NewPost},
    config,
    domain::error::DomainError,
    infra::{bootstrap, db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report("threadline");
    if dispatcher::has_been_set() {
        error!(error = %report.joined(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.joined(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command_or_default() {
        config::Command::Migrate(_) => run_migrate(&settings).await,
        config::Command::Check(_) => run_check(&settings).await,
        config::Command::SeedDemo(_) => run_seed_demo(&settings).await,
    }
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = bootstrap::connect_postgres(settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| InfraError::database(format!("migration failed: {err}")))?;
    info!("migrations applied");
    Ok(())
}

async fn run_check(settings: &config::Settings) -> Result<(), AppError> {
    let services = bootstrap::build(settings).await?;
    services.health_check().await?;
    info!(
        storage = ?settings.storage.backend,
        cache = ?settings.cache.backend,
        "backends healthy"
    );
    Ok(())
}

/// Creates two posts, a short thread on the first and a rejected comment on
/// the second, then logs what the reads return.
async fn run_seed_demo(settings: &config::Settings) -> Result<(), AppError> {
    let services = bootstrap::build(settings).await?;
    let ctx = services.request_context();
    let author_id = Uuid::new_v4();

    let open = services
        .mutations
        .add_post(
            &ctx,
            NewPost {
                author_id,
                title: "Materialized paths".to_string(),
                text: "Comments are addressed by the ids of their ancestors.".to_string(),
                comments_enabled: true,
            },
        )
        .await?;

    let root = services
        .mutations
        .add_comment(
            &ctx,
            open.id,
            NewComment {
                author_id,
                parent_id: None,
                text: "First!".to_string(),
            },
        )
        .await?;
    let reply = services
        .mutations
        .add_comment(
            &ctx,
            open.id,
            NewComment {
                author_id,
                parent_id: Some(root.id),
                text: "A reply to the first comment.".to_string(),
            },
        )
        .await?;

    let roots = services.comments.comments_branch(&ctx, open.id, "").await?;
    let replies = services
        .comments
        .comments_branch(&ctx, open.id, root.path.as_str())
        .await?;
    let reply_path = services.comments.comment_path(&ctx, reply.id).await?;
    info!(
        post_id = open.id,
        roots = ?roots.iter().map(|c| c.path.to_string()).collect::<Vec<_>>(),
        replies = ?replies.iter().map(|c| c.path.to_string()).collect::<Vec<_>>(),
        reply_path = %reply_path,
        "demo thread created"
    );

    let closed = services
        .mutations
        .add_post(
            &ctx,
            NewPost {
                author_id,
                title: "Announcements".to_string(),
                text: "Comments are closed.".to_string(),
                comments_enabled: false,
            },
        )
        .await?;
    let rejected = services
        .mutations
        .add_comment(
            &ctx,
            closed.id,
            NewComment {
                author_id,
                parent_id: None,
                text: "Can I still comment?".to_string(),
            },
        )
        .await;
    match rejected {
        Err(AppError::Domain(DomainError::CommentsDisabled)) => {
            info!(post_id = closed.id, "comment rejected on closed post")
        }
        Err(err) => return Err(err),
        Ok(comment) => warn!(
            post_id = closed.id,
            comment_id = comment.id,
            "closed post accepted a comment"
        ),
    }

    let posts = services.posts.all_posts(&ctx).await?;
    info!(posts = posts.len(), "demo complete");
    Ok(())
}
