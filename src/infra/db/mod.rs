//! Postgres-backed repository implementations.

mod comments;
mod posts;
mod tx;
mod types;
mod util;

pub use tx::PostgresTx;
pub use util::map_sqlx_error;

use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query, query_scalar,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pool checkouts give up after `acquire_timeout`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Whether the comment schema has been migrated into this database.
    pub async fn schema_ready(&self) -> Result<bool, sqlx::Error> {
        query_scalar::<_, bool>(
            "SELECT to_regclass('public.posts') IS NOT NULL \
             AND to_regclass('public.comments') IS NOT NULL",
        )
        .fetch_one(self.pool())
        .await
    }
}
