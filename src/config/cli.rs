use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Threadline binary.
#[derive(Debug, Parser)]
#[command(name = "threadline", version, about = "Threaded comments store")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "THREADLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The requested command; `check` when none was given.
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Check(RuntimeOverrides::default()))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate(DatabaseOverride),
    /// Connect to the configured store and cache and report their health.
    Check(RuntimeOverrides),
    /// Create a demo post with a small comment tree and log it.
    #[command(name = "seed-demo")]
    SeedDemo(RuntimeOverrides),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the storage backend (postgres|memory).
    #[arg(long = "storage-backend", value_name = "BACKEND")]
    pub storage_backend: Option<String>,

    /// Override the cache backend (redis|memory|disabled).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the cache entry TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the per-request timeout.
    #[arg(long = "request-timeout-seconds", value_name = "SECONDS")]
    pub request_timeout_seconds: Option<u64>,
}
