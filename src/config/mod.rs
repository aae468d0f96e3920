//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, RuntimeOverrides};

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "threadline";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_CACHE_MEMORY_MAX_ENTRIES: usize = 10_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub requests: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub ttl: Duration,
    /// Capacity of the in-process backend; least recently used entries go first.
    pub memory_max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("THREADLINE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Migrate(database)) => {
            raw.apply_database_override(database);
            // Migrations only make sense against Postgres.
            raw.storage.backend = Some("postgres".to_string());
        }
        Some(Command::Check(overrides)) | Some(Command::SeedDemo(overrides)) => {
            raw.apply_runtime_overrides(overrides)
        }
        None => raw.apply_runtime_overrides(&RuntimeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse CLI arguments and resolve settings, returning both.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    storage: RawStorageSettings,
    cache: RawCacheSettings,
    requests: RawRequestSettings,
}

impl RawSettings {
    fn apply_runtime_overrides(&mut self, overrides: &RuntimeOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.storage_backend.as_ref() {
            self.storage.backend = Some(backend.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(timeout) = overrides.request_timeout_seconds {
            self.requests.timeout_seconds = Some(timeout);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            storage,
            cache,
            requests,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let storage = build_storage_settings(storage, &database)?;
        let cache = build_cache_settings(cache)?;
        let requests = build_request_settings(requests)?;

        Ok(Self {
            logging,
            database,
            storage,
            cache,
            requests,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    database: &DatabaseSettings,
) -> Result<StorageSettings, LoadError> {
    let backend = match storage.backend.as_deref().map(str::trim) {
        None | Some("memory") => StorageBackend::Memory,
        Some("postgres") => StorageBackend::Postgres,
        Some(other) => {
            return Err(LoadError::invalid(
                "storage.backend",
                format!("unknown backend `{other}`, expected postgres or memory"),
            ));
        }
    };

    if backend == StorageBackend::Postgres && database.url.is_none() {
        return Err(LoadError::invalid(
            "database.url",
            "required when storage.backend is postgres",
        ));
    }

    Ok(StorageSettings { backend })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("memory") => CacheBackend::Memory,
        Some("redis") => CacheBackend::Redis,
        Some("disabled") => CacheBackend::Disabled,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`, expected redis, memory or disabled"),
            ));
        }
    };

    let redis_url = non_blank(cache.redis_url);
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend is redis",
        ));
    }

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let memory_max_entries = cache
        .memory_max_entries
        .unwrap_or(DEFAULT_CACHE_MEMORY_MAX_ENTRIES);
    let memory_max_entries = NonZeroUsize::new(memory_max_entries).ok_or_else(|| {
        LoadError::invalid("cache.memory_max_entries", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        backend,
        redis_url,
        ttl: Duration::from_secs(ttl_seconds),
        memory_max_entries,
    })
}

fn build_request_settings(requests: RawRequestSettings) -> Result<RequestSettings, LoadError> {
    let timeout_seconds = requests
        .timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "requests.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RequestSettings {
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value = u32::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range"))?;
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    ttl_seconds: Option<u64>,
    memory_max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRequestSettings {
    timeout_seconds: Option<u64>,
}
