use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::debug;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::comments::METRIC_BRANCH_REBUILD;
use crate::cache::{
    METRIC_BRANCH_HIT, METRIC_BRANCH_MISS, METRIC_BRANCH_NOT_FOUND, METRIC_POPULATE_FAILED,
    METRIC_POPULATE_MS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// configured level entirely.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    // sqlx logs every statement at info.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx::query=warn", logging.level)));

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))?;

    debug!(level = %logging.level, format = ?logging.format, "telemetry ready");
    Ok(())
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_BRANCH_HIT,
            Unit::Count,
            "Comment branch reads served from the cache."
        );
        describe_counter!(
            METRIC_BRANCH_MISS,
            Unit::Count,
            "Comment branch reads that fell through to the store."
        );
        describe_counter!(
            METRIC_BRANCH_NOT_FOUND,
            Unit::Count,
            "Comment branch reads answered by a cached absence marker."
        );
        describe_counter!(
            METRIC_BRANCH_REBUILD,
            Unit::Count,
            "Comment trees rebuilt from the store."
        );
        describe_counter!(
            METRIC_POPULATE_FAILED,
            Unit::Count,
            "Comment tree rebuilds whose cache writes partially failed."
        );
        describe_histogram!(
            METRIC_POPULATE_MS,
            Unit::Milliseconds,
            "Latency of writing a rebuilt comment tree to the cache."
        );
    });
}
