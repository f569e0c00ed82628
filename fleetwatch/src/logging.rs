//! Tracing setup. The terminal belongs to the TUI, so events go to a daily
//! rolling file instead of stdout.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConfigError;

pub const ENV_LOG: &str = "FLEETWATCH_LOG";

/// Install the global subscriber. Keep the guard alive for the life of the
/// process or buffered lines are lost.
pub fn init(dir: &Path) -> Result<WorkerGuard, ConfigError> {
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let appender = tracing_appender::rolling::daily(dir, "fleetwatch.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| "fleetwatch=info".into());
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init();
    Ok(guard)
}
