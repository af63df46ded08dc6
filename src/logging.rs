//! Logging: a daily rolling file plus stderr.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,slackernetes=debug";
const LOG_FILE: &str = "slackernetes.log";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process, or buffered
/// file output is lost.
pub fn init() -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = get_log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE));

    let filter = env_filter(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        std::env::var("LOG_LEVEL").ok(),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Log directory: {}", log_dir.display());
    Ok((guard, log_dir))
}

/// `RUST_LOG`, else `LOG_LEVEL` (e.g. `DEBUG`), else the default. Values
/// that do not parse fall through to the next source.
fn env_filter(rust_log: Option<String>, log_level: Option<String>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| log_level.and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn get_log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "slackernetes", "slackernetes")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    Ok(dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        let filter = env_filter(Some("warn".to_string()), Some("DEBUG".to_string()));
        assert_eq!(filter.to_string(), "warn");

        let filter = env_filter(None, Some("DEBUG".to_string()));
        assert_eq!(filter.to_string(), "debug");

        let filter = env_filter(None, None);
        assert!(filter.to_string().contains("slackernetes=debug"));
    }

    #[test]
    fn test_unparsable_level_falls_back_to_default() {
        let filter = env_filter(None, Some("very=loud=please".to_string()));
        assert!(filter.to_string().contains("slackernetes=debug"));
    }
}
