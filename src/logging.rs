//! tracing setup: a daily log file under `<home>/logs` plus stderr.
//!
//! stdout is reserved for replies in console mode.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "meshboard.log";
const DEFAULT_DIRECTIVES: &str = "info,meshboard=debug";

/// `RUST_LOG` when set and valid, otherwise [`DEFAULT_DIRECTIVES`].
fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Drop the guard only at process exit,
/// it owns the file writer's flush.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter_from_env())
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    tracing::debug!("Writing logs to {}", log_dir.join(LOG_FILE_PREFIX).display());
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_init_creates_log_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");

        // another test may already own the global subscriber
        let _ = init(&log_dir);
        assert!(log_dir.is_dir());
    }
}
