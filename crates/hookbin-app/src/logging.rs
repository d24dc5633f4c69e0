//! Tracing subscriber setup.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a log level.
pub fn default_directive(level: &str) -> String {
    format!(
        "hookbin={0},hookbin_app={0},hookbin_core={0},hookbin_storage={0},hookbin_server={0},tower_http={0},warn",
        level
    )
}

/// Initialize logging, optionally with daily-rotated files.
///
/// `RUST_LOG` overrides `level`. Keep the returned guard alive for the
/// lifetime of the program so buffered file output is flushed.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    if let Some(log_dir) = log_dir {
        let file_appender = std::fs::create_dir_all(log_dir).ok().and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(7)
                .filename_prefix("hookbin")
                .filename_suffix("log")
                .build(log_dir)
                .ok()
        });

        if let Some(appender) = file_appender {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }

        // Fallback: console logging only
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        tracing::warn!("File logging unavailable in {:?}, using console only", log_dir);
        return None;
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        let directive = default_directive("debug");
        assert!(directive.starts_with("hookbin=debug"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
