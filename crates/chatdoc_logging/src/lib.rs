//! Shared logging setup for chat-a-doc binaries.
//!
//! Logs always go to stderr. When a log directory is configured, a second
//! layer writes a daily-rolling file through `tracing-appender`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "chatdoc=info,chatdoc_mcp=info,chatdoc_render=info,tower_http=info";
const VERBOSE_LOG_FILTER: &str =
    "chatdoc=debug,chatdoc_mcp=debug,chatdoc_render=debug,chatdoc_security=debug,tower_http=debug";

/// Logging configuration shared by chat-a-doc binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Directory for rolling log files; stderr only when `None`
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background file writer alive. Drop it on shutdown to flush.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with stderr output and an optional rolling file.
///
/// `RUST_LOG` overrides the default filter unless `verbose` is set.
pub fn init_logging(config: LogConfig<'_>) -> Result<LoggingGuard> {
    let filter = || {
        if config.verbose {
            EnvFilter::new(VERBOSE_LOG_FILTER)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
        }
    };

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            ensure_dir(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", log_file_stem(config.app_name)));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard { _file: file_guard })
}

/// Ensure the log directory exists.
fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))
}

/// File stem derived from the app name: lowercase ASCII, `-` and `_` kept.
fn log_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "chatdoc".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_stem_sanitizes() {
        assert_eq!(log_file_stem("chat-a-doc"), "chat-a-doc");
        assert_eq!(log_file_stem("Chat A/Doc"), "chat_a_doc");
        assert_eq!(log_file_stem(""), "chatdoc");
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
