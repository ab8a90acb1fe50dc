//! Logging configuration using tracing
//!
//! Log records go to a daily rolling file so stdout stays free for the
//! dashboard output.

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "cashdash.log";

/// Initialize the tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set and valid, the configured level
/// otherwise. The returned guard flushes buffered records on drop and must be
/// held for the life of the program.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let directory = log_directory(config)?;
  std::fs::create_dir_all(&directory).map_err(|e| {
    eyre!(
      "Failed to create log directory {}: {}",
      directory.display(),
      e
    )
  })?;

  let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(env_filter(&config.level))
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

  tracing::debug!(directory = %directory.display(), "logging initialized");
  Ok(guard)
}

fn env_filter(fallback: &str) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(fallback))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_directory(config: &LogConfig) -> Result<PathBuf> {
  if let Some(dir) = &config.directory {
    return Ok(dir.clone());
  }

  dirs::data_dir()
    .map(|dir| dir.join("cashdash"))
    .ok_or_else(|| eyre!("Could not determine data directory for logs"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_configured_directory_wins() {
    let config = LogConfig {
      level: "debug".to_string(),
      directory: Some(PathBuf::from("/tmp/cashdash-logs")),
    };
    assert_eq!(
      log_directory(&config).unwrap(),
      PathBuf::from("/tmp/cashdash-logs")
    );
  }

  #[test]
  fn test_invalid_level_falls_back() {
    // Never panics, whatever RUST_LOG holds.
    let _ = env_filter("not[a valid filter");
    let _ = env_filter("cashdash=debug");
  }
}
