use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE_PREFIX: &str = "antiphish.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
  /// Daily rolling file only; keeps stdout/stderr clean for chat output.
  File,
  FileAndStderr,
}

pub fn init(log_dir: &Path, level: &str, retention_days: u64, sink: LogSink) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  remove_expired_logs(log_dir, retention_days);

  let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let _ = FILE_GUARD.set(guard);

  let filter = tracing_subscriber::EnvFilter::try_new(level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true);

  let stderr_layer = (sink == LogSink::FileAndStderr).then(|| {
    tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;

  Ok(())
}

fn remove_expired_logs(log_dir: &Path, retention_days: u64) {
  if retention_days == 0 {
    return;
  }

  let cutoff = SystemTime::now()
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let Ok(entries) = fs::read_dir(log_dir) else {
    return;
  };

  for entry in entries.flatten() {
    if !is_log_file(&entry.path()) {
      continue;
    }
    let expired = entry
      .metadata()
      .and_then(|m| m.modified())
      .map(|modified| modified < cutoff)
      .unwrap_or(false);
    if expired {
      let _ = fs::remove_file(entry.path());
    }
  }
}

fn is_log_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .map(|name| name == LOG_FILE_PREFIX || name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_rolled_log_files_match() {
    assert!(is_log_file(Path::new("/tmp/logs/antiphish.log")));
    assert!(is_log_file(Path::new("/tmp/logs/antiphish.log.2026-10-16")));
    assert!(!is_log_file(Path::new("/tmp/logs/forum.json")));
    assert!(!is_log_file(Path::new("/tmp/logs/antiphish.logger")));
  }

  #[test]
  fn zero_retention_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antiphish.log.2020-01-01");
    fs::write(&path, b"old").unwrap();
    remove_expired_logs(dir.path(), 0);
    assert!(path.exists());
  }
}
