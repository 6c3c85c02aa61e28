//! Console and daily-rolling file logging.
//!
//! - Local timezone timestamps
//! - `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]
//! - Log files older than 7 days are removed by a background task

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "stockwatch=info,reqwest=warn,lettre=warn";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Where a process writes its logs.
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
    prefix: &'static str,
}

impl LogFiles {
    /// Files are named `{prefix}.log.YYYY-MM-DD` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, prefix: &'static str) -> Self {
        Self {
            dir: dir.into(),
            prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base name handed to the daily appender.
    pub fn file_name(&self) -> String {
        format!("{}.log", self.prefix)
    }

    /// Name of the file written on `date`.
    pub fn dated_file_name(&self, date: chrono::NaiveDate) -> String {
        format!("{}.{}", self.file_name(), date.format("%Y-%m-%d"))
    }

    /// Append one line to the file for `date`, bypassing the async writer.
    pub fn append_line(&self, date: chrono::NaiveDate, line: &str) -> std::io::Result<()> {
        use std::io::Write;

        let path = self.dir.join(self.dated_file_name(date));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    /// Start the retention cleanup task. Runs daily until `cancel_token` fires.
    pub fn start_retention_cleanup(&self, cancel_token: CancellationToken) {
        let files = self.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                if let Err(e) = cleanup_old_logs(&files, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to cleanup old logs");
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete this process's log files older than `retention_days`.
async fn cleanup_old_logs(files: &LogFiles, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{}.", files.file_name());

    let mut entries = tokio::fs::read_dir(files.dir()).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Install the global subscriber: console plus a daily file in `files.dir()`.
///
/// Keep the returned guard alive for the lifetime of the process.
pub fn init_logging(files: &LogFiles) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", files.dir())?;

    let file_appender = tracing_appender::rolling::daily(files.dir(), files.file_name());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}
