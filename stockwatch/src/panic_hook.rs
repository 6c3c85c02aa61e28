//! Panic reporting for the long-running binaries.
//!
//! Release builds abort on panic, which can kill the process before the
//! non-blocking log writer drains. The report is therefore also appended
//! synchronously to today's log file.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::PanicHookInfo;

use chrono::{DateTime, Local};

use crate::logging::LogFiles;

/// Everything recorded about one panic.
#[derive(Debug)]
pub struct PanicReport {
    pub at: DateTime<Local>,
    pub thread: String,
    pub location: Option<String>,
    pub message: String,
    pub backtrace: String,
}

impl PanicReport {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        Self {
            at: Local::now(),
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            location: info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            message: payload_message(info.payload()).unwrap_or_else(|| info.to_string()),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PANIC in thread '{}' at {}: {}",
            self.at.format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.thread,
            self.location.as_deref().unwrap_or("<unknown>"),
            self.message
        )?;
        if !self.backtrace.is_empty() {
            write!(f, "\nBacktrace:\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

/// Panic payloads are `&str` or `String` unless someone used `panic_any`.
fn payload_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

/// Report panics through `tracing`, then defer to the previous hook.
pub fn install(files: LogFiles) {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        // A panic while reporting must not replace the original one.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let report = PanicReport::capture(info);
            tracing::error!(target: "stockwatch::panic", "{report}");

            if cfg!(panic = "abort") {
                let _ = files.append_line(report.at.date_naive(), &report.to_string());
            }
        }));

        previous(info);
    }));
}
