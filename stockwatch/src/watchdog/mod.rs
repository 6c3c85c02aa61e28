//! Heartbeat staleness monitor.
//!
//! Runs as its own process and talks to the poller only through the status
//! record file. One STOPPED notification is sent per outage; the flag that
//! suppresses repeats is cleared as soon as a fresh heartbeat shows up.

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::{Mention, WatchdogConfig};
use crate::live::StatusBoard;
use crate::notification::EmailSender;
use crate::notification::channels::stopped_email;
use crate::state::{HeartbeatRecord, RecordFile};
use crate::utils::time::now_ts;

/// What one tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Heartbeat is recent and no outage was pending.
    Fresh,
    /// Heartbeat is recent again; the stopped flag was cleared.
    Recovered,
    /// Stale, and the stopped notification went out on this tick.
    StoppedNotified,
    /// Stale, but this outage was already reported.
    AlreadyNotified,
}

/// Is the heartbeat stale at `now_ts`? `None` when fresh, else the reason.
pub fn staleness(heartbeat: &HeartbeatRecord, now_ts: f64, stale_after: Duration) -> Option<String> {
    match heartbeat.last_heartbeat_ts {
        None => Some("No heartbeat recorded yet".to_string()),
        Some(ts) => {
            let age = (now_ts - ts).max(0.0);
            (age >= stale_after.as_secs_f64())
                .then(|| format!("No heartbeat for {}s (watchdog)", age as u64))
        }
    }
}

pub struct WatchdogMonitor {
    file: RecordFile,
    config: WatchdogConfig,
    timezone: Tz,
    board: Option<StatusBoard>,
    mention: Option<Mention>,
    email: Option<Arc<dyn EmailSender>>,
}

impl WatchdogMonitor {
    /// `file` is the status record the poller heartbeats into.
    pub fn new(file: RecordFile, config: WatchdogConfig, timezone: Tz) -> Self {
        Self {
            file,
            config,
            timezone,
            board: None,
            mention: None,
            email: None,
        }
    }

    /// Flip the status message to STOPPED, pinging `mention`.
    pub fn with_status(mut self, board: StatusBoard, mention: Option<Mention>) -> Self {
        self.board = Some(board);
        self.mention = mention;
        self
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    /// Check every interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            path = %self.file.path().display(),
            "Watchdog started"
        );

        loop {
            match self.tick_at(now_ts()).await {
                Ok(outcome) => debug!(?outcome, "Watchdog tick"),
                Err(e) => warn!(error = %e, "Watchdog tick failed"),
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Watchdog stopped");
    }

    /// One check at wall-clock `now_ts` (seconds since the epoch).
    pub async fn tick_at(&self, now_ts: f64) -> Result<TickOutcome> {
        let heartbeat = self.file.load().await.heartbeat();

        let Some(reason) = staleness(&heartbeat, now_ts, self.config.stale_after) else {
            if heartbeat.stopped_notified {
                self.file
                    .update(|record| {
                        record.stopped_notified = false;
                        record.stopped_notified_ts = None;
                    })
                    .await?;
                info!("Heartbeat is fresh again, outage cleared");
                return Ok(TickOutcome::Recovered);
            }
            return Ok(TickOutcome::Fresh);
        };

        if heartbeat.stopped_notified {
            return Ok(TickOutcome::AlreadyNotified);
        }

        warn!(reason = %reason, "Poller looks stopped");
        self.notify_stopped(&reason, &heartbeat).await;

        // Recorded even if delivery failed, so an outage is reported at most once.
        self.file
            .update(|record| {
                record.stopped_notified = true;
                record.stopped_notified_ts = Some(now_ts);
            })
            .await?;

        Ok(TickOutcome::StoppedNotified)
    }

    async fn notify_stopped(&self, reason: &str, heartbeat: &HeartbeatRecord) {
        if let Some(board) = &self.board {
            let outcome = board.report_stopped(reason, self.mention.as_ref()).await;
            if outcome.is_delivered() {
                info!(?outcome, "Status message set to STOPPED");
            }
        }

        if let Some(sender) = &self.email {
            let last_check = heartbeat.last_check_local.as_deref().unwrap_or("unknown");
            let content = stopped_email(reason, last_check, self.timezone.name());
            match sender.send(&content.subject, &content.body).await {
                Ok(()) => info!("Stopped email sent"),
                Err(e) => warn!(error = %e, "Stopped email failed"),
            }
        }
    }
}
