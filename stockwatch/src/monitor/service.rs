//! The poll loop.
//!
//! One cycle observes every (product, store) pair in catalog order, diffs the
//! results against the persisted alert state, dispatches the edge events,
//! persists the new state and refreshes the live messages. Cycles are
//! strictly sequential; shutdown is only honoured between them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::detector::ChangeDetector;
use super::source::ObservationSource;
use crate::config::Catalog;
use crate::domain::{Observation, TrackedKey};
use crate::live::{
    RunningReport, StatusBoard, SummaryBoard, UpdateOutcome, render_summary_lines,
    stamp_heartbeat,
};
use crate::notification::{ChatDelivery, DispatchReport, NotificationDispatcher};
use crate::state::{AlertStateStore, RecordFile};
use crate::utils::time::local_clock;

/// Longest last-error text carried into the status message.
pub const MAX_LAST_ERROR_CHARS: usize = 180;

/// What one cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub observed: usize,
    pub failed: usize,
    pub last_error: Option<String>,
    pub reports: Vec<DispatchReport>,
    pub state_saved: bool,
    pub status: Option<UpdateOutcome>,
    pub summary: Option<UpdateOutcome>,
}

/// Where the heartbeat goes.
enum Heartbeat {
    /// Written by the status board before it edits the message.
    Board(StatusBoard),
    /// No chat webhook; the record is still kept for the watchdog.
    FileOnly(RecordFile),
}

/// Drives observe → detect → dispatch → persist → refresh.
pub struct PollCycleOrchestrator {
    catalog: Arc<Catalog>,
    source: Arc<dyn ObservationSource>,
    detector: ChangeDetector,
    store: AlertStateStore,
    dispatcher: NotificationDispatcher,
    heartbeat: Heartbeat,
    summary: Option<SummaryBoard>,
    timezone: Tz,
    poll_interval: Duration,
    started: Instant,
}

impl PollCycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        source: Arc<dyn ObservationSource>,
        detector: ChangeDetector,
        store: AlertStateStore,
        dispatcher: NotificationDispatcher,
        heartbeat_file: RecordFile,
        timezone: Tz,
        poll_interval: Duration,
    ) -> Self {
        Self {
            catalog,
            source,
            detector,
            store,
            dispatcher,
            heartbeat: Heartbeat::FileOnly(heartbeat_file),
            summary: None,
            timezone,
            poll_interval,
            started: Instant::now(),
        }
    }

    /// Publish status through `board`, whose record replaces the bare heartbeat file.
    pub fn with_status(mut self, board: StatusBoard) -> Self {
        self.heartbeat = Heartbeat::Board(board);
        self
    }

    pub fn with_summary(mut self, board: SummaryBoard) -> Self {
        self.summary = Some(board);
        self
    }

    /// Whether the status and summary messages are kept up to date.
    pub fn publishes_live_messages(&self) -> bool {
        matches!(self.heartbeat, Heartbeat::Board(_)) || self.summary.is_some()
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            products = self.catalog.products.len(),
            stores = self.catalog.stores.len(),
            poll_secs = self.poll_interval.as_secs(),
            "Starting poll loop"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.run_cycle(Utc::now()).await;
            info!(
                observed = outcome.observed,
                failed = outcome.failed,
                events = outcome.reports.len(),
                state_saved = outcome.state_saved,
                "Cycle complete, sleeping {}s",
                self.poll_interval.as_secs()
            );

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Poll loop stopped");
    }

    /// Run one full cycle. `now` is the cycle start.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let cycle_start = local_clock(self.timezone, now);
        info!(cycle_start = %cycle_start, "Stock check cycle");

        let previous = self.store.load().await;
        let facets = self.detector.facets();

        let mut batch: Vec<(TrackedKey, Observation)> =
            Vec::with_capacity(self.catalog.checks_per_cycle());
        let mut failed = 0;
        let mut last_error = None;

        for (product, store) in self.catalog.pairs() {
            let key = TrackedKey::availability(&product.sku, &store.id);
            let observation = match self.source.observe(product, store).await {
                Ok(obs) if facets.open_box => obs,
                Ok(obs) => obs.without_open_box(),
                Err(e) => {
                    warn!(sku = %product.sku, store = %store.id, error = %e, "Stock check failed");
                    failed += 1;
                    last_error = Some(truncate_chars(&e.to_string(), MAX_LAST_ERROR_CHARS));
                    Observation::unavailable()
                }
            };
            debug!(key = %key, ?observation, "Observed");
            batch.push((key, observation));
        }

        let diff = self
            .detector
            .detect(&previous, batch.iter().map(|(k, o)| (k, o)));

        let mut reports = Vec::with_capacity(diff.events.len());
        for event in &diff.events {
            let report = self.dispatcher.notify(event).await;
            log_report(&report);
            reports.push(report);
        }

        let state_saved = match self.store.save(&diff.next_state).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.store.path().display(), error = %e, "Failed to persist alert state");
                false
            }
        };

        let status = self.refresh_status(&cycle_start, last_error.clone()).await;

        let summary = match &self.summary {
            Some(board) => {
                let observations: BTreeMap<TrackedKey, Observation> = batch.into_iter().collect();
                let lines = render_summary_lines(&self.catalog, &observations, facets.open_box);
                Some(board.update(&lines, &cycle_start, Utc::now()).await)
            }
            None => None,
        };

        CycleOutcome {
            observed: self.catalog.checks_per_cycle(),
            failed,
            last_error,
            reports,
            state_saved,
            status,
            summary,
        }
    }

    async fn refresh_status(
        &self,
        cycle_start: &str,
        last_error: Option<String>,
    ) -> Option<UpdateOutcome> {
        match &self.heartbeat {
            Heartbeat::Board(board) => {
                let report = RunningReport {
                    last_check_local: cycle_start.to_string(),
                    last_error,
                    uptime: self.started.elapsed(),
                };
                match board.report_running(&report, Utc::now()).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        error!(error = %e, "Failed to write heartbeat");
                        None
                    }
                }
            }
            Heartbeat::FileOnly(file) => {
                let now = Utc::now();
                if let Err(e) = file
                    .update(|record| stamp_heartbeat(record, self.timezone, now, cycle_start))
                    .await
                {
                    error!(error = %e, "Failed to write heartbeat");
                }
                None
            }
        }
    }
}

/// The single place dispatch results are logged.
fn log_report(report: &DispatchReport) {
    let event = &report.event;
    match &report.chat {
        Some(Ok(ChatDelivery::Posted { message_id })) => {
            info!(key = %event.key, message_id = %message_id, "Alert posted")
        }
        Some(Ok(ChatDelivery::Retracted(outcome))) => {
            info!(key = %event.key, ?outcome, "Alert retracted")
        }
        Some(Ok(ChatDelivery::NothingToRetract)) => {
            debug!(key = %event.key, "No recorded alert to retract")
        }
        _ => {}
    }
    if let Some(Ok(())) = &report.email {
        info!(key = %event.key, "Alert email sent");
    }
    for (channel, error) in report.failures() {
        warn!(
            key = %event.key,
            transition = %event.transition,
            channel,
            error = %error,
            "Notification failed"
        );
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
