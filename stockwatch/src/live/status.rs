//! The RUNNING/STOPPED status message and the heartbeat it carries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};

use super::handle::{ExternalMessageHandle, UpdateOutcome};
use crate::Result;
use crate::config::{Catalog, Mention};
use crate::notification::ChatWebhook;
use crate::notification::channels::allowed_mentions;
use crate::state::{MessageHandleRecord, RecordFile};
use crate::utils::time::{datetime_to_ts, format_uptime, local_clock, utc_stamp};

/// Static part of every status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusHeader {
    pub store_label: String,
    pub products: usize,
    pub stores: usize,
    pub checks_per_cycle: usize,
}

impl StatusHeader {
    pub fn from_catalog(store_label: impl Into<String>, catalog: &Catalog) -> Self {
        Self {
            store_label: store_label.into(),
            products: catalog.products.len(),
            stores: catalog.stores.len(),
            checks_per_cycle: catalog.checks_per_cycle(),
        }
    }
}

/// Per-cycle fields of a RUNNING report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningReport {
    pub last_check_local: String,
    pub last_error: Option<String>,
    pub uptime: Duration,
}

fn header_lines(header: &StatusHeader, last_check: &str, heartbeat: &str) -> Vec<String> {
    vec![
        format!("Store: {}", header.store_label),
        format!("Products: {}", header.products),
        format!("Stores: {}", header.stores),
        format!("Checks per cycle: {}", header.checks_per_cycle),
        format!("Last check: {}", last_check),
        format!("Last heartbeat: {}", heartbeat),
    ]
}

/// Content of the RUNNING message.
pub fn render_running(
    header: &StatusHeader,
    report: &RunningReport,
    heartbeat_local: &str,
    timezone_name: &str,
) -> String {
    let mut lines = vec!["🟩 Stock bot RUNNING".to_string()];
    lines.extend(header_lines(header, &report.last_check_local, heartbeat_local));
    lines.push(format!("Uptime: {}", format_uptime(report.uptime.as_secs())));
    lines.push(format!("Timezone: {}", timezone_name));
    lines.push(format!(
        "Last error: {}",
        report.last_error.as_deref().unwrap_or("none")
    ));
    lines.join("\n")
}

/// Content of the STOPPED message.
pub fn render_stopped(
    header: &StatusHeader,
    reason: &str,
    last_check: &str,
    heartbeat_local: &str,
    timezone_name: &str,
    mention: Option<&Mention>,
) -> String {
    let mut lines = Vec::new();
    match mention {
        Some(Mention::Role(role)) => lines.push(format!("<@&{}>", role)),
        Some(Mention::User(user)) => lines.push(format!("<@{}>", user)),
        None => {}
    }
    lines.push("🟥 Stock bot STOPPED".to_string());
    lines.extend(header_lines(header, last_check, heartbeat_local));
    lines.push("Uptime: unknown".to_string());
    lines.push(format!("Timezone: {}", timezone_name));
    lines.push(format!("Last error: {}", reason));
    lines.join("\n")
}

/// Stamp the heartbeat fields the watchdog reads.
pub fn stamp_heartbeat(
    record: &mut MessageHandleRecord,
    timezone: Tz,
    now: DateTime<Utc>,
    last_check_local: &str,
) {
    record.last_heartbeat_ts = Some(datetime_to_ts(now));
    record.last_heartbeat_local = Some(local_clock(timezone, now));
    record.last_update_utc = Some(utc_stamp(now));
    record.last_check_local = Some(last_check_local.to_string());
    record.timezone_name = Some(timezone.name().to_string());
}

/// The status slot.
///
/// Its record file is also the heartbeat the watchdog reads.
pub struct StatusBoard {
    handle: ExternalMessageHandle,
    header: StatusHeader,
    timezone: Tz,
}

impl StatusBoard {
    pub fn new(
        webhook: Arc<dyn ChatWebhook>,
        file: RecordFile,
        header: StatusHeader,
        timezone: Tz,
    ) -> Self {
        let placeholder = json!({
            "content": "🟨 Stock bot STARTING\nInitializing status message...",
            "allowed_mentions": {"parse": []},
        });
        Self {
            handle: ExternalMessageHandle::new("status", webhook, file, placeholder),
            header,
            timezone,
        }
    }

    pub fn handle(&self) -> &ExternalMessageHandle {
        &self.handle
    }

    /// Write the heartbeat, then refresh the message.
    ///
    /// The heartbeat is persisted before any network call so a chat outage
    /// never looks like a dead poller. Only a failed heartbeat write is an error.
    pub async fn report_running(
        &self,
        report: &RunningReport,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let heartbeat_local = local_clock(self.timezone, now);
        let timezone_name = self.timezone.name();

        self.handle
            .update_record(|record| {
                stamp_heartbeat(record, self.timezone, now, &report.last_check_local)
            })
            .await?;

        let content = render_running(&self.header, report, &heartbeat_local, timezone_name);
        let payload = json!({
            "content": content,
            "allowed_mentions": {"parse": []},
        });
        Ok(self.handle.update(&payload).await)
    }

    /// Switch the message to STOPPED with `reason`, pinging `mention`.
    pub async fn report_stopped(&self, reason: &str, mention: Option<&Mention>) -> UpdateOutcome {
        let record = self.handle.record().await;
        let last_check = record.last_check_local.as_deref().unwrap_or("unknown");
        let heartbeat = record.last_heartbeat_local.as_deref().unwrap_or("unknown");

        let content = render_stopped(
            &self.header,
            reason,
            last_check,
            heartbeat,
            self.timezone.name(),
            mention,
        );
        let payload: Value = json!({
            "content": content,
            "allowed_mentions": allowed_mentions(mention),
        });
        self.handle.update(&payload).await
    }
}
