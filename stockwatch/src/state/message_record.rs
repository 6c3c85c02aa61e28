//! Persisted record for one live message slot.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::utils::fs::{read_json_lenient, write_json_atomic};

/// Everything remembered about one live message.
///
/// The status slot's record doubles as the heartbeat shared with the watchdog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageHandleRecord {
    pub message_id: Option<String>,
    pub created_at: Option<String>,
    pub last_heartbeat_ts: Option<f64>,
    pub last_heartbeat_local: Option<String>,
    pub last_check_local: Option<String>,
    pub last_update_utc: Option<String>,
    pub timezone_name: Option<String>,
    pub stopped_notified: bool,
    pub stopped_notified_ts: Option<f64>,
}

/// The fields the poller and the watchdog exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatRecord {
    pub last_heartbeat_ts: Option<f64>,
    pub last_check_local: Option<String>,
    pub stopped_notified: bool,
}

impl MessageHandleRecord {
    pub fn heartbeat(&self) -> HeartbeatRecord {
        HeartbeatRecord {
            last_heartbeat_ts: self.last_heartbeat_ts,
            last_check_local: self.last_check_local.clone(),
            stopped_notified: self.stopped_notified,
        }
    }

    /// Forget the remote message so the next `ensure()` recreates it.
    pub fn clear_message(&mut self) {
        self.message_id = None;
        self.created_at = None;
    }
}

/// JSON file holding a [`MessageHandleRecord`].
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt files yield an empty record.
    pub async fn load(&self) -> MessageHandleRecord {
        read_json_lenient(&self.path).await.unwrap_or_default()
    }

    pub async fn save(&self, record: &MessageHandleRecord) -> Result<()> {
        write_json_atomic(&self.path, record).await
    }

    /// Load, apply `f`, save. Returns the saved record.
    pub async fn update<F>(&self, f: F) -> Result<MessageHandleRecord>
    where
        F: FnOnce(&mut MessageHandleRecord),
    {
        let mut record = self.load().await;
        f(&mut record);
        self.save(&record).await?;
        Ok(record)
    }
}
