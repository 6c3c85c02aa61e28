//! Durable `TrackedKey -> bool` mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::Result;
use crate::domain::TrackedKey;
use crate::utils::fs::{read_json_lenient, write_json_atomic};

/// "Was this condition true as of the last completed cycle."
pub type AlertState = BTreeMap<TrackedKey, bool>;

/// File-backed store for [`AlertState`].
///
/// One poller process owns the file; there is no locking.
#[derive(Debug, Clone)]
pub struct AlertStateStore {
    path: PathBuf,
}

impl AlertStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing or corrupt file yields an empty mapping. Entries whose key is
    /// not in canonical form, or whose value is not a boolean, are dropped.
    pub async fn load(&self) -> AlertState {
        let Some(raw) = read_json_lenient::<Value>(&self.path).await else {
            return AlertState::new();
        };

        let Value::Object(entries) = raw else {
            warn!(path = %self.path.display(), "Alert state is not a JSON object, treating as empty");
            return AlertState::new();
        };

        let state = decode_entries(entries);
        debug!(path = %self.path.display(), entries = state.len(), "Loaded alert state");
        state
    }

    /// Persist `state` atomically.
    pub async fn save(&self, state: &AlertState) -> Result<()> {
        write_json_atomic(&self.path, state).await
    }
}

fn decode_entries(entries: Map<String, Value>) -> AlertState {
    let mut state = AlertState::new();
    for (raw_key, value) in entries {
        let Some(key) = TrackedKey::parse(&raw_key) else {
            warn!(key = %raw_key, "Dropping unrecognised alert state key");
            continue;
        };
        let Some(flag) = value.as_bool() else {
            warn!(key = %raw_key, value = %value, "Dropping non-boolean alert state value");
            continue;
        };
        state.insert(key, flag);
    }
    state
}
