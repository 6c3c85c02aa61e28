//! Chat message ids of active alerts, kept for retraction on sell-out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::Result;
use crate::domain::TrackedKey;
use crate::utils::fs::{read_json_lenient, write_json_atomic};

/// Persisted `TrackedKey -> message id` mapping.
///
/// Every mutation is written through immediately.
#[derive(Debug)]
pub struct AlertMessageRegistry {
    path: PathBuf,
    entries: BTreeMap<TrackedKey, String>,
}

impl AlertMessageRegistry {
    /// Load the registry, treating a missing or corrupt file as empty.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match read_json_lenient::<Value>(&path).await {
            Some(Value::Object(raw)) => {
                for (raw_key, value) in raw {
                    match (TrackedKey::parse(&raw_key), value.as_str()) {
                        (Some(key), Some(id)) if !id.is_empty() => {
                            entries.insert(key, id.to_string());
                        }
                        _ => warn!(key = %raw_key, "Dropping invalid alert registry entry"),
                    }
                }
            }
            Some(_) => warn!(path = %path.display(), "Alert registry is not a JSON object, treating as empty"),
            None => {}
        }

        Self { path, entries }
    }

    pub fn get(&self, key: &TrackedKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember the message posted for `key`.
    pub async fn record(&mut self, key: TrackedKey, message_id: String) -> Result<()> {
        self.entries.insert(key, message_id);
        self.persist().await
    }

    /// Forget `key`, returning the id that was stored.
    ///
    /// The in-memory entry is removed even if persisting fails.
    pub async fn remove(&mut self, key: &TrackedKey) -> Result<Option<String>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries).await
    }
}
