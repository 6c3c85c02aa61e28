//! One long-lived, editable chat message.
//!
//! States:
//! - unbound (no persisted id): `ensure()` creates the message and persists its id
//! - bound: `update()` edits in place
//!
//! A failed edit clears the persisted id, recreates the message and retries
//! the edit once. If that also fails the next update starts over.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::notification::ChatWebhook;
use crate::state::{MessageHandleRecord, RecordFile};
use crate::utils::time::utc_stamp;
use crate::{Error, Result};

/// Result of one `update()`, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Edited the existing message.
    Edited,
    /// The edit failed with `cause`; the message was recreated and edited.
    Recreated { cause: DeliveryError },
    /// Nothing reached the remote; retried on the next update.
    Failed { error: String },
}

impl UpdateOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Self-healing handle on a single remote message.
pub struct ExternalMessageHandle {
    name: &'static str,
    webhook: Arc<dyn ChatWebhook>,
    file: RecordFile,
    placeholder: Value,
    /// Serializes create/edit for this slot.
    lock: Mutex<()>,
}

impl ExternalMessageHandle {
    /// `placeholder` is the payload posted when the message has to be created.
    pub fn new(
        name: &'static str,
        webhook: Arc<dyn ChatWebhook>,
        file: RecordFile,
        placeholder: Value,
    ) -> Self {
        Self {
            name,
            webhook,
            file,
            placeholder,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current persisted record.
    pub async fn record(&self) -> MessageHandleRecord {
        self.file.load().await
    }

    /// Apply `f` to the persisted record while holding the slot lock.
    pub async fn update_record<F>(&self, f: F) -> Result<MessageHandleRecord>
    where
        F: FnOnce(&mut MessageHandleRecord),
    {
        let _guard = self.lock.lock().await;
        self.file.update(f).await
    }

    /// Return the bound message id, creating the message if needed.
    pub async fn ensure(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        self.ensure_locked().await
    }

    /// Forget the bound message.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.clear_locked().await
    }

    /// Edit the message to `payload`, healing it if it was deleted.
    pub async fn update(&self, payload: &Value) -> UpdateOutcome {
        let _guard = self.lock.lock().await;

        let message_id = match self.ensure_locked().await {
            Ok(id) => id,
            Err(e) => return self.failed(e.to_string()),
        };

        let cause = match self.webhook.edit(&message_id, payload).await {
            Ok(()) => return UpdateOutcome::Edited,
            Err(e) => e,
        };

        info!(
            slot = self.name,
            message_id = %message_id,
            error = %cause,
            "Live message edit failed, recreating"
        );

        if let Err(e) = self.clear_locked().await {
            return self.failed(e.to_string());
        }
        let message_id = match self.ensure_locked().await {
            Ok(id) => id,
            Err(e) => return self.failed(e.to_string()),
        };

        match self.webhook.edit(&message_id, payload).await {
            Ok(()) => UpdateOutcome::Recreated { cause },
            Err(e) => self.failed(e.to_string()),
        }
    }

    fn failed(&self, error: String) -> UpdateOutcome {
        warn!(slot = self.name, error = %error, "Live message update failed");
        UpdateOutcome::Failed { error }
    }

    async fn ensure_locked(&self) -> Result<String> {
        if let Some(id) = self.file.load().await.message_id {
            return Ok(id);
        }

        let id = self
            .webhook
            .create(&self.placeholder)
            .await
            .map_err(Error::from)?;

        self.file
            .update(|record| {
                record.message_id = Some(id.clone());
                record.created_at = Some(utc_stamp(Utc::now()));
            })
            .await?;

        debug!(slot = self.name, message_id = %id, "Bound live message");
        Ok(id)
    }

    async fn clear_locked(&self) -> Result<()> {
        self.file.update(MessageHandleRecord::clear_message).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notification::DeleteOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// In-memory webhook that hosts messages and can lose them.
    #[derive(Default)]
    pub(crate) struct MemoryWebhook {
        pub(crate) messages: StdMutex<HashMap<String, Value>>,
        pub(crate) creates: StdMutex<u32>,
        pub(crate) edits: StdMutex<u32>,
        pub(crate) fail_creates: StdMutex<bool>,
    }

    impl MemoryWebhook {
        pub(crate) fn create_count(&self) -> u32 {
            *self.creates.lock().unwrap()
        }

        pub(crate) fn drop_all(&self) {
            self.messages.lock().unwrap().clear();
        }

        pub(crate) fn content(&self, id: &str) -> Option<Value> {
            self.messages.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl ChatWebhook for MemoryWebhook {
        async fn create(&self, payload: &Value) -> std::result::Result<String, DeliveryError> {
            if *self.fail_creates.lock().unwrap() {
                return Err(DeliveryError::Transport("offline".to_string()));
            }
            let mut creates = self.creates.lock().unwrap();
            *creates += 1;
            let id = format!("msg-{}", *creates);
            self.messages.lock().unwrap().insert(id.clone(), payload.clone());
            Ok(id)
        }

        async fn edit(&self, id: &str, payload: &Value) -> std::result::Result<(), DeliveryError> {
            *self.edits.lock().unwrap() += 1;
            match self.messages.lock().unwrap().get_mut(id) {
                Some(slot) => {
                    *slot = payload.clone();
                    Ok(())
                }
                None => Err(DeliveryError::MessageGone {
                    message_id: id.to_string(),
                }),
            }
        }

        async fn delete(&self, id: &str) -> std::result::Result<DeleteOutcome, DeliveryError> {
            Ok(match self.messages.lock().unwrap().remove(id) {
                Some(_) => DeleteOutcome::Deleted,
                None => DeleteOutcome::AlreadyGone,
            })
        }
    }

    fn handle(dir: &TempDir, webhook: Arc<MemoryWebhook>) -> ExternalMessageHandle {
        ExternalMessageHandle::new(
            "test",
            webhook,
            RecordFile::new(dir.path().join("slot.json")),
            json!({"content": "starting"}),
        )
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let handle = handle(&dir, webhook.clone());

        let first = handle.ensure().await.unwrap();
        let second = handle.ensure().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(webhook.create_count(), 1);
        let record = handle.record().await;
        assert_eq!(record.message_id.as_deref(), Some(first.as_str()));
        assert!(record.created_at.is_some());
    }

    #[tokio::test]
    async fn test_update_edits_in_place() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let handle = handle(&dir, webhook.clone());

        assert_eq!(handle.update(&json!({"content": "a"})).await, UpdateOutcome::Edited);
        assert_eq!(handle.update(&json!({"content": "b"})).await, UpdateOutcome::Edited);

        assert_eq!(webhook.create_count(), 1);
        assert_eq!(webhook.content("msg-1"), Some(json!({"content": "b"})));
    }

    #[tokio::test]
    async fn test_deleted_message_is_recreated_once() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let handle = handle(&dir, webhook.clone());
        handle.ensure().await.unwrap();

        webhook.drop_all();
        let outcome = handle.update(&json!({"content": "healed"})).await;

        assert_eq!(
            outcome,
            UpdateOutcome::Recreated {
                cause: DeliveryError::MessageGone {
                    message_id: "msg-1".to_string()
                }
            }
        );
        assert_eq!(webhook.create_count(), 2);
        assert_eq!(*webhook.edits.lock().unwrap(), 2);
        assert_eq!(handle.record().await.message_id.as_deref(), Some("msg-2"));
        assert_eq!(webhook.content("msg-2"), Some(json!({"content": "healed"})));
    }

    #[tokio::test]
    async fn test_failure_is_swallowed_and_retried_next_time() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let handle = handle(&dir, webhook.clone());

        *webhook.fail_creates.lock().unwrap() = true;
        let outcome = handle.update(&json!({"content": "x"})).await;
        assert!(!outcome.is_delivered());
        assert_eq!(handle.record().await.message_id, None);

        *webhook.fail_creates.lock().unwrap() = false;
        assert_eq!(handle.update(&json!({"content": "x"})).await, UpdateOutcome::Edited);
        assert_eq!(webhook.create_count(), 1);
    }

    #[tokio::test]
    async fn test_update_record_keeps_message_id() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let handle = handle(&dir, webhook);
        let id = handle.ensure().await.unwrap();

        handle
            .update_record(|r| r.last_heartbeat_ts = Some(1.0))
            .await
            .unwrap();

        let record = handle.record().await;
        assert_eq!(record.message_id, Some(id));
        assert_eq!(record.last_heartbeat_ts, Some(1.0));
    }
}
