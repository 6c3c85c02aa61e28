//! Delivery channels.
//!
//! - Chat webhook (Discord): create, edit and delete messages
//! - Email (SMTP)

mod discord;
mod email;

pub use discord::{ALERT_COLOR, DiscordWebhook, alert_payload, allowed_mentions, ping_content};
pub use email::{EmailContent, SmtpEmailChannel, instock_email, open_box_email, stopped_email};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DeliveryError;

/// Outcome of deleting a remote message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The message had already been removed; treated as success.
    AlreadyGone,
}

/// A chat API that hosts editable messages.
#[async_trait]
pub trait ChatWebhook: Send + Sync {
    /// Post a new message and return its id.
    async fn create(&self, payload: &Value) -> Result<String, DeliveryError>;

    /// Replace the contents of an existing message.
    ///
    /// Returns `DeliveryError::MessageGone` when the message no longer exists.
    async fn edit(&self, message_id: &str, payload: &Value) -> Result<(), DeliveryError>;

    async fn delete(&self, message_id: &str) -> Result<DeleteOutcome, DeliveryError>;
}

/// Plain-text email delivery.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), DeliveryError>;
}
