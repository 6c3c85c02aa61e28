//! Alert delivery.
//!
//! Edge events from the change detector are fanned out by the
//! [`NotificationDispatcher`] to the chat webhook and email channels.

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{ChatWebhook, DeleteOutcome, DiscordWebhook, EmailSender, SmtpEmailChannel};
pub use events::{EdgeEvent, Transition};
pub use service::{ChatDelivery, DispatchReport, NotificationDispatcher};
