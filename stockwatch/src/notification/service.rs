//! Fan-out of edge events to the enabled delivery channels.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::channels::{
    ChatWebhook, DeleteOutcome, EmailContent, EmailSender, alert_payload, instock_email,
    open_box_email,
};
use super::events::{EdgeEvent, Transition};
use crate::Result;
use crate::config::{AlertToggles, Catalog, Product, WebhookConfig};
use crate::domain::Facet;
use crate::error::DeliveryError;
use crate::state::AlertMessageRegistry;

/// What happened on the chat channel for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDelivery {
    /// Alert posted; its id is now in the registry.
    Posted { message_id: String },
    /// A previously posted alert was removed.
    Retracted(DeleteOutcome),
    /// Sell-out with no recorded alert to remove.
    NothingToRetract,
}

/// Per-channel results for one event. `None` means the channel was not attempted.
#[derive(Debug)]
pub struct DispatchReport {
    pub event: EdgeEvent,
    pub chat: Option<std::result::Result<ChatDelivery, DeliveryError>>,
    pub email: Option<std::result::Result<(), DeliveryError>>,
    /// Persisting the alert registry.
    pub registry: Option<Result<()>>,
}

impl DispatchReport {
    fn new(event: &EdgeEvent) -> Self {
        Self {
            event: event.clone(),
            chat: None,
            email: None,
            registry: None,
        }
    }

    /// `(channel, error)` for every failed step.
    pub fn failures(&self) -> Vec<(&'static str, String)> {
        let mut failures = Vec::new();
        if let Some(Err(e)) = &self.chat {
            failures.push(("chat", e.to_string()));
        }
        if let Some(Err(e)) = &self.email {
            failures.push(("email", e.to_string()));
        }
        if let Some(Err(e)) = &self.registry {
            failures.push(("registry", e.to_string()));
        }
        failures
    }

    pub fn attempted(&self) -> bool {
        self.chat.is_some() || self.email.is_some()
    }
}

struct ChatChannel {
    webhook: Arc<dyn ChatWebhook>,
    config: WebhookConfig,
}

/// Delivers edge events to chat and email.
///
/// Each channel is attempted independently. Nothing here logs failures;
/// they are returned in the [`DispatchReport`].
pub struct NotificationDispatcher {
    catalog: Arc<Catalog>,
    toggles: AlertToggles,
    registry: AlertMessageRegistry,
    chat: Option<ChatChannel>,
    email: Option<Arc<dyn EmailSender>>,
}

impl NotificationDispatcher {
    pub fn new(catalog: Arc<Catalog>, toggles: AlertToggles, registry: AlertMessageRegistry) -> Self {
        Self {
            catalog,
            toggles,
            registry,
            chat: None,
            email: None,
        }
    }

    pub fn with_chat(mut self, webhook: Arc<dyn ChatWebhook>, config: WebhookConfig) -> Self {
        self.chat = Some(ChatChannel { webhook, config });
        self
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn registry(&self) -> &AlertMessageRegistry {
        &self.registry
    }

    fn chat_channel(&self) -> Option<&ChatChannel> {
        self.chat.as_ref().filter(|_| self.toggles.discord)
    }

    fn email_channel(&self) -> Option<&Arc<dyn EmailSender>> {
        self.email.as_ref().filter(|_| self.toggles.email)
    }

    fn facet_alerts_enabled(&self, facet: Facet) -> bool {
        match facet {
            Facet::Availability => self.toggles.new_stock,
            Facet::OpenBox => self.toggles.open_box,
        }
    }

    /// Product for a subject id; unknown ids render with the id as the name.
    fn product_for(&self, subject: &str) -> Product {
        self.catalog.product(subject).cloned().unwrap_or_else(|| Product {
            sku: subject.to_string(),
            name: subject.to_string(),
            url: String::new(),
            specs: Default::default(),
        })
    }

    pub async fn notify(&mut self, event: &EdgeEvent) -> DispatchReport {
        match event.transition {
            Transition::BecameTrue => self.announce(event).await,
            Transition::BecameFalse => self.retract(event).await,
        }
    }

    async fn announce(&mut self, event: &EdgeEvent) -> DispatchReport {
        let mut report = DispatchReport::new(event);
        let facet = event.facet();
        if !self.facet_alerts_enabled(facet) {
            debug!(key = %event.key, "Alerts for this facet are disabled");
            return report;
        }

        let product = self.product_for(&event.key.subject);
        let store_name = self.catalog.store_name(&event.key.store).to_string();
        let quantity = event.quantity();

        if let Some(chat) = self.chat_channel() {
            let payload =
                alert_payload(&chat.config, facet, &product, &store_name, quantity, Utc::now());
            let posted = chat.webhook.create(&payload).await;

            report.chat = Some(match posted {
                Ok(message_id) => {
                    report.registry = Some(
                        self.registry
                            .record(event.key.clone(), message_id.clone())
                            .await,
                    );
                    Ok(ChatDelivery::Posted { message_id })
                }
                Err(e) => Err(e),
            });
        }

        if let Some(sender) = self.email_channel() {
            let EmailContent { subject, body } = match facet {
                Facet::Availability => instock_email(&product, &store_name, quantity),
                Facet::OpenBox => open_box_email(&product, &store_name, quantity),
            };
            report.email = Some(sender.send(&subject, &body).await);
        }

        report
    }

    async fn retract(&mut self, event: &EdgeEvent) -> DispatchReport {
        let mut report = DispatchReport::new(event);
        if !self.toggles.retract_on_sellout {
            return report;
        }
        let Some(chat) = self.chat_channel() else {
            return report;
        };

        let Some(message_id) = self.registry.get(&event.key).map(str::to_owned) else {
            report.chat = Some(Ok(ChatDelivery::NothingToRetract));
            return report;
        };

        let deleted = chat.webhook.delete(&message_id).await;
        // The entry goes whatever the delete outcome.
        report.registry = Some(self.registry.remove(&event.key).await.map(|_| ()));
        report.chat = Some(deleted.map(ChatDelivery::Retracted));
        report
    }
}
