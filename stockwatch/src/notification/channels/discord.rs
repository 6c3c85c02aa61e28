//! Discord webhook channel.
//!
//! Messages are created with `?wait=true` so Discord replies with the message
//! object, then edited or deleted through `{webhook}/messages/{id}`. Every
//! call goes through the shared [`RetryingHttpClient`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{ChatWebhook, DeleteOutcome};
use crate::config::{Mention, Product, WebhookConfig};
use crate::domain::Facet;
use crate::error::DeliveryError;
use crate::utils::http_client::RetryingHttpClient;
use crate::utils::url::{message_url, with_wait_true};

/// Default embed color for stock alerts.
pub const ALERT_COLOR: u32 = 3066993;
const ALERT_FOOTER: &str = "Micro Center Stock Bot";

/// Discord webhook client.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    http: RetryingHttpClient,
    url: Url,
}

impl DiscordWebhook {
    pub fn new(http: RetryingHttpClient, url: Url) -> Self {
        Self { http, url }
    }

    fn message_id_from(body: &Value) -> Option<String> {
        match body.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl ChatWebhook for DiscordWebhook {
    async fn create(&self, payload: &Value) -> Result<String, DeliveryError> {
        let response = self
            .http
            .execute(Method::POST, &with_wait_true(&self.url), Some(payload))
            .await?;

        if !response.is_success() {
            return Err(self.http.classify(&response));
        }

        let body: Value = response.json()?;
        let id = Self::message_id_from(&body).ok_or_else(|| {
            DeliveryError::MalformedResponse(format!(
                "webhook reply has no message id (HTTP {})",
                response.status
            ))
        })?;

        debug!(message_id = %id, "Created Discord message");
        Ok(id)
    }

    async fn edit(&self, message_id: &str, payload: &Value) -> Result<(), DeliveryError> {
        let response = self
            .http
            .execute(
                Method::PATCH,
                &message_url(&self.url, message_id),
                Some(payload),
            )
            .await?;

        match response.status {
            404 => Err(DeliveryError::MessageGone {
                message_id: message_id.to_string(),
            }),
            _ if response.is_success() => Ok(()),
            _ => Err(self.http.classify(&response)),
        }
    }

    async fn delete(&self, message_id: &str) -> Result<DeleteOutcome, DeliveryError> {
        let response = self
            .http
            .execute(Method::DELETE, &message_url(&self.url, message_id), None)
            .await?;

        match response.status {
            404 => Ok(DeleteOutcome::AlreadyGone),
            _ if response.is_success() => Ok(DeleteOutcome::Deleted),
            _ => Err(self.http.classify(&response)),
        }
    }
}

/// `<@&role>` when a role is configured, empty otherwise.
pub fn ping_content(role_id: Option<&str>) -> String {
    role_id
        .map(|role| format!("<@&{}>", role))
        .unwrap_or_default()
}

/// `allowed_mentions` that only permits the given mention.
pub fn allowed_mentions(mention: Option<&Mention>) -> Value {
    match mention {
        Some(Mention::Role(role)) => json!({"parse": [], "roles": [role]}),
        Some(Mention::User(user)) => json!({"parse": [], "users": [user]}),
        None => json!({"parse": []}),
    }
}

fn quantity_line(facet: Facet, quantity: Option<u32>) -> String {
    match (facet, quantity) {
        (Facet::Availability, Some(q)) => format!("📦 In stock at this store: {} NEW IN STOCK", q),
        (Facet::Availability, None) => "📦 In stock at this store: IN STOCK".to_string(),
        (Facet::OpenBox, Some(q)) => format!("📦 Open box at this store: {} OPEN BOX IN STOCK", q),
        (Facet::OpenBox, None) => "📦 Open box at this store: OPEN BOX AVAILABLE".to_string(),
    }
}

/// Embed payload announcing that `facet` became available.
pub fn alert_payload(
    config: &WebhookConfig,
    facet: Facet,
    product: &Product,
    store_name: &str,
    quantity: Option<u32>,
    at: DateTime<Utc>,
) -> Value {
    let title = match facet {
        Facet::Availability => "🔥🟢 IN STOCK",
        Facet::OpenBox => "🟡 OPEN BOX AVAILABLE",
    };

    let spec_text = if product.specs.is_empty() {
        "Specs not available".to_string()
    } else {
        product
            .specs
            .iter()
            .map(|(k, v)| format!("**{}**: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let url = product.url.trim();
    let mut description = format!(
        "**{}**\n\n{}\n\n{}",
        product.name,
        spec_text,
        quantity_line(facet, quantity)
    );
    if !url.is_empty() {
        description.push_str(&format!("\n\n🔗 Product page: {}", url));
    }

    let mut embed = json!({
        "title": title,
        "description": description,
        "color": config.embed_color.unwrap_or(ALERT_COLOR),
        "footer": {"text": ALERT_FOOTER},
        "timestamp": at.to_rfc3339(),
        "fields": [
            {"name": "🏬 Store", "value": store_name, "inline": true},
            {"name": "🧾 SKU", "value": product.sku, "inline": true},
        ],
    });
    if !url.is_empty() {
        embed["url"] = json!(url);
    }

    let role = config.role_id.clone().map(Mention::Role);
    let mut payload = json!({
        "content": ping_content(config.role_id.as_deref()),
        "username": config.username,
        "embeds": [embed],
        "allowed_mentions": allowed_mentions(role.as_ref()),
    });
    if let Some(avatar_url) = &config.avatar_url {
        payload["avatar_url"] = json!(avatar_url);
    }
    payload
}
