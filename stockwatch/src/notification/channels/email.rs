//! SMTP email channel.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::EmailSender;
use crate::config::{EmailConfig, Product};
use crate::error::DeliveryError;
use crate::{Error, Result};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━";

/// Subject and plain-text body of one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// STARTTLS SMTP sender authenticating as the `from` address.
pub struct SmtpEmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpEmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("invalid ALERT_EMAIL_FROM: {}", e)))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| Error::config(format!("invalid ALERT_EMAIL_TO: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::config(format!("SMTP relay error: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.from.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailChannel {
    async fn send(&self, subject: &str, body: &str) -> std::result::Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Transport(format!("failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {}", e)))?;

        debug!(subject, "Email sent");
        Ok(())
    }
}

fn spec_lines(product: &Product) -> Vec<String> {
    product
        .specs
        .iter()
        .map(|(k, v)| format!("• {}: {}", k, v))
        .collect()
}

fn stock_email(
    headline: &str,
    subject: String,
    status_line: String,
    product: &Product,
    store_name: &str,
) -> EmailContent {
    let mut lines = vec![
        headline.to_string(),
        String::new(),
        status_line,
        String::new(),
        "📋 Specs:".to_string(),
    ];
    lines.extend(spec_lines(product));
    lines.push(String::new());
    lines.push(format!("📍 Store: {}", store_name));
    if !product.url.trim().is_empty() {
        lines.push(format!("🔗 Open product page: {}", product.url.trim()));
    }
    lines.extend([
        String::new(),
        "⚡ Tip: Reserve or pickup can flip fast. Try immediately.".to_string(),
        String::new(),
        "— StockSmart Bot 🤖".to_string(),
    ]);

    EmailContent {
        subject,
        body: lines.join("\n"),
    }
}

/// New-stock alert.
pub fn instock_email(product: &Product, store_name: &str, quantity: Option<u32>) -> EmailContent {
    let qty = match quantity {
        Some(q) => format!("{} NEW IN STOCK", q),
        None => "IN STOCK".to_string(),
    };
    stock_email(
        "🟢 IN STOCK",
        format!("🟢 IN STOCK at Micro Center: {}", product.name),
        format!("{} is showing as {} 🟢", product.name, qty),
        product,
        store_name,
    )
}

/// Open-box alert.
pub fn open_box_email(product: &Product, store_name: &str, quantity: Option<u32>) -> EmailContent {
    let qty = match quantity {
        Some(q) => format!("{} OPEN BOX IN STOCK", q),
        None => "OPEN BOX AVAILABLE".to_string(),
    };
    stock_email(
        "🟡 OPEN BOX AVAILABLE",
        format!("🟡 OPEN BOX at Micro Center: {}", product.name),
        format!("{} is showing as {} 🟡", product.name, qty),
        product,
        store_name,
    )
}

/// Sent once per outage by the watchdog.
pub fn stopped_email(reason: &str, last_check: &str, timezone_name: &str) -> EmailContent {
    let body = format!(
        "🚨 StockSmart Bot Alert 🚨\n\n\
         {RULE}\n\
         ❌ STATUS: STOPPED\n\
         {RULE}\n\n\
         ⚠️ Reason:\n{reason}\n\n\
         🕒 Last Successful Check:\n{last_check}\n\n\
         🌎 Timezone:\n{timezone_name}\n\n\
         {RULE}\n\
         What this means:\n\
         • The stock checker is no longer sending heartbeats\n\
         • No new stock alerts will be detected until it restarts\n\n\
         This alert is sent once per outage.\n\
         You will be alerted again only if the bot recovers and stops again.\n\n\
         — StockSmart Monitor 🤖\n"
    );
    EmailContent {
        subject: "🚨 StockSmart Bot STOPPED".to_string(),
        body,
    }
}
