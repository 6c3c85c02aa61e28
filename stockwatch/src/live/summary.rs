//! The product summary embed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::handle::{ExternalMessageHandle, UpdateOutcome};
use crate::config::{Catalog, WebhookConfig};
use crate::domain::{Observation, TrackedKey};
use crate::notification::ChatWebhook;
use crate::state::RecordFile;

pub const SUMMARY_COLOR: u32 = 5793266;
const SUMMARY_TITLE: &str = "🧾 Product Summary";
/// Discord rejects embed descriptions longer than this.
const MAX_DESCRIPTION_CHARS: usize = 4096;

fn new_stock_part(obs: &Observation) -> String {
    match (obs.available, obs.quantity) {
        (false, _) => "OUT OF STOCK".to_string(),
        (true, Some(q)) => format!("{} NEW IN STOCK", q),
        (true, None) => "IN STOCK".to_string(),
    }
}

fn open_box_part(obs: &Observation) -> String {
    match (obs.open_box_available, obs.open_box_quantity) {
        (false, _) => "NO OPEN BOX".to_string(),
        (true, Some(q)) => format!("{} OPEN BOX IN STOCK", q),
        (true, None) => "OPEN BOX AVAILABLE".to_string(),
    }
}

/// One block per product: an indicator line, then one line per store.
///
/// `observations` is keyed by the availability key of each pair; missing pairs
/// render as out of stock.
pub fn render_summary_lines(
    catalog: &Catalog,
    observations: &BTreeMap<TrackedKey, Observation>,
    show_open_box: bool,
) -> Vec<String> {
    let mut lines = Vec::new();

    for product in &catalog.products {
        let observed = |store_id: &str| {
            observations
                .get(&TrackedKey::availability(&product.sku, store_id))
                .copied()
                .unwrap_or_default()
        };

        let any_in_stock = catalog.stores.iter().any(|s| observed(&s.id).available);
        let square = if any_in_stock { "🟩" } else { "🟥" };
        lines.push(format!("{} {}", square, product.markdown_link()));

        for store in &catalog.stores {
            let obs = observed(&store.id);
            if show_open_box {
                lines.push(format!(
                    "• {}: {} | {}",
                    store.name,
                    new_stock_part(&obs),
                    open_box_part(&obs)
                ));
            } else {
                lines.push(format!("• {}: {}", store.name, new_stock_part(&obs)));
            }
        }
        lines.push(String::new());
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn clamp_description(text: String) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text;
    }
    let mut clamped: String = text.chars().take(MAX_DESCRIPTION_CHARS - 1).collect();
    clamped.push('…');
    clamped
}

/// The summary slot.
pub struct SummaryBoard {
    handle: ExternalMessageHandle,
    config: WebhookConfig,
}

impl SummaryBoard {
    pub fn new(webhook: Arc<dyn ChatWebhook>, file: RecordFile, config: WebhookConfig) -> Self {
        let placeholder = json!({
            "content": "",
            "embeds": [{
                "title": SUMMARY_TITLE,
                "description": "🟨 Initializing summary...",
                "color": config.embed_color.unwrap_or(SUMMARY_COLOR),
                "footer": {"text": "Micro Center Stock Bot"},
            }],
            "allowed_mentions": {"parse": []},
            "username": config.username,
        });
        Self {
            handle: ExternalMessageHandle::new("summary", webhook, file, placeholder),
            config,
        }
    }

    pub fn handle(&self) -> &ExternalMessageHandle {
        &self.handle
    }

    pub fn payload(&self, lines: &[String], last_check_local: &str, at: DateTime<Utc>) -> Value {
        let description = lines.join("\n").trim().to_string();
        let description = if description.is_empty() {
            "No products are currently configured.".to_string()
        } else {
            clamp_description(description)
        };

        let mut payload = json!({
            "content": "",
            "embeds": [{
                "title": SUMMARY_TITLE,
                "description": description,
                "color": self.config.embed_color.unwrap_or(SUMMARY_COLOR),
                "footer": {"text": format!("Last check: {}", last_check_local)},
                "timestamp": at.to_rfc3339(),
            }],
            "allowed_mentions": {"parse": []},
            "username": self.config.username,
        });
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }
        payload
    }

    pub async fn update(
        &self,
        lines: &[String],
        last_check_local: &str,
        at: DateTime<Utc>,
    ) -> UpdateOutcome {
        let payload = self.payload(lines, last_check_local, at);
        self.handle.update(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::handle::tests::MemoryWebhook;
    use tempfile::TempDir;
    use url::Url;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{"products": [
                    {"sku": "P", "name": "Alpha", "url": "https://example.com/p"},
                    {"sku": "Q", "name": "Beta"}],
                "stores": [{"id": "S1", "name": "Tustin"}, {"id": "S2", "name": "Dallas"}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_with_open_box() {
        let observations = BTreeMap::from([
            (
                TrackedKey::availability("P", "S1"),
                Observation::in_stock(Some(3)).with_open_box(None),
            ),
            (TrackedKey::availability("P", "S2"), Observation::unavailable()),
        ]);

        let lines = render_summary_lines(&catalog(), &observations, true);
        assert_eq!(
            lines,
            vec![
                "🟩 [Alpha](https://example.com/p)",
                "• Tustin: 3 NEW IN STOCK | OPEN BOX AVAILABLE",
                "• Dallas: OUT OF STOCK | NO OPEN BOX",
                "",
                "🟥 Beta",
                "• Tustin: OUT OF STOCK | NO OPEN BOX",
                "• Dallas: OUT OF STOCK | NO OPEN BOX",
            ]
        );
    }

    #[test]
    fn test_render_without_open_box() {
        let observations = BTreeMap::from([(
            TrackedKey::availability("Q", "S2"),
            Observation::in_stock(None),
        )]);
        let lines = render_summary_lines(&catalog(), &observations, false);
        assert_eq!(lines[4], "🟩 Beta");
        assert_eq!(lines[6], "• Dallas: IN STOCK");
    }

    #[test]
    fn test_empty_catalog_payload() {
        let dir = TempDir::new().unwrap();
        let board = SummaryBoard::new(
            Arc::new(MemoryWebhook::default()),
            RecordFile::new(dir.path().join("summary.json")),
            WebhookConfig::new(Url::parse("https://example.com/hook").unwrap()),
        );
        let payload = board.payload(&[], "3:00:00 PM", Utc::now());
        let embed = &payload["embeds"][0];
        assert_eq!(embed["description"], "No products are currently configured.");
        assert_eq!(embed["footer"]["text"], "Last check: 3:00:00 PM");
        assert_eq!(embed["color"], SUMMARY_COLOR);
    }

    #[test]
    fn test_long_description_is_clamped() {
        let clamped = clamp_description("x".repeat(5000));
        assert_eq!(clamped.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(clamped.ends_with('…'));
    }

    #[tokio::test]
    async fn test_update_posts_embed() {
        let dir = TempDir::new().unwrap();
        let webhook = Arc::new(MemoryWebhook::default());
        let board = SummaryBoard::new(
            webhook.clone(),
            RecordFile::new(dir.path().join("summary.json")),
            WebhookConfig::new(Url::parse("https://example.com/hook").unwrap()),
        );

        let lines = vec!["🟥 Beta".to_string()];
        assert_eq!(
            board.update(&lines, "now", Utc::now()).await,
            UpdateOutcome::Edited
        );
        let posted = webhook.content("msg-1").unwrap();
        assert_eq!(posted["embeds"][0]["description"], "🟥 Beta");
    }
}
