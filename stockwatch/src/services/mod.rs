//! Wiring from [`AppConfig`] to the long-running services.
//!
//! Both binaries share one HTTP client per process; every chat call goes
//! through it and its retry policy.

use std::sync::Arc;

use tracing::{info, warn};

use crate::Result;
use crate::config::{AppConfig, Catalog};
use crate::live::{StatusBoard, StatusHeader, SummaryBoard};
use crate::monitor::{ChangeDetector, PageObservationSource, PollCycleOrchestrator};
use crate::notification::{
    ChatWebhook, DiscordWebhook, EmailSender, NotificationDispatcher, SmtpEmailChannel,
};
use crate::state::{AlertMessageRegistry, AlertStateStore, RecordFile};
use crate::utils::RetryingHttpClient;
use crate::watchdog::WatchdogMonitor;

fn chat_webhook(config: &AppConfig) -> Result<Option<Arc<dyn ChatWebhook>>> {
    let Some(webhook) = &config.webhook else {
        return Ok(None);
    };
    let http = RetryingHttpClient::new(config.retry.clone(), config.http_timeout)?;
    Ok(Some(Arc::new(DiscordWebhook::new(http, webhook.url.clone()))))
}

fn email_sender(config: &AppConfig) -> Result<Option<Arc<dyn EmailSender>>> {
    match (&config.email, config.alerts.email) {
        (Some(email), true) => Ok(Some(Arc::new(SmtpEmailChannel::new(email)?))),
        _ => Ok(None),
    }
}

/// Build the poller. A bad catalog is fatal here.
pub async fn build_poller(config: &AppConfig) -> Result<PollCycleOrchestrator> {
    let catalog = Arc::new(Catalog::load(&config.catalog_path).await?);
    info!(
        products = catalog.products.len(),
        stores = catalog.stores.len(),
        path = %config.catalog_path.display(),
        "Loaded catalog"
    );

    let registry = AlertMessageRegistry::load(&config.paths.alert_registry).await;
    let mut dispatcher = NotificationDispatcher::new(catalog.clone(), config.alerts, registry);

    // The Discord switch covers the live messages as well as the alerts.
    let webhook = if config.alerts.discord {
        chat_webhook(config)?
    } else {
        if config.webhook.is_some() {
            info!("Discord alerts disabled, live messages will not be posted");
        }
        None
    };
    if let (Some(chat), Some(webhook_config)) = (&webhook, &config.webhook) {
        dispatcher = dispatcher.with_chat(chat.clone(), webhook_config.clone());
    }
    if let Some(sender) = email_sender(config)? {
        dispatcher = dispatcher.with_email(sender);
    }

    let source = Arc::new(PageObservationSource::new(config.http_timeout)?);
    let mut poller = PollCycleOrchestrator::new(
        catalog.clone(),
        source,
        ChangeDetector::new(config.facets()),
        AlertStateStore::new(&config.paths.alert_state),
        dispatcher,
        RecordFile::new(&config.paths.status),
        config.timezone,
        config.poll_interval,
    );

    if let (Some(chat), Some(webhook_config)) = (webhook, &config.webhook) {
        let header = StatusHeader::from_catalog(&config.store_label, &catalog);
        poller = poller
            .with_status(StatusBoard::new(
                chat.clone(),
                RecordFile::new(&config.paths.status),
                header,
                config.timezone,
            ))
            .with_summary(SummaryBoard::new(
                chat,
                RecordFile::new(&config.paths.summary),
                webhook_config.clone(),
            ));
    }

    Ok(poller)
}

/// Build the watchdog. The catalog only feeds the STOPPED header, so a
/// missing or broken one is not fatal.
pub async fn build_watchdog(config: &AppConfig) -> Result<WatchdogMonitor> {
    let mut watchdog = WatchdogMonitor::new(
        RecordFile::new(&config.paths.status),
        config.watchdog,
        config.timezone,
    );

    if let (Some(chat), Some(webhook_config)) = (chat_webhook(config)?, &config.webhook) {
        let catalog = match Catalog::load(&config.catalog_path).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Catalog unavailable, status counts will read zero");
                Catalog::default()
            }
        };
        let header = StatusHeader::from_catalog(&config.store_label, &catalog);
        let board = StatusBoard::new(
            chat,
            RecordFile::new(&config.paths.status),
            header,
            config.timezone,
        );
        watchdog = watchdog.with_status(board, webhook_config.stopped_mention());
    }

    if let Some(sender) = email_sender(config)? {
        watchdog = watchdog.with_email(sender);
    }

    Ok(watchdog)
}
