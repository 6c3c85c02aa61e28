//! Whole poll cycles and watchdog ticks against in-memory collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;

use stockwatch::config::{AlertToggles, Catalog, Product, StatePaths, Store, WebhookConfig};
use stockwatch::domain::{Observation, TrackedKey};
use stockwatch::error::DeliveryError;
use stockwatch::live::{StatusBoard, StatusHeader, SummaryBoard, UpdateOutcome};
use stockwatch::monitor::{ChangeDetector, FacetToggles, ObservationSource, PollCycleOrchestrator};
use stockwatch::notification::{
    ChatDelivery, ChatWebhook, DeleteOutcome, EmailSender, NotificationDispatcher, Transition,
};
use stockwatch::state::{AlertMessageRegistry, AlertStateStore, RecordFile};
use stockwatch::utils::time::datetime_to_ts;
use stockwatch::watchdog::{TickOutcome, WatchdogMonitor};

/// Observations keyed by (sku, store id); anything unscripted is out of stock.
#[derive(Default)]
struct ScriptedSource {
    script: Mutex<HashMap<(String, String), Result<Observation, String>>>,
}

impl ScriptedSource {
    fn set(&self, sku: &str, store: &str, observation: Result<Observation, String>) {
        self.script
            .lock()
            .unwrap()
            .insert((sku.to_string(), store.to_string()), observation);
    }
}

#[async_trait]
impl ObservationSource for ScriptedSource {
    async fn observe(&self, product: &Product, store: &Store) -> stockwatch::Result<Observation> {
        let scripted = self
            .script
            .lock()
            .unwrap()
            .get(&(product.sku.clone(), store.id.clone()))
            .cloned();
        match scripted {
            Some(Ok(obs)) => Ok(obs),
            Some(Err(message)) => Err(stockwatch::Error::observation(
                &product.name,
                &store.name,
                message,
            )),
            None => Ok(Observation::unavailable()),
        }
    }
}

#[derive(Default)]
struct FakeChat {
    messages: Mutex<HashMap<String, Value>>,
    creates: Mutex<u32>,
    deletes: Mutex<Vec<String>>,
}

impl FakeChat {
    fn creates(&self) -> u32 {
        *self.creates.lock().unwrap()
    }

    fn message(&self, id: &str) -> Option<Value> {
        self.messages.lock().unwrap().get(id).cloned()
    }

    fn forget(&self, id: &str) {
        self.messages.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl ChatWebhook for FakeChat {
    async fn create(&self, payload: &Value) -> Result<String, DeliveryError> {
        let mut creates = self.creates.lock().unwrap();
        *creates += 1;
        let id = format!("{}", 1000 + *creates);
        self.messages
            .lock()
            .unwrap()
            .insert(id.clone(), payload.clone());
        Ok(id)
    }

    async fn edit(&self, id: &str, payload: &Value) -> Result<(), DeliveryError> {
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

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, DeliveryError> {
        self.deletes.lock().unwrap().push(id.to_string());
        Ok(match self.messages.lock().unwrap().remove(id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::AlreadyGone,
        })
    }
}

#[derive(Default)]
struct Outbox {
    subjects: Mutex<Vec<String>>,
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send(&self, subject: &str, _body: &str) -> Result<(), DeliveryError> {
        self.subjects.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_json(
            r#"{"products": [{"sku": "P", "name": "Alpha GPU", "url": "https://example.com/p"}],
                "stores": [{"id": "S1", "name": "Tustin"}, {"id": "S2", "name": "Dallas"}]}"#,
        )
        .unwrap(),
    )
}

fn webhook_config() -> WebhookConfig {
    WebhookConfig::new(Url::parse("https://discord.com/api/webhooks/1/token").unwrap())
}

struct Harness {
    _dir: TempDir,
    paths: StatePaths,
    source: Arc<ScriptedSource>,
    alerts: Arc<FakeChat>,
    boards: Arc<FakeChat>,
    outbox: Arc<Outbox>,
    poller: PollCycleOrchestrator,
}

async fn harness(toggles: AlertToggles, with_boards: bool) -> Harness {
    harness_in(TempDir::new().unwrap(), toggles, FacetToggles::default(), with_boards).await
}

/// A poller over the state already in `dir`, as after a restart.
async fn harness_in(
    dir: TempDir,
    toggles: AlertToggles,
    facets: FacetToggles,
    with_boards: bool,
) -> Harness {
    let paths = StatePaths::in_dir(dir.path());
    let catalog = catalog();
    let source = Arc::new(ScriptedSource::default());
    let alerts = Arc::new(FakeChat::default());
    let boards = Arc::new(FakeChat::default());
    let outbox = Arc::new(Outbox::default());

    let dispatcher = NotificationDispatcher::new(
        catalog.clone(),
        toggles,
        AlertMessageRegistry::load(&paths.alert_registry).await,
    )
    .with_chat(alerts.clone(), webhook_config())
    .with_email(outbox.clone());

    let mut poller = PollCycleOrchestrator::new(
        catalog.clone(),
        source.clone(),
        ChangeDetector::new(facets),
        AlertStateStore::new(&paths.alert_state),
        dispatcher,
        RecordFile::new(&paths.status),
        chrono_tz::UTC,
        std::time::Duration::from_secs(120),
    );

    if with_boards {
        poller = poller
            .with_status(StatusBoard::new(
                boards.clone(),
                RecordFile::new(&paths.status),
                StatusHeader::from_catalog("Multiple Stores", &catalog),
                chrono_tz::UTC,
            ))
            .with_summary(SummaryBoard::new(
                boards.clone(),
                RecordFile::new(&paths.summary),
                webhook_config(),
            ));
    }

    Harness {
        _dir: dir,
        paths,
        source,
        alerts,
        boards,
        outbox,
        poller,
    }
}

fn state_file(paths: &StatePaths) -> serde_json::Map<String, Value> {
    let raw = std::fs::read_to_string(&paths.alert_state).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn restock_fires_once_and_persists() {
    let mut h = harness(AlertToggles::default(), true).await;
    h.source.set("P", "S1", Ok(Observation::in_stock(Some(5))));

    let outcome = h.poller.run_cycle(Utc::now()).await;

    assert_eq!(outcome.observed, 2);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.state_saved);
    assert_eq!(outcome.reports.len(), 1);
    let report = &outcome.reports[0];
    assert_eq!(report.event.key, TrackedKey::availability("P", "S1"));
    assert_eq!(report.event.transition, Transition::BecameTrue);
    assert_eq!(report.event.quantity(), Some(5));
    assert!(matches!(report.chat, Some(Ok(ChatDelivery::Posted { .. }))));
    assert_eq!(h.alerts.creates(), 1);
    assert_eq!(
        h.outbox.subjects.lock().unwrap().as_slice(),
        ["🟢 IN STOCK at Micro Center: Alpha GPU".to_string()]
    );

    let state = state_file(&h.paths);
    assert_eq!(state.get("P_S1_availability"), Some(&Value::Bool(true)));
    assert_eq!(state.get("P_S2_availability"), Some(&Value::Bool(false)));
    assert_eq!(state.get("P_S1_open_box"), Some(&Value::Bool(false)));

    // Same observation again, and a quantity change: no new alert.
    h.poller.run_cycle(Utc::now()).await;
    h.source.set("P", "S1", Ok(Observation::in_stock(Some(2))));
    let outcome = h.poller.run_cycle(Utc::now()).await;
    assert!(outcome.reports.is_empty());
    assert_eq!(h.alerts.creates(), 1);

    let reloaded = AlertStateStore::new(&h.paths.alert_state).load().await;
    assert_eq!(reloaded.get(&TrackedKey::availability("P", "S1")), Some(&true));
}

#[tokio::test]
async fn sellout_retracts_recorded_alert() {
    let toggles = AlertToggles {
        retract_on_sellout: true,
        ..AlertToggles::default()
    };
    let mut h = harness(toggles, false).await;

    h.source.set("P", "S2", Ok(Observation::in_stock(None)));
    h.poller.run_cycle(Utc::now()).await;
    let key = TrackedKey::availability("P", "S2");
    let posted = h.poller.dispatcher().registry().get(&key).map(str::to_string);
    assert!(posted.is_some());

    h.source.set("P", "S2", Ok(Observation::unavailable()));
    let outcome = h.poller.run_cycle(Utc::now()).await;

    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.reports[0].event.transition, Transition::BecameFalse);
    assert_eq!(
        outcome.reports[0].chat,
        Some(Ok(ChatDelivery::Retracted(DeleteOutcome::Deleted)))
    );
    assert_eq!(h.alerts.deletes.lock().unwrap().clone(), vec![posted.unwrap()]);
    assert!(h.poller.dispatcher().registry().get(&key).is_none());

    let registry = AlertMessageRegistry::load(&h.paths.alert_registry).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn failed_observation_is_isolated_and_reported() {
    let mut h = harness(AlertToggles::default(), true).await;
    h.source.set("P", "S1", Err("connection reset".to_string()));
    h.source.set("P", "S2", Ok(Observation::in_stock(Some(1))));

    let outcome = h.poller.run_cycle(Utc::now()).await;

    assert_eq!(outcome.failed, 1);
    let last_error = outcome.last_error.unwrap();
    assert!(last_error.contains("connection reset"));
    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.reports[0].event.key, TrackedKey::availability("P", "S2"));
    assert_eq!(outcome.status, Some(UpdateOutcome::Edited));
    assert_eq!(outcome.summary, Some(UpdateOutcome::Edited));

    let record = RecordFile::new(&h.paths.status).load().await;
    let status = h.boards.message(record.message_id.as_deref().unwrap()).unwrap();
    let content = status["content"].as_str().unwrap();
    assert!(content.starts_with("🟩 Stock bot RUNNING"));
    assert!(content.contains(&format!("Last error: {}", last_error)));

    let summary_record = RecordFile::new(&h.paths.summary).load().await;
    let summary = h
        .boards
        .message(summary_record.message_id.as_deref().unwrap())
        .unwrap();
    let description = summary["embeds"][0]["description"].as_str().unwrap();
    assert!(description.contains("• Tustin: OUT OF STOCK"));
    assert!(description.contains("• Dallas: 1 NEW IN STOCK"));
}

#[tokio::test]
async fn deleted_status_message_is_recreated() {
    let mut h = harness(AlertToggles::default(), true).await;
    h.poller.run_cycle(Utc::now()).await;

    let first = RecordFile::new(&h.paths.status).load().await.message_id.unwrap();
    h.boards.forget(&first);

    let outcome = h.poller.run_cycle(Utc::now()).await;
    assert!(matches!(outcome.status, Some(UpdateOutcome::Recreated { .. })));

    let second = RecordFile::new(&h.paths.status).load().await.message_id.unwrap();
    assert_ne!(first, second);
    assert!(h.boards.message(&second).is_some());
}

#[tokio::test]
async fn watchdog_follows_poller_heartbeat() {
    let mut h = harness(AlertToggles::default(), false).await;
    let stale_after = std::time::Duration::from_secs(600);
    let watchdog = WatchdogMonitor::new(
        RecordFile::new(&h.paths.status),
        stockwatch::config::WatchdogConfig {
            interval: std::time::Duration::from_secs(60),
            stale_after,
        },
        chrono_tz::UTC,
    )
    .with_email(h.outbox.clone());

    let before = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(
        watchdog.tick_at(datetime_to_ts(before)).await.unwrap(),
        TickOutcome::StoppedNotified
    );

    h.poller.run_cycle(Utc::now()).await;
    let heartbeat = RecordFile::new(&h.paths.status)
        .load()
        .await
        .last_heartbeat_ts
        .unwrap();

    assert_eq!(
        watchdog.tick_at(heartbeat + 1.0).await.unwrap(),
        TickOutcome::Recovered
    );
    let later = heartbeat + (ChronoDuration::minutes(11).num_seconds() as f64);
    assert_eq!(
        watchdog.tick_at(later).await.unwrap(),
        TickOutcome::StoppedNotified
    );
    assert_eq!(
        watchdog.tick_at(later + 1.0).await.unwrap(),
        TickOutcome::AlreadyNotified
    );

    let stopped = h
        .outbox
        .subjects
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.contains("STOPPED"))
        .count();
    assert_eq!(stopped, 2);
}

#[tokio::test]
async fn disabled_open_box_is_purged_and_restarts_from_false() {
    let dir = TempDir::new().unwrap();
    let paths = StatePaths::in_dir(dir.path());
    std::fs::write(
        &paths.alert_state,
        r#"{"P_S1_availability": true, "P_S1_open_box": true,
            "P_S2_availability": false, "P_S2_open_box": false}"#,
    )
    .unwrap();
    let open_box_seen = Observation::in_stock(Some(3)).with_open_box(Some(1));

    let disabled = AlertToggles {
        open_box: false,
        ..AlertToggles::default()
    };
    let facets = FacetToggles {
        availability: true,
        open_box: false,
    };
    let mut h = harness_in(dir, disabled, facets, false).await;
    h.source.set("P", "S1", Ok(open_box_seen));

    let outcome = h.poller.run_cycle(Utc::now()).await;
    assert!(outcome.reports.is_empty());
    let state = state_file(&h.paths);
    assert_eq!(state.get("P_S1_availability"), Some(&Value::Bool(true)));
    assert!(state.keys().all(|k| !k.ends_with("_open_box")));

    // Re-enabled: the stale `true` is gone, so the open box shows up as new.
    let mut h = harness_in(h._dir, AlertToggles::default(), FacetToggles::default(), false).await;
    h.source.set("P", "S1", Ok(open_box_seen));

    let outcome = h.poller.run_cycle(Utc::now()).await;
    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.reports[0].event.key, TrackedKey::open_box("P", "S1"));
    assert_eq!(outcome.reports[0].event.transition, Transition::BecameTrue);
    assert_eq!(h.alerts.creates(), 1);
    assert_eq!(
        state_file(&h.paths).get("P_S1_open_box"),
        Some(&Value::Bool(true))
    );
}

#[tokio::test]
async fn deleted_summary_message_is_recreated() {
    let mut h = harness(AlertToggles::default(), true).await;
    h.source.set("P", "S1", Ok(Observation::in_stock(Some(4))));
    h.poller.run_cycle(Utc::now()).await;

    let first = RecordFile::new(&h.paths.summary).load().await.message_id.unwrap();
    h.boards.forget(&first);

    let outcome = h.poller.run_cycle(Utc::now()).await;
    assert!(matches!(outcome.summary, Some(UpdateOutcome::Recreated { .. })));
    assert_eq!(outcome.status, Some(UpdateOutcome::Edited));

    let second = RecordFile::new(&h.paths.summary).load().await.message_id.unwrap();
    assert_ne!(first, second);
    let summary = h.boards.message(&second).unwrap();
    let description = summary["embeds"][0]["description"].as_str().unwrap();
    assert!(description.contains("• Tustin: 4 NEW IN STOCK"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn watchdog_flag_survives_concurrent_heartbeats() {
    let h = harness(AlertToggles::default(), false).await;
    let poller_file = RecordFile::new(&h.paths.status);
    let watchdog_file = RecordFile::new(&h.paths.status);

    for round in 0..100u32 {
        let (beat, flag) = tokio::join!(
            tokio::spawn({
                let file = poller_file.clone();
                async move { file.update(|r| r.last_heartbeat_ts = Some(f64::from(round))).await }
            }),
            tokio::spawn({
                let file = watchdog_file.clone();
                async move { file.update(|r| r.stopped_notified_ts = Some(f64::from(round))).await }
            }),
        );
        beat.unwrap().unwrap();
        flag.unwrap().unwrap();

        let raw = std::fs::read_to_string(&h.paths.status).unwrap();
        serde_json::from_str::<Value>(&raw).unwrap();
    }

    let leftovers = std::fs::read_dir(h._dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
