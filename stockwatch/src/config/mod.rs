//! Startup configuration.
//!
//! Variables are read once into an immutable [`AppConfig`]; nothing else in
//! the crate touches the environment.

pub mod catalog;

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use url::Url;

use crate::domain::RetryPolicy;
use crate::monitor::FacetToggles;
use crate::utils::http_client::DEFAULT_REQUEST_TIMEOUT;
use crate::utils::url::parse_webhook_url;
use crate::{Error, Result};

pub use catalog::{Catalog, Product, Store};

pub const DEFAULT_TIMEZONE: &str = "America/Chicago";
pub const DEFAULT_USERNAME: &str = "StockSmart Bot";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Who the STOPPED status message pings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mention {
    Role(String),
    User(String),
}

/// Chat webhook settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: Url,
    pub username: String,
    pub avatar_url: Option<String>,
    /// Overrides the per-message default embed colors.
    pub embed_color: Option<u32>,
    pub role_id: Option<String>,
    pub user_id: Option<String>,
}

impl WebhookConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            username: DEFAULT_USERNAME.to_string(),
            avatar_url: None,
            embed_color: None,
            role_id: None,
            user_id: None,
        }
    }

    /// A role mention wins over a user mention.
    pub fn stopped_mention(&self) -> Option<Mention> {
        match (&self.role_id, &self.user_id) {
            (Some(role), _) => Some(Mention::Role(role.clone())),
            (None, Some(user)) => Some(Mention::User(user.clone())),
            (None, None) => None,
        }
    }
}

/// SMTP settings. Only present when sender, recipient and password are all set.
#[derive(Clone, PartialEq)]
pub struct EmailConfig {
    pub to: String,
    pub from: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("password", &"<redacted>")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

/// Which notifications go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertToggles {
    pub discord: bool,
    pub email: bool,
    pub new_stock: bool,
    pub open_box: bool,
    pub retract_on_sellout: bool,
}

impl Default for AlertToggles {
    fn default() -> Self {
        Self {
            discord: true,
            email: true,
            new_stock: true,
            open_box: true,
            retract_on_sellout: false,
        }
    }
}

/// Locations of every persisted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub alert_state: PathBuf,
    pub status: PathBuf,
    pub summary: PathBuf,
    pub alert_registry: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            alert_state: dir.join("stock_state.json"),
            status: dir.join("discord_status_state.json"),
            summary: dir.join("discord_live_summary_state.json"),
            alert_registry: dir.join("discord_instock_alerts.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub interval: Duration,
    pub stale_after: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            stale_after: Duration::from_secs(5400),
        }
    }
}

/// Everything both binaries need, resolved at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub webhook: Option<WebhookConfig>,
    pub email: Option<EmailConfig>,
    pub alerts: AlertToggles,
    pub open_box_tracking: bool,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub poll_interval: Duration,
    pub timezone: Tz,
    pub store_label: String,
    pub paths: StatePaths,
    pub catalog_path: PathBuf,
    pub log_dir: PathBuf,
    pub watchdog: WatchdogConfig,
}

impl AppConfig {
    /// Load `config.env` (overriding) and `.env`, then read the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::from_filename_override("config.env")
            && !e.not_found()
        {
            return Err(Error::config(format!("failed to read config.env: {}", e)));
        }
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let webhook = match vars.first(&["DISCORD_WEBHOOK_URL", "DISCORD_WEBHOOK"]) {
            Some(raw) => Some(WebhookConfig {
                url: parse_webhook_url(&raw)?,
                username: vars
                    .get("DISCORD_USERNAME")
                    .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
                avatar_url: vars.get("DISCORD_AVATAR_URL"),
                embed_color: vars.parse_opt("DISCORD_EMBED_COLOR")?,
                role_id: vars.get("DISCORD_ROLE_ID"),
                user_id: vars.get("DISCORD_USER_ID"),
            }),
            None => None,
        };

        let email = match (
            vars.first(&["ALERT_EMAIL_TO", "email"]),
            vars.first(&["ALERT_EMAIL_FROM", "email"]),
            vars.first(&["ALERT_EMAIL_PASSWORD", "password"])
                .map(|pw| clean_password(&pw))
                .filter(|pw| !pw.is_empty()),
        ) {
            (Some(to), Some(from), Some(password)) => Some(EmailConfig {
                to,
                from,
                password,
                smtp_host: vars
                    .get("SMTP_HOST")
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: vars.parse("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            }),
            _ => None,
        };

        let alerts = AlertToggles {
            discord: vars.flag("ENABLE_DISCORD_ALERTS", true),
            email: vars.flag("ENABLE_EMAIL_ALERTS", true),
            new_stock: vars.flag("ENABLE_NEW_STOCK_ALERTS", true),
            open_box: vars.flag("ENABLE_OPEN_BOX_ALERTS", true),
            retract_on_sellout: vars.flag("DELETE_DISCORD_ALERTS_ON_SELLOUT", false),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: vars.parse("HTTP_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay_ms: vars.parse("HTTP_INITIAL_BACKOFF_MS", defaults.initial_delay_ms)?,
            max_delay_ms: vars.parse("HTTP_MAX_BACKOFF_MS", defaults.max_delay_ms)?,
            backoff_multiplier: vars
                .parse("HTTP_BACKOFF_MULTIPLIER", defaults.backoff_multiplier)?,
            use_jitter: vars.flag("HTTP_RETRY_JITTER", defaults.use_jitter),
        };
        if retry.max_attempts == 0 {
            return Err(Error::config("HTTP_MAX_ATTEMPTS must be at least 1"));
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(Error::config("HTTP_BACKOFF_MULTIPLIER must be a number >= 1"));
        }

        let timezone_name = vars
            .get("TIMEZONE")
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = Tz::from_str(&timezone_name)
            .map_err(|e| Error::config(format!("invalid TIMEZONE '{}': {}", timezone_name, e)))?;

        let state_dir = PathBuf::from(vars.get("STATE_DIR").unwrap_or_else(|| ".".to_string()));
        let mut paths = StatePaths::in_dir(&state_dir);
        if let Some(status) = vars.get("DISCORD_STATUS_STATE") {
            paths.status = state_dir.join(status);
        }

        let config = Self {
            webhook,
            email,
            alerts,
            open_box_tracking: vars.flag("ENABLE_OPEN_BOX_TRACKING", true),
            retry,
            http_timeout: Duration::from_secs(
                vars.parse("HTTP_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT.as_secs())?,
            ),
            poll_interval: Duration::from_secs(vars.parse("POLL_SECONDS", 120u64)?),
            timezone,
            store_label: vars
                .get("STORE_LABEL")
                .unwrap_or_else(|| "Multiple Stores".to_string()),
            paths,
            catalog_path: PathBuf::from(
                vars.get("CATALOG_PATH")
                    .unwrap_or_else(|| "catalog.json".to_string()),
            ),
            log_dir: PathBuf::from(vars.get("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            watchdog: WatchdogConfig {
                interval: Duration::from_secs(vars.parse("WATCHDOG_INTERVAL_SECONDS", 1800u64)?),
                stale_after: Duration::from_secs(vars.parse("WATCHDOG_STALE_SECONDS", 5400u64)?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which the watchdog would fire on a healthy poller.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("POLL_SECONDS must be greater than zero"));
        }
        if self.watchdog.interval.is_zero() {
            return Err(Error::config(
                "WATCHDOG_INTERVAL_SECONDS must be greater than zero",
            ));
        }
        if self.watchdog.stale_after <= self.poll_interval {
            return Err(Error::config(format!(
                "WATCHDOG_STALE_SECONDS ({}s) must exceed POLL_SECONDS ({}s)",
                self.watchdog.stale_after.as_secs(),
                self.poll_interval.as_secs()
            )));
        }
        Ok(())
    }

    /// Non-fatal issues worth logging once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.watchdog.stale_after < self.poll_interval * 2 {
            warnings.push(format!(
                "WATCHDOG_STALE_SECONDS ({}s) is less than twice POLL_SECONDS ({}s); a slow cycle may look like an outage",
                self.watchdog.stale_after.as_secs(),
                self.poll_interval.as_secs()
            ));
        }
        let slowest_call = self.retry.max_total_delay() + self.http_timeout * self.retry.max_attempts;
        if self.watchdog.stale_after < self.poll_interval + slowest_call {
            warnings.push(format!(
                "WATCHDOG_STALE_SECONDS ({}s) does not cover POLL_SECONDS plus one fully retried webhook call ({}s); retries may look like an outage",
                self.watchdog.stale_after.as_secs(),
                (self.poll_interval + slowest_call).as_secs()
            ));
        }
        if self.webhook.is_none() {
            warnings.push("DISCORD_WEBHOOK_URL is not set; chat alerts and live messages are disabled".to_string());
        }
        if self.alerts.email && self.email.is_none() {
            warnings.push("Email alerts enabled but sender, recipient or password is missing".to_string());
        }
        warnings
    }

    /// Facets tracked by the change detector.
    ///
    /// Open-box state is only tracked when both tracking and its alerts are on.
    pub fn facets(&self) -> FacetToggles {
        FacetToggles {
            availability: true,
            open_box: self.open_box_tracking && self.alerts.open_box,
        }
    }

    pub fn timezone_name(&self) -> &'static str {
        self.timezone.name()
    }
}

/// Strip whitespace and one pair of matching surrounding quotes.
pub fn clean_password(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn first(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.get(name))
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(raw) => matches!(
                raw.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
            None => default,
        }
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse_opt(name)?.unwrap_or(default))
    }

    fn parse_opt<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("invalid {} '{}': {}", name, raw, e)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.webhook.is_none());
        assert!(config.email.is_none());
        assert_eq!(config.alerts, AlertToggles::default());
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert_eq!(config.watchdog, WatchdogConfig::default());
        assert_eq!(config.timezone_name(), "America/Chicago");
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        assert_eq!(config.paths.alert_state, PathBuf::from("./stock_state.json"));
        assert_eq!(config.facets(), FacetToggles { availability: true, open_box: true });
    }

    #[test]
    fn test_webhook_fallback_and_mentions() {
        let config = config_from(&[
            ("DISCORD_WEBHOOK", "https://discord.com/api/webhooks/1/abc"),
            ("DISCORD_ROLE_ID", "55"),
            ("DISCORD_USER_ID", "66"),
            ("DISCORD_EMBED_COLOR", "123"),
        ])
        .unwrap();
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.username, DEFAULT_USERNAME);
        assert_eq!(webhook.embed_color, Some(123));
        assert_eq!(webhook.stopped_mention(), Some(Mention::Role("55".to_string())));
    }

    #[test]
    fn test_user_mention_without_role() {
        let mut webhook = WebhookConfig::new(Url::parse("https://example.com/hook").unwrap());
        webhook.user_id = Some("66".to_string());
        assert_eq!(webhook.stopped_mention(), Some(Mention::User("66".to_string())));
    }

    #[test]
    fn test_flags() {
        let config = config_from(&[
            ("ENABLE_DISCORD_ALERTS", "off"),
            ("ENABLE_EMAIL_ALERTS", "Yes"),
            ("DELETE_DISCORD_ALERTS_ON_SELLOUT", "1"),
            ("ENABLE_OPEN_BOX_ALERTS", "no"),
            ("ENABLE_NEW_STOCK_ALERTS", "  "),
        ])
        .unwrap();
        assert!(!config.alerts.discord);
        assert!(config.alerts.email);
        assert!(config.alerts.retract_on_sellout);
        assert!(config.alerts.new_stock);
        assert!(!config.facets().open_box);
    }

    #[test]
    fn test_email_requires_all_parts() {
        let config = config_from(&[("email", "me@example.com")]).unwrap();
        assert!(config.email.is_none());

        let config = config_from(&[
            ("email", "me@example.com"),
            ("password", "'app pass'"),
        ])
        .unwrap();
        let email = config.email.unwrap();
        assert_eq!(email.to, "me@example.com");
        assert_eq!(email.from, "me@example.com");
        assert_eq!(email.password, "app pass");
        assert_eq!(email.smtp_port, 587);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(matches!(
            config_from(&[("POLL_SECONDS", "soon")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config_from(&[("TIMEZONE", "Mars/Olympus")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config_from(&[("DISCORD_WEBHOOK_URL", "not a url")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_stale_threshold_must_exceed_poll_interval() {
        assert!(matches!(
            config_from(&[("POLL_SECONDS", "600"), ("WATCHDOG_STALE_SECONDS", "600")]),
            Err(Error::Configuration(_))
        ));

        let config =
            config_from(&[("POLL_SECONDS", "600"), ("WATCHDOG_STALE_SECONDS", "900")]).unwrap();
        assert!(
            config
                .warnings()
                .iter()
                .any(|w| w.contains("less than twice"))
        );
    }

    #[test]
    fn test_retry_tuning() {
        let config = config_from(&[
            ("HTTP_BACKOFF_MULTIPLIER", "1.5"),
            ("HTTP_RETRY_JITTER", "on"),
        ])
        .unwrap();
        assert_eq!(config.retry.backoff_multiplier, 1.5);
        assert!(config.retry.use_jitter);

        for bad in ["0.5", "NaN", "fast"] {
            assert!(matches!(
                config_from(&[("HTTP_BACKOFF_MULTIPLIER", bad)]),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_warns_when_retries_outlast_stale_window() {
        let quick = config_from(&[]).unwrap();
        assert!(!quick.warnings().iter().any(|w| w.contains("fully retried")));

        // Nine waits of up to ten minutes each outlast the 90 minute window.
        let slow = config_from(&[
            ("HTTP_MAX_ATTEMPTS", "10"),
            ("HTTP_MAX_BACKOFF_MS", "600000"),
        ])
        .unwrap();
        assert!(slow.warnings().iter().any(|w| w.contains("fully retried")));
    }

    #[test]
    fn test_status_path_override() {
        let config = config_from(&[
            ("STATE_DIR", "/var/lib/stockwatch"),
            ("DISCORD_STATUS_STATE", "status.json"),
        ])
        .unwrap();
        assert_eq!(config.paths.status, PathBuf::from("/var/lib/stockwatch/status.json"));
        assert_eq!(
            config.paths.summary,
            PathBuf::from("/var/lib/stockwatch/discord_live_summary_state.json")
        );
    }

    #[test]
    fn test_clean_password() {
        assert_eq!(clean_password(" \"secret\" "), "secret");
        assert_eq!(clean_password("'x y'"), "x y");
        assert_eq!(clean_password("\"unbalanced"), "\"unbalanced");
        assert_eq!(clean_password("plain"), "plain");
    }
}
