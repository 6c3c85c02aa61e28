//! Bounded-retry HTTP executor used for every webhook call.

use std::{sync::OnceLock, time::Duration};

use reqwest::{Method, header::HeaderMap};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::domain::RetryPolicy;
use crate::error::DeliveryError;
use crate::{Error, Result};

/// Statuses retried by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, DeliveryError> {
        serde_json::from_str(&self.body)
            .map_err(|e| DeliveryError::MalformedResponse(format!("invalid JSON body: {}", e)))
    }
}

/// HTTP client with exponential backoff and rate-limit awareness.
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    retry_statuses: Vec<u16>,
}

impl RetryingHttpClient {
    /// Build a client with the given retry policy and per-request timeout.
    pub fn new(policy: RetryPolicy, request_timeout: Duration) -> Result<Self> {
        install_rustls_provider();

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("stockwatch/", env!("CARGO_PKG_VERSION")));
        if request_timeout > Duration::ZERO {
            builder = builder.timeout(request_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, policy))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }

    /// Replace the set of statuses treated as transient.
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Turn a non-success response into the matching [`DeliveryError`].
    pub fn classify(&self, response: &HttpResponse) -> DeliveryError {
        DeliveryError::from_status(
            response.status,
            response.body.clone(),
            self.is_retryable(response.status),
        )
    }

    /// Send a request, retrying transport failures and transient statuses.
    ///
    /// Any response outside the transient set is returned as-is on the first
    /// attempt. When the attempts run out, the last response received is
    /// returned; `Transport` is only produced if nothing was ever received.
    pub async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<HttpResponse, DeliveryError> {
        let mut attempts: u32 = 0;
        let mut backoff_step: u32 = 0;
        let mut last_response: Option<HttpResponse> = None;
        let mut last_transport_error = String::new();

        loop {
            attempts += 1;

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let retry_after = match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers = response.headers().clone();
                    let body = match response.text().await {
                        Ok(text) => text,
                        Err(e) => {
                            debug!(error = %e, "Failed to read response body");
                            String::new()
                        }
                    };

                    let response = HttpResponse { status, body };
                    if !self.is_retryable(status) {
                        return Ok(response);
                    }

                    let retry_after = parse_retry_after(&headers, &response.body);
                    last_response = Some(response);
                    retry_after
                }
                Err(e) => {
                    last_transport_error = e.to_string();
                    None
                }
            };

            if !self.policy.should_retry(attempts) {
                break;
            }

            // Server-directed waits do not advance the exponential growth,
            // but are held to the same ceiling as computed backoffs.
            let delay = match retry_after {
                Some(delay) => delay.min(self.policy.max_delay()),
                None => {
                    let delay = self.policy.delay_for_attempt(backoff_step);
                    backoff_step += 1;
                    delay
                }
            };

            warn!(
                method = %method,
                url = %redact_url(url),
                attempt = attempts,
                max_attempts = self.policy.max_attempts,
                status = last_response.as_ref().map(|r| r.status),
                delay_ms = delay.as_millis() as u64,
                server_directed = retry_after.is_some(),
                "Webhook request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        match last_response {
            Some(response) => {
                warn!(
                    method = %method,
                    url = %redact_url(url),
                    status = response.status,
                    attempts,
                    "Webhook request still failing after retries"
                );
                Ok(response)
            }
            None => Err(DeliveryError::Transport(last_transport_error)),
        }
    }
}

/// Extract a server-provided retry delay.
///
/// Discord's JSON `retry_after` wins over the `Retry-After` and
/// `X-RateLimit-Reset-After` headers. Values are seconds, possibly fractional;
/// anything that does not fit a `Duration` is ignored.
pub fn parse_retry_after(headers: &HeaderMap, body: &str) -> Option<Duration> {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()));

    let from_headers = || {
        ["retry-after", "x-ratelimit-reset-after"]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| value.trim().parse::<f64>().ok())
    };

    from_body
        .or_else(from_headers)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Webhook URLs embed their token in the path; keep only scheme and host for logs.
fn redact_url(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or("unknown"))
}
