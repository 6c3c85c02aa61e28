//! Webhook URL helpers.

use url::Url;

use crate::{Error, Result};

/// Parse and sanity-check a webhook URL: absolute http(s) with a host.
pub fn parse_webhook_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::config(format!("invalid webhook URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::config(format!(
            "webhook URL must be absolute http(s): {}",
            url
        )));
    }
    Ok(url)
}

/// Same URL with `wait=true` set, so the webhook replies with the created message.
///
/// Existing query parameters are kept; an existing `wait` is overridden.
pub fn with_wait_true(webhook: &Url) -> Url {
    let retained: Vec<(String, String)> = webhook
        .query_pairs()
        .filter(|(k, _)| k != "wait")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = webhook.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &retained {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("wait", "true");
    }
    url
}

/// `{webhook}/messages/{id}`, keeping any query string (e.g. `thread_id`).
pub fn message_url(webhook: &Url, message_id: &str) -> Url {
    let mut url = webhook.clone();
    let path = format!("{}/messages/{}", webhook.path().trim_end_matches('/'), message_id);
    url.set_path(&path);
    url
}
