//! Where observations come from.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{COOKIE, HeaderValue};
use tracing::debug;

use crate::config::{Product, Store};
use crate::domain::Observation;
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

/// Produces one [`Observation`] per (product, store) check.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self, product: &Product, store: &Store) -> Result<Observation>;
}

const IN_STOCK_MARKERS: [&str; 4] = [
    "'inStock':'True'",
    "\"inStock\":\"True\"",
    "\"inStock\":true",
    "\"inStock\": true",
];

/// Cap shown on the page as `25+`.
const MAX_REPORTED_QUANTITY: u32 = 25;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style.*?>.*?</style>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static NEW_QTY_HTML_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(\d+)\s*\+?\s*(?:<[^>]+>\s*)*NEW\s*(?:<[^>]+>\s*)*IN\s*(?:<[^>]+>\s*)*STOCK",
    )
    .unwrap()
});
static NEW_QTY_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*\+?\s*NEW\s+IN\s+STOCK\b").unwrap());
static OPEN_BOX_OFFER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bOpen\s*Box\b.{0,80}\bfrom\b").unwrap());
static OPEN_BOX_QTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+Open\s*Box\b").unwrap());

/// Visible text of an HTML page: scripts, styles and tags removed, whitespace collapsed.
fn page_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = STYLE_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = text.replace("&nbsp;", " ").replace("&amp;", "&");
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn first_number(re: &Regex, haystack: &str) -> Option<u32> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|q| q.min(MAX_REPORTED_QUANTITY))
}

/// Extract availability from a product page.
///
/// Open-box availability needs a visible offer line (`Open Box ... from`) so
/// hidden template text does not count. It is independent of new stock.
pub fn parse_product_page(html: &str) -> Observation {
    let available = IN_STOCK_MARKERS.iter().any(|m| html.contains(m));
    let text = page_text(html);

    let quantity = if available {
        first_number(&NEW_QTY_HTML_RE, html).or_else(|| first_number(&NEW_QTY_TEXT_RE, &text))
    } else {
        None
    };

    let open_box_available = OPEN_BOX_OFFER_RE.is_match(&text);
    let open_box_quantity = if open_box_available {
        first_number(&OPEN_BOX_QTY_RE, &text)
    } else {
        None
    };

    Observation {
        available,
        quantity,
        open_box_available,
        open_box_quantity,
    }
}

/// Fetches product pages with the store selected through the `storeSelected` cookie.
pub struct PageObservationSource {
    client: reqwest::Client,
}

impl PageObservationSource {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        install_rustls_provider();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("stockwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build page client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ObservationSource for PageObservationSource {
    async fn observe(&self, product: &Product, store: &Store) -> Result<Observation> {
        let fail = |message: String| Error::observation(&product.name, &store.name, message);

        let url = product.url.trim();
        if url.is_empty() {
            return Err(fail("product url is missing".to_string()));
        }

        let cookie = HeaderValue::from_str(&format!("storeSelected={}", store.id))
            .map_err(|e| fail(format!("invalid store id: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header(COOKIE, cookie)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }

        let html = response.text().await.map_err(|e| fail(e.to_string()))?;
        let observation = parse_product_page(&html);
        debug!(
            sku = %product.sku,
            store = %store.id,
            available = observation.available,
            open_box = observation.open_box_available,
            "Observed product page"
        );
        Ok(observation)
    }
}
