// ===============================
// src/source.rs
// ===============================
//
// PriceSource adapters:
// - InvestingSource : scrapes the quote page over HTTP (session cookies,
//                     rotating User-Agent/Referer, per-call timeout)
// - MockSource      : per-symbol random walk for offline runs
//
// The quote page renders prices ru-locale formatted ("7 100,5"); text is
// normalized here so the rest of the system only ever sees plain decimals.
//
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ahash::AHashMap as HashMap;

use crate::domain::StockInfo;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("price extraction failed: {0}")]
    ParseFailure(String),
}

impl FetchError {
    /// Metrics label for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::ParseFailure(_) => "parse",
        }
    }
}

/// One successfully extracted sample: page display name + normalized price.
#[derive(Debug, Clone)]
pub struct Quote {
    pub name: String,
    pub price: f64,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, info: &StockInfo) -> Result<Quote, FetchError>;
}

// -----------------------------------------------------------------------------
// Scraping source
// -----------------------------------------------------------------------------

pub const INVESTING_ROOT: &str = "https://ru.investing.com";

const PRICE_MARKER: &str = "data-test=\"instrument-price-last\"";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:94.0) Gecko/20100101 Firefox/94.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15",
];

const REFERERS: &[&str] = &[
    "https://ru.investing.com/",
    "https://www.google.com/",
    "https://yandex.ru/",
];

pub struct InvestingSource {
    http: reqwest::Client,
}

impl InvestingSource {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .expect("http client build");
        Self { http }
    }

    /// One visit to the site root so the session cookies are in place before
    /// the first quote fetch. Failure is non-fatal.
    pub async fn prime(&self, root: &str) {
        match self.get_page(root).await {
            Ok(_) => info!(%root, "scraper session primed"),
            Err(e) => warn!(?e, %root, "priming visit failed, continuing without session"),
        }
    }

    async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        // pick headers before the first await, ThreadRng is not Send
        let (ua, referer) = {
            let mut rng = rand::thread_rng();
            (
                USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())],
                REFERERS[rng.gen_range(0..REFERERS.len())],
            )
        };
        debug!(%url, %ua, "visiting");

        let resp = self
            .http
            .get(url)
            .header("User-Agent", ua)
            .header("Referer", referer)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!("status {status}")));
        }
        resp.text().await.map_err(map_reqwest_err)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl PriceSource for InvestingSource {
    async fn fetch(&self, info: &StockInfo) -> Result<Quote, FetchError> {
        let body = self.get_page(info.url).await?;

        // Page <h1> is the instrument display name; fall back to the catalog name.
        let name = extract_marked_text(&body, "<h1")
            .unwrap_or_else(|| info.name.to_string());

        let raw = extract_marked_text(&body, PRICE_MARKER)
            .ok_or_else(|| FetchError::ParseFailure("price element not found".to_string()))?;
        let price = normalize_price(&raw)
            .ok_or_else(|| FetchError::ParseFailure(format!("bad price text: {raw}")))?;

        Ok(Quote { name, price })
    }
}

/// Text content of the first element whose opening tag contains `marker`.
fn extract_marked_text(html: &str, marker: &str) -> Option<String> {
    let at = html.find(marker)?;
    let rest = &html[at..];
    let open_end = rest.find('>')?;
    let after = &rest[open_end + 1..];
    let close = after.find('<')?;
    let text = after[..close].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// ru-locale numeric text -> f64.
/// Space/NBSP and dot are thousands separators, comma is the decimal mark.
fn normalize_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}' && *c != '.')
        .collect();
    let cleaned = cleaned.replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

// -----------------------------------------------------------------------------
// Mock source (random walk, same spirit as a mock feed: start at 100.00,
// small steps, floored at 50.00)
// -----------------------------------------------------------------------------

pub struct MockSource {
    last: Mutex<HashMap<String, f64>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self { last: Mutex::new(HashMap::new()) }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for MockSource {
    async fn fetch(&self, info: &StockInfo) -> Result<Quote, FetchError> {
        let step = { rand::thread_rng().gen_range(-30..=30) as f64 / 10.0 };
        let mut last = self.last.lock().await;
        let px = last.entry(info.ticker.to_string()).or_insert(100.0);
        *px = (*px + step).max(50.0);
        Ok(Quote { name: info.name.to_string(), price: *px })
    }
}
