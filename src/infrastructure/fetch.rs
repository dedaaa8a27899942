//! Listing fetcher - walks category pages, collects product links, and
//! hands fully materialized text payloads to the parsing core.
//!
//! All rate limiting (randomized inter-request delays, bounded retries with
//! backoff) lives here; nothing downstream performs I/O.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::domain::model::RawListing;
use crate::shared::config::{CategoryPageCfg, SourceCfg};
use crate::shared::errors::FetchError;
use crate::shared::types::Metal;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const TITLE_SELECTORS: &[&str] = &[
    "h1.entry-title",
    "h1.product_title",
    "div.product-title h1",
    "h1.product-name",
    "h1",
    "title",
];

/// Path fragments that are never product pages.
const SKIP_PATH_SEGMENTS: &[&str] = &["/category/", "/tag/", "/author/", "/blog/", "/page/"];

/// Source of raw listings. The production implementation scrapes the dealer
/// site; tests substitute canned payloads.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listings(&self, metal: Metal) -> Result<Vec<RawListing>, FetchError>;
}

pub struct ListingFetcher {
    client: Client,
    cfg: SourceCfg,
}

impl ListingFetcher {
    pub fn new(cfg: SourceCfg) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self { client, cfg })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        for attempt in 1..=self.cfg.retry_attempts {
            tokio::time::sleep(self.random_delay()).await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    // Client errors other than 429 will not improve on retry.
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        warn!(%url, %status, "client error, not retrying");
                        break;
                    }
                    warn!(%url, %status, attempt, "retryable status");
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "request failed");
                }
            }

            if attempt < self.cfg.retry_attempts {
                tokio::time::sleep(backoff_delay(self.cfg.retry_backoff, attempt)).await;
            }
        }
        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.cfg.retry_attempts,
        })
    }

    fn random_delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.cfg.delay_min_ms..=self.cfg.delay_max_ms);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl ListingSource for ListingFetcher {
    async fn fetch_listings(&self, metal: Metal) -> Result<Vec<RawListing>, FetchError> {
        let mut listings = Vec::new();

        for category in self.cfg.categories.iter().filter(|c| c.metal == metal) {
            let category_url = absolute_url(&self.cfg.base_url, &category.path);
            info!(url = %category_url, "scanning category page");

            let body = match self.fetch_page(&category_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %category_url, error = %e, "skipping category");
                    continue;
                }
            };

            let links = product_links(&body, &self.cfg.base_url);
            info!(url = %category_url, count = links.len(), "found product links");

            for link in links {
                match self.fetch_page(&link).await {
                    Ok(page) => {
                        listings.push(extract_listing(&page, &link, metal, category));
                    }
                    Err(e) => {
                        warn!(url = %link, error = %e, "failed to fetch product page");
                    }
                }
            }
        }

        if listings.is_empty() {
            return Err(FetchError::NoListings(self.cfg.base_url.clone()));
        }
        Ok(listings)
    }
}

fn backoff_delay(backoff: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(backoff.powi(attempt as i32).max(0.0))
}

/// Collect candidate product links from a category page, deduplicated and
/// sorted so the scrape order is stable.
fn product_links(body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut links = BTreeSet::new();
    for a in document.select(&anchors) {
        if let Some(href) = a.value().attr("href") {
            if is_product_href(href) {
                links.insert(absolute_url(base_url, href));
            }
        }
    }
    links.into_iter().collect()
}

fn is_product_href(href: &str) -> bool {
    if href.is_empty() || href == "#" || href.starts_with("javascript:") || href.starts_with("mailto:")
    {
        return false;
    }
    let lower = href.to_lowercase();
    if SKIP_PATH_SEGMENTS.iter().any(|seg| lower.contains(seg)) {
        return false;
    }
    if lower.contains("page/") || lower.contains("paged=") {
        return false;
    }
    // Category pages list products under /product or metal-specific slugs.
    lower.contains("/product")
        || lower.contains("kyulche")
        || lower.contains("moneta")
        || lower.contains("zlat")
        || lower.contains("srebar")
}

/// Materialize one product page: title via the first matching selector,
/// full text for the parser, the category page's hint attached.
fn extract_listing(body: &str, url: &str, metal: Metal, category: &CategoryPageCfg) -> RawListing {
    let document = Html::parse_document(body);

    let mut title = String::new();
    for selector in TITLE_SELECTORS {
        let sel = Selector::parse(selector).expect("static selector");
        if let Some(element) = document.select(&sel).next() {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                title = text;
                break;
            }
        }
    }

    let page_text: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join("\n");

    RawListing {
        url: url.to_string(),
        title,
        page_text,
        metal,
        category_hint: category.hint,
    }
}

fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(stripped) = href.strip_prefix('/') {
        format!("{}/{}", base.trim_end_matches('/'), stripped)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}
