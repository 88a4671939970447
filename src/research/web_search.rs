//! DuckDuckGo HTML-endpoint search client.
//!
//! Fetches the static SERP at `html.duckduckgo.com/html/` and parses result
//! containers with `scraper`. Result links are frequently wrapped in a
//! `/l/?uddg=...` redirect; those are decoded to the destination URL before
//! deduplication.

use crate::config::SearchConfig;
use crate::utils::compact_whitespace;
use anyhow::{Context, Result};
use reqwest::{redirect, Client};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One parsed search result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Client for the DuckDuckGo HTML search endpoint.
pub struct WebSearchClient {
    http: Client,
}

impl WebSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self { http })
    }

    /// Run a query and return up to `max_results` parsed hits.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let serp_url = build_serp_url(query);
        debug!(url = %serp_url, "Fetching search results");

        let response = self
            .http
            .get(&serp_url)
            .send()
            .await
            .context("Search request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Search request returned status {}", response.status());
        }

        let html = response
            .text()
            .await
            .context("Failed to read search response body")?;

        Ok(parse_serp_html(&html, max_results))
    }
}

/// Build the HTML-endpoint SERP URL for a query.
pub fn build_serp_url(query: &str) -> String {
    let trimmed = query.trim();
    let mut url = Url::parse("https://html.duckduckgo.com/html/").expect("static base url parses");
    if !trimmed.is_empty() {
        url.query_pairs_mut().append_pair("q", trimmed);
    }
    url.to_string()
}

fn absolutize_href(href: &str) -> String {
    let trimmed = href.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    if trimmed.starts_with("//") {
        return format!("https:{}", trimmed);
    }
    if trimmed.starts_with("/l/") {
        return format!("https://duckduckgo.com{}", trimmed);
    }
    trimmed.to_string()
}

fn decode_redirect(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !host.contains("duckduckgo.com") || !parsed.path().starts_with("/l/") {
        return None;
    }

    let uddg = parsed
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.to_string())?;
    let trimmed = uddg.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return None;
    }

    if let Ok(mut dest) = Url::parse(trimmed) {
        dest.set_fragment(None);
        return Some(dest.to_string());
    }
    Some(trimmed.to_string())
}

/// Resolve a raw result href to the destination URL, if it is one.
fn normalize_result_href(href: &str) -> Option<String> {
    let abs = absolutize_href(href);
    if abs.is_empty() {
        return None;
    }
    if let Some(decoded) = decode_redirect(&abs) {
        return Some(decoded);
    }
    if abs.starts_with("http://") || abs.starts_with("https://") {
        return Some(abs);
    }
    None
}

fn text_content(elem: ElementRef<'_>) -> String {
    compact_whitespace(&elem.text().collect::<Vec<_>>().join(" "))
}

/// Parse result containers out of a SERP page, deduplicated by URL.
pub fn parse_serp_html(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);

    let container_sel = match Selector::parse("div.result") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    let title_sel = Selector::parse("a.result__a").ok();
    let snippet_sel =
        Selector::parse("a.result__snippet, div.result__snippet, span.result__snippet").ok();

    let mut hits: Vec<SearchHit> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for container in document.select(&container_sel) {
        if hits.len() >= limit {
            break;
        }

        let anchor = title_sel
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .filter(|a| a.value().attr("href").is_some());
        let Some(anchor) = anchor else {
            continue;
        };

        let href = anchor.value().attr("href").unwrap_or("").trim();
        let Some(url) = normalize_result_href(href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = text_content(anchor);
        let snippet = snippet_sel
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .map(text_content)
            .unwrap_or_default();

        hits.push(SearchHit {
            title,
            url,
            snippet,
        });
    }

    hits
}
