//! Page retrieval and readable-text extraction.
//!
//! Pulls the main content blocks out of an HTML page: prefer `article`,
//! fall back to `main`, then `body`, and collect `p`/`li` text. Non-HTML
//! responses are rejected so binary payloads never reach the summarizer.

use crate::config::SearchConfig;
use crate::utils::{compact_whitespace, truncate_chars};
use anyhow::{Context, Result};
use reqwest::{redirect, Client};
use scraper::{Html, Selector};
use std::time::Duration;

/// Fetches pages and extracts readable text within a character budget.
pub struct PageFetcher {
    http: Client,
    text_budget: usize,
}

impl PageFetcher {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build page HTTP client")?;
        Ok(Self {
            http,
            text_budget: config.page_text_budget,
        })
    }

    /// Fetch a page and return its extracted text, truncated to the budget.
    pub async fn fetch_readable_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Fetch of {url} returned status {}", response.status());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("text/html") {
            anyhow::bail!("Skipping non-HTML content type {content_type:?} at {url}");
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;

        let text = extract_readable_text(&html);
        if text.is_empty() {
            anyhow::bail!("No readable text extracted from {url}");
        }

        Ok(truncate_chars(&text, self.text_budget).to_string())
    }
}

/// Join the page's main content blocks into one blank-line-separated string.
pub fn extract_readable_text(html: &str) -> String {
    extract_text_blocks(html).join("\n\n")
}

fn extract_text_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    let root = ["article", "main", "body"].into_iter().find_map(|name| {
        let sel = Selector::parse(name).ok()?;
        document.select(&sel).next()
    });
    let Some(root) = root else {
        return Vec::new();
    };

    let Ok(block_sel) = Selector::parse("p, li") else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for elem in root.select(&block_sel) {
        let text = compact_whitespace(&elem.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            blocks.push(text);
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_article_over_body() {
        let html = r#"
        <html><body>
          <p>Navigation cruft paragraph.</p>
          <article>
            <p>First real paragraph.</p>
            <ul><li>A list item.</li></ul>
          </article>
        </body></html>
        "#;
        let text = extract_readable_text(html);
        assert!(text.contains("First real paragraph."));
        assert!(text.contains("A list item."));
        assert!(!text.contains("Navigation cruft"));
    }

    #[test]
    fn test_falls_back_to_body_blocks() {
        let html = "<html><body><p>Alpha.</p><p>  Beta \n gamma. </p></body></html>";
        assert_eq!(extract_readable_text(html), "Alpha.\n\nBeta gamma.");
    }

    #[test]
    fn test_empty_page_yields_empty_text() {
        assert_eq!(extract_readable_text("<html><body></body></html>"), "");
    }
}
