//! Fetch-and-summarize collaborator.
//!
//! For one search hit: pull the page, build a summarization prompt from the
//! extracted text (or just the snippet when the fetch fails), ask the model,
//! and account for the request in the session metrics. An LLM failure
//! propagates as the task's failure; a page-fetch failure only degrades the
//! prompt.

use crate::config::{LlmConfig, SearchConfig};
use crate::llm::ChatClient;
use crate::metrics::SessionMetrics;
use crate::research::page::PageFetcher;
use crate::research::web_search::SearchHit;
use crate::utils::estimate_tokens;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Summarized view of one retrieved page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub analysis_id: String,
}

/// Summarizes search hits through the chat-completion endpoint.
pub struct Summarizer {
    llm: ChatClient,
    pages: PageFetcher,
    metrics: Arc<SessionMetrics>,
    summary_max_tokens: u32,
}

impl Summarizer {
    pub fn new(
        search_config: &SearchConfig,
        llm_config: &LlmConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Result<Self> {
        let llm = ChatClient::new(llm_config).context("Failed to build chat client")?;
        let pages = PageFetcher::new(search_config)?;
        Ok(Self {
            llm,
            pages,
            metrics,
            summary_max_tokens: llm_config.summary_max_tokens,
        })
    }

    /// Summarize one hit. The returned record carries the hit's identity so
    /// callers can reconcile results without positional bookkeeping.
    pub async fn summarize(&self, hit: &SearchHit, analysis_id: &str) -> Result<PageSummary> {
        let started = Instant::now();

        let page_text = if hit.url.is_empty() {
            None
        } else {
            match self.pages.fetch_readable_text(&hit.url).await {
                Ok(text) => {
                    self.metrics.add_web_fetch(true);
                    Some(text)
                }
                Err(err) => {
                    debug!(url = %hit.url, error = %err, "Page fetch failed, using snippet");
                    self.metrics.add_web_fetch(false);
                    None
                }
            }
        };

        let prompt = build_summary_prompt(hit, page_text.as_deref());
        let tokens_sent = estimate_tokens(&prompt);

        match self.llm.complete_prompt(&prompt, self.summary_max_tokens).await {
            Ok(summary) => {
                self.metrics.add_request(
                    true,
                    tokens_sent,
                    estimate_tokens(&summary),
                    started.elapsed(),
                );
                Ok(PageSummary {
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                    summary,
                    analysis_id: analysis_id.to_string(),
                })
            }
            Err(err) => {
                self.metrics
                    .add_request(false, tokens_sent, 0, started.elapsed());
                Err(err).with_context(|| format!("Error summarizing {}", hit.url))
            }
        }
    }
}

/// Build the summarization prompt; full-page and snippet-only variants.
fn build_summary_prompt(hit: &SearchHit, page_text: Option<&str>) -> String {
    match page_text {
        Some(text) => format!(
            "Summarize this web page concisely for search results. Focus on key information.\n\n\
             Title: {}\nURL: {}\nContent: {}",
            hit.title, hit.url, text
        ),
        None => format!(
            "Summarize this search result concisely.\n\n\
             Title: {}\nSnippet: {}\nURL: {}",
            hit.title, hit.snippet, hit.url
        ),
    }
}
