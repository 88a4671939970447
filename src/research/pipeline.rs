//! Search pipeline orchestration.
//!
//! Turns a query into enhanced results: web search, one summarization task
//! per hit through the batch engine, then positional reconciliation of hits
//! against the engine's tagged outcomes. Reconciliation guarantees one
//! output per input hit: a failed summarization backfills from the hit's
//! own snippet instead of dropping the entry or shifting later ones.

use crate::batch::{run_batches_tagged, task, BatchOptions, ProgressTracker, TaskFactory, TaskOutcome};
use crate::config::Config;
use crate::llm::{ChatClient, ChatMessage};
use crate::metrics::SessionMetrics;
use crate::research::summarizer::{PageSummary, Summarizer};
use crate::research::web_search::{SearchHit, WebSearchClient};
use crate::utils::format_duration;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// How many results feed the aggregated answer prompt.
const ANSWER_CONTEXT_RESULTS: usize = 10;

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful research assistant that provides \
    comprehensive, well-structured answers based on web search results. Always cite sources \
    and provide actionable insights.";

/// One reconciled result: original hit identity plus its summary.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedResult {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub analysis_id: String,
    pub analysis_passes: u32,
}

/// The search → summarize → reconcile pipeline.
pub struct ResearchPipeline {
    search: WebSearchClient,
    summarizer: Arc<Summarizer>,
    llm: ChatClient,
    metrics: Arc<SessionMetrics>,
    batch_options: BatchOptions,
    max_results: usize,
    drill_down_max_results: usize,
    answer_max_tokens: u32,
}

impl ResearchPipeline {
    pub fn new(config: &Config, metrics: Arc<SessionMetrics>) -> Result<Self> {
        let search = WebSearchClient::new(&config.search)?;
        let summarizer = Arc::new(Summarizer::new(
            &config.search,
            &config.llm,
            metrics.clone(),
        )?);
        let llm = ChatClient::new(&config.llm).context("Failed to build chat client")?;

        Ok(Self {
            search,
            summarizer,
            llm,
            metrics,
            batch_options: config.engine.batch_options(),
            max_results: config.search.max_results,
            drill_down_max_results: config.search.drill_down_max_results,
            answer_max_tokens: config.llm.answer_max_tokens,
        })
    }

    /// Run one query end to end. `drill_down` requests the deeper result
    /// count; `tracker` receives per-task progress while summaries resolve.
    pub async fn run(
        &self,
        query: &str,
        drill_down: bool,
        tracker: Option<&ProgressTracker>,
    ) -> Result<Vec<EnhancedResult>> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Empty query");
        }

        let max_results = if drill_down {
            self.drill_down_max_results
        } else {
            self.max_results
        };

        let search_started = Instant::now();
        let hits = self
            .search
            .search(query, max_results)
            .await
            .context("Web search failed")?;
        let search_time = search_started.elapsed();
        self.metrics.add_search(query, hits.len(), search_time);

        if hits.is_empty() {
            warn!(query, "No web results found");
            return Ok(Vec::new());
        }

        info!(
            query,
            hits = hits.len(),
            search_time = %format_duration(search_time),
            "Summarizing search results"
        );

        let factories: Vec<TaskFactory<PageSummary>> = hits
            .iter()
            .enumerate()
            .map(|(idx, hit)| {
                let summarizer = Arc::clone(&self.summarizer);
                let hit = hit.clone();
                task(move || async move {
                    summarizer.summarize(&hit, &format!("summary_{idx}")).await
                })
            })
            .collect();

        let outcomes = run_batches_tagged(factories, &self.batch_options, tracker, None).await;

        Ok(reconcile(&hits, outcomes))
    }

    /// Aggregate enhanced results into a single answer. A model failure
    /// degrades to a descriptive error string rather than aborting the run.
    pub async fn answer(&self, query: &str, results: &[EnhancedResult]) -> String {
        let prompt = build_answer_prompt(query, results);
        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        match self.llm.complete(&messages, self.answer_max_tokens).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "Answer aggregation failed");
                format!("Error calling model: {err}")
            }
        }
    }
}

/// Zip hits against tagged outcomes by position.
///
/// The tagged outcomes are full-length and position-stable, so slot `i`
/// always describes `hits[i]`. Output length always equals input length;
/// failed or undispatched slots fall back to the hit's snippet.
fn reconcile(hits: &[SearchHit], outcomes: Vec<TaskOutcome<PageSummary>>) -> Vec<EnhancedResult> {
    let mut outcomes = outcomes.into_iter();
    let mut results = Vec::with_capacity(hits.len());

    for (i, hit) in hits.iter().enumerate() {
        let result = match outcomes.next() {
            Some(TaskOutcome::Success(summary)) => EnhancedResult {
                index: i + 1,
                title: pick_non_empty(&summary.title, &hit.title),
                url: pick_non_empty(&summary.url, &hit.url),
                summary: effective_summary(&summary.summary, &hit.snippet),
                analysis_id: summary.analysis_id,
                analysis_passes: 1,
            },
            Some(TaskOutcome::Failure(err)) => EnhancedResult {
                index: i + 1,
                title: hit.title.clone(),
                url: hit.url.clone(),
                summary: fallback_summary(&hit.snippet, Some(&err)),
                analysis_id: format!("summary_{i}"),
                analysis_passes: 1,
            },
            // The engine was bounded below the hit count; keep the slot.
            None => EnhancedResult {
                index: i + 1,
                title: hit.title.clone(),
                url: hit.url.clone(),
                summary: fallback_summary(&hit.snippet, None),
                analysis_id: format!("summary_{i}"),
                analysis_passes: 0,
            },
        };
        results.push(result);
    }

    results
}

fn pick_non_empty(preferred: &str, fallback: &str) -> String {
    if preferred.trim().is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}

/// A summary that came back empty or as a refusal placeholder is junk;
/// show the snippet instead.
fn effective_summary(summary: &str, snippet: &str) -> String {
    let trimmed = summary.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("no response generated") {
        return fallback_summary(snippet, None);
    }
    summary.to_string()
}

fn fallback_summary(snippet: &str, err: Option<&anyhow::Error>) -> String {
    if !snippet.trim().is_empty() {
        return snippet.to_string();
    }
    match err {
        Some(err) => format!("Error summarizing: {err:#}"),
        None => "No summary available".to_string(),
    }
}

fn build_answer_prompt(query: &str, results: &[EnhancedResult]) -> String {
    let mut context = format!(
        "Based on the following research results for the query \"{query}\", \
         provide a comprehensive answer:\n\n"
    );

    for result in results.iter().take(ANSWER_CONTEXT_RESULTS) {
        context.push_str(&format!(
            "{}. {}\n   URL: {}\n   Summary: {}\n\n",
            result.index, result.title, result.url, result.summary
        ));
    }

    context.push_str("Please provide a comprehensive answer based on this research.");
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn hits(n: usize) -> Vec<SearchHit> {
        (0..n)
            .map(|i| SearchHit {
                title: format!("Title {i}"),
                url: format!("https://example.com/{i}"),
                snippet: format!("Snippet {i}"),
            })
            .collect()
    }

    fn summary_outcome(i: usize) -> TaskOutcome<PageSummary> {
        TaskOutcome::Success(PageSummary {
            title: format!("Title {i}"),
            url: format!("https://example.com/{i}"),
            summary: format!("Summary {i}"),
            analysis_id: format!("summary_{i}"),
        })
    }

    #[test]
    fn test_reconcile_preserves_length_and_order() {
        let hits = hits(3);
        let outcomes = vec![summary_outcome(0), summary_outcome(1), summary_outcome(2)];
        let results = reconcile(&hits, outcomes);

        assert_eq!(results.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i + 1);
            assert_eq!(result.summary, format!("Summary {i}"));
        }
    }

    #[test]
    fn test_reconcile_backfills_failed_slot_without_shifting() {
        let hits = hits(3);
        let outcomes = vec![
            summary_outcome(0),
            TaskOutcome::Failure(anyhow!("model unavailable")),
            summary_outcome(2),
        ];
        let results = reconcile(&hits, outcomes);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].summary, "Summary 0");
        // The failed slot keeps its own hit's snippet; slot 2 is unaffected.
        assert_eq!(results[1].summary, "Snippet 1");
        assert_eq!(results[1].url, "https://example.com/1");
        assert_eq!(results[2].summary, "Summary 2");
    }

    #[test]
    fn test_reconcile_failure_without_snippet_shows_error() {
        let mut hits = hits(1);
        hits[0].snippet = String::new();
        let outcomes = vec![TaskOutcome::Failure(anyhow!("model unavailable"))];
        let results = reconcile(&hits, outcomes);
        assert!(results[0].summary.contains("Error summarizing"));
        assert!(results[0].summary.contains("model unavailable"));
    }

    #[test]
    fn test_reconcile_junk_summary_falls_back_to_snippet() {
        let hits = hits(1);
        let outcomes = vec![TaskOutcome::Success(PageSummary {
            title: "Title 0".to_string(),
            url: "https://example.com/0".to_string(),
            summary: "No response generated".to_string(),
            analysis_id: "summary_0".to_string(),
        })];
        let results = reconcile(&hits, outcomes);
        assert_eq!(results[0].summary, "Snippet 0");
    }

    #[test]
    fn test_reconcile_undispatched_tail_keeps_slots() {
        let hits = hits(3);
        let outcomes = vec![summary_outcome(0)];
        let results = reconcile(&hits, outcomes);
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].summary, "Snippet 1");
        assert_eq!(results[1].analysis_passes, 0);
        assert_eq!(results[2].summary, "Snippet 2");
    }

    #[test]
    fn test_answer_prompt_caps_context_results() {
        let hits = hits(12);
        let outcomes = (0..12).map(summary_outcome).collect();
        let results = reconcile(&hits, outcomes);
        let prompt = build_answer_prompt("test query", &results);

        assert!(prompt.contains("test query"));
        assert!(prompt.contains("10. Title 9"));
        assert!(!prompt.contains("11. Title 10"));
    }
}
