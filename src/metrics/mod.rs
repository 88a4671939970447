//! Session metrics for operator-facing telemetry.
//!
//! Collects request, token, timing and fetch counters across one process
//! lifetime. Consumers of the batch engine report here independently of the
//! engine's own progress tracking; nothing in this module influences
//! scheduling.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One recorded search invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub results_count: usize,
    pub search_time_ms: u64,
    pub timestamp: String,
}

/// Cumulative counters for one session. All methods take `&self`; counters
/// are atomics so in-flight tasks can record concurrently.
pub struct SessionMetrics {
    started_at: Instant,
    requests_total: AtomicU64,
    requests_ok: AtomicU64,
    requests_failed: AtomicU64,
    tokens_sent: AtomicU64,
    tokens_received: AtomicU64,
    processing_ms_total: AtomicU64,
    web_pages_fetched: AtomicU64,
    web_pages_failed: AtomicU64,
    search_ms_total: AtomicU64,
    searches: Mutex<Vec<SearchRecord>>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            requests_ok: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            tokens_sent: AtomicU64::new(0),
            tokens_received: AtomicU64::new(0),
            processing_ms_total: AtomicU64::new(0),
            web_pages_fetched: AtomicU64::new(0),
            web_pages_failed: AtomicU64::new(0),
            search_ms_total: AtomicU64::new(0),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Record one model request.
    pub fn add_request(
        &self,
        success: bool,
        tokens_sent: u64,
        tokens_received: u64,
        elapsed: Duration,
    ) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.tokens_sent.fetch_add(tokens_sent, Ordering::Relaxed);
        self.tokens_received
            .fetch_add(tokens_received, Ordering::Relaxed);
        self.processing_ms_total
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record one page fetch attempt.
    pub fn add_web_fetch(&self, success: bool) {
        self.web_pages_fetched.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.web_pages_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one search invocation.
    pub fn add_search(&self, query: &str, results_count: usize, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        self.search_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(SearchRecord {
                query: query.to_string(),
                results_count,
                search_time_ms: elapsed_ms,
                timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            });
        }
    }

    /// Snapshot everything into a serializable report.
    pub fn report(&self) -> MetricsReport {
        let requests_total = self.requests_total.load(Ordering::Relaxed);
        let requests_ok = self.requests_ok.load(Ordering::Relaxed);
        let processing_ms_total = self.processing_ms_total.load(Ordering::Relaxed);

        MetricsReport {
            generated_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests_total,
            requests_ok,
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            success_rate: if requests_total > 0 {
                requests_ok as f64 / requests_total as f64 * 100.0
            } else {
                0.0
            },
            tokens_sent: self.tokens_sent.load(Ordering::Relaxed),
            tokens_received: self.tokens_received.load(Ordering::Relaxed),
            avg_request_ms: if requests_total > 0 {
                processing_ms_total as f64 / requests_total as f64
            } else {
                0.0
            },
            total_processing_ms: processing_ms_total,
            total_search_ms: self.search_ms_total.load(Ordering::Relaxed),
            web_pages_fetched: self.web_pages_fetched.load(Ordering::Relaxed),
            web_pages_failed: self.web_pages_failed.load(Ordering::Relaxed),
            searches: self
                .searches
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default(),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable session report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub generated_at: String,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub requests_ok: u64,
    pub requests_failed: u64,
    pub success_rate: f64,
    pub tokens_sent: u64,
    pub tokens_received: u64,
    pub avg_request_ms: f64,
    pub total_processing_ms: u64,
    pub total_search_ms: u64,
    pub web_pages_fetched: u64,
    pub web_pages_failed: u64,
    pub searches: Vec<SearchRecord>,
}

impl MetricsReport {
    /// Human-readable block for end-of-run CLI output.
    pub fn render_text(&self) -> String {
        format!(
            "Requests: {} total, {} ok, {} failed ({:.1}% success)\n\
             Tokens: {} sent, {} received\n\
             Timing: {:.0}ms avg request, {}ms search, {}ms processing\n\
             Pages: {} fetched, {} failed",
            self.requests_total,
            self.requests_ok,
            self.requests_failed,
            self.success_rate,
            self.tokens_sent,
            self.tokens_received,
            self.avg_request_ms,
            self.total_search_ms,
            self.total_processing_ms,
            self.web_pages_fetched,
            self.web_pages_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accounting() {
        let metrics = SessionMetrics::new();
        metrics.add_request(true, 100, 50, Duration::from_millis(200));
        metrics.add_request(true, 80, 40, Duration::from_millis(100));
        metrics.add_request(false, 60, 0, Duration::from_millis(300));

        let report = metrics.report();
        assert_eq!(report.requests_total, 3);
        assert_eq!(report.requests_ok, 2);
        assert_eq!(report.requests_failed, 1);
        assert_eq!(report.tokens_sent, 240);
        assert_eq!(report.tokens_received, 90);
        assert_eq!(report.total_processing_ms, 600);
        assert!((report.avg_request_ms - 200.0).abs() < f64::EPSILON);
        assert!((report.success_rate - 66.66).abs() < 0.1);
    }

    #[test]
    fn test_empty_report_has_no_division_artifacts() {
        let report = SessionMetrics::new().report();
        assert_eq!(report.requests_total, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.avg_request_ms, 0.0);
    }

    #[test]
    fn test_web_fetch_and_search_accounting() {
        let metrics = SessionMetrics::new();
        metrics.add_web_fetch(true);
        metrics.add_web_fetch(false);
        metrics.add_search("rust concurrency", 12, Duration::from_millis(450));

        let report = metrics.report();
        assert_eq!(report.web_pages_fetched, 2);
        assert_eq!(report.web_pages_failed, 1);
        assert_eq!(report.total_search_ms, 450);
        assert_eq!(report.searches.len(), 1);
        assert_eq!(report.searches[0].query, "rust concurrency");
        assert_eq!(report.searches[0].results_count, 12);
    }

    #[test]
    fn test_render_text_mentions_key_counters() {
        let metrics = SessionMetrics::new();
        metrics.add_request(true, 10, 5, Duration::from_millis(100));
        let text = metrics.report().render_text();
        assert!(text.contains("1 total"));
        assert!(text.contains("10 sent"));
    }
}
