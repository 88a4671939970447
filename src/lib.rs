//! deep_research - concurrent web research with batched LLM summarization
//!
//! For a free-text query the pipeline retrieves a set of web pages,
//! summarizes each through a chat-completion endpoint, and reconciles the
//! summaries back against the original results. The heavy lifting is done by
//! the [`batch`] engine: bounded-size batches of independent async tasks,
//! unordered completion inside each batch, per-item failure isolation,
//! live progress publication, and optional expansion of newly discovered
//! work across a bounded number of rounds.

pub mod batch;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod research;
pub mod telemetry;
pub mod utils;
