//! The research pipeline: web search, page retrieval, summarization, and
//! result reconciliation on top of the batch engine.

pub mod page;
pub mod pipeline;
pub mod summarizer;
pub mod web_search;

pub use page::PageFetcher;
pub use pipeline::{EnhancedResult, ResearchPipeline};
pub use summarizer::{PageSummary, Summarizer};
pub use web_search::{SearchHit, WebSearchClient};
