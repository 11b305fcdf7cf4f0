pub mod client;
pub mod engine;
pub mod models;
pub mod worker_pool;

// Re-exports for convenience
pub use client::{FetchError, HistoryClient, PageSource};
pub use engine::{CrawlError, CrawlSettings, Crawler, PageOutcome, PassSummary, TaskOutcome};
