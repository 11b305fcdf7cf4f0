pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod db;
pub mod models;
pub mod registry;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::route::create_router;
pub use config::Config;
pub use crawler::{Crawler, CrawlSettings, HistoryClient, PageSource};
pub use db::connection;
pub use models::{Address, Chain, NewTask, Task, Transaction};
pub use registry::AddressRegistry;
