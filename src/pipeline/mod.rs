//! Pipeline entry points for crawler operations.
//!
//! - `run_crawl`: crawl every enabled platform and persist new rows
//! - `crawl_platform`: one platform against one store

pub mod crawl;

pub use crawl::{CrawlOutcome, crawl_platform, run_crawl};
