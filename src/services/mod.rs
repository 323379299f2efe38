//! Service layer for the crawler application.
//!
//! One crawler per platform:
//! - Weibo search via HTTP endpoints (`WeiboCrawler`)
//! - Zhihu search via a driven browser (`ZhihuCrawler`)
//! - Xiaohongshu via a hosted workflow API (`WorkflowCrawler`)

mod weibo;
mod xiaohongshu;
mod zhihu;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Platform, Post};

pub use weibo::WeiboCrawler;
pub use xiaohongshu::WorkflowCrawler;
pub use zhihu::ZhihuCrawler;

/// Common seam over the per-platform crawlers.
#[async_trait]
pub trait PlatformCrawler: Send + Sync {
    /// Which platform this crawler serves.
    fn platform(&self) -> Platform;

    /// Search every keyword and return rows whose URLs are not in
    /// `seen`. Implementations also keep URLs unique within the run,
    /// so one post matched by two keywords yields one row.
    async fn crawl(&self, keywords: &[String], seen: &HashSet<String>) -> Result<Vec<Post>>;
}
