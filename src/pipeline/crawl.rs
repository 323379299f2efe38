// src/pipeline/crawl.rs

//! Crawl orchestration.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{Config, Platform};
use crate::services::{PlatformCrawler, WeiboCrawler, WorkflowCrawler, ZhihuCrawler};
use crate::storage::CsvStore;

/// Summary of one platform's crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub platform: Platform,
    /// Rows the crawler returned
    pub found: usize,
    /// Rows actually appended to the main table
    pub appended: usize,
    /// Rows dropped as duplicates
    pub duplicates: usize,
}

/// Crawl one platform: load its seen-URL set, run the crawler, filter
/// and persist the fresh rows, rewrite the increment file.
pub async fn crawl_platform(
    crawler: &dyn PlatformCrawler,
    keywords: &[String],
    store: &CsvStore,
) -> Result<CrawlOutcome> {
    let platform = crawler.platform();

    let seen = store.seen_urls(platform)?;
    log::info!("{platform}: {} URLs already stored", seen.len());

    let posts = crawler.crawl(keywords, &seen).await?;
    let found = posts.len();

    // Crawlers dedupe against `seen` themselves; filter once more so
    // the table stays clean even if an implementation slips.
    let mut unique = seen;
    let mut fresh = Vec::new();
    let mut duplicates = 0usize;
    for post in posts {
        if post.url.is_empty() || !unique.insert(post.url.clone()) {
            duplicates += 1;
            continue;
        }
        fresh.push(post);
    }

    let appended = store.append(platform, &fresh)?;
    store.write_increment(platform, &fresh)?;

    if appended == 0 {
        log::info!("{platform}: no new rows this run");
    } else {
        log::info!(
            "{platform}: {appended} rows appended to {}",
            store.main_table(platform).display()
        );
    }

    Ok(CrawlOutcome {
        platform,
        found,
        appended,
        duplicates,
    })
}

/// Run the crawl over every enabled platform, or over a single
/// explicitly requested one (which bypasses its enabled flag).
///
/// One platform failing does not stop the others.
pub async fn run_crawl(
    config: Arc<Config>,
    store: &CsvStore,
    only: Option<Platform>,
) -> Result<Vec<CrawlOutcome>> {
    let keywords = config.clean_keywords();
    log::info!("Crawling {} keywords", keywords.len());

    let mut outcomes = Vec::new();
    for platform in Platform::ALL {
        match only {
            Some(requested) if requested != platform => continue,
            Some(_) => {}
            None => {
                let enabled = match platform {
                    Platform::Weibo => config.weibo.enabled,
                    Platform::Zhihu => config.zhihu.enabled,
                    Platform::Xiaohongshu => config.xiaohongshu.enabled,
                };
                if !enabled {
                    log::info!("{platform} disabled, skipping");
                    continue;
                }
            }
        }

        let crawler: Box<dyn PlatformCrawler> = match platform {
            Platform::Weibo => Box::new(WeiboCrawler::new(Arc::clone(&config))?),
            Platform::Zhihu => Box::new(ZhihuCrawler::new(Arc::clone(&config))),
            Platform::Xiaohongshu => Box::new(WorkflowCrawler::new(Arc::clone(&config))?),
        };

        match crawl_platform(crawler.as_ref(), &keywords, store).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("{platform} crawl failed: {e}"),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct StubCrawler {
        posts: Vec<Post>,
    }

    #[async_trait]
    impl PlatformCrawler for StubCrawler {
        fn platform(&self) -> Platform {
            Platform::Zhihu
        }

        async fn crawl(
            &self,
            _keywords: &[String],
            seen: &HashSet<String>,
        ) -> Result<Vec<Post>> {
            Ok(self
                .posts
                .iter()
                .filter(|p| !seen.contains(&p.url))
                .cloned()
                .collect())
        }
    }

    fn post(url: &str) -> Post {
        Post {
            url: url.to_string(),
            title: "标题".to_string(),
            scraped_at: "2026-03-10 15:30:00".to_string(),
            ..Post::new("kw", "zhihu")
        }
    }

    #[tokio::test]
    async fn test_crawl_platform_appends_and_dedupes() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());
        let keywords = vec!["kw".to_string()];

        let crawler = StubCrawler {
            posts: vec![
                post("https://example.com/1"),
                post("https://example.com/2"),
                post("https://example.com/1"), // batch-internal duplicate
            ],
        };

        let outcome = crawl_platform(&crawler, &keywords, &store).await.unwrap();
        assert_eq!(outcome.found, 3);
        assert_eq!(outcome.appended, 2);
        assert_eq!(outcome.duplicates, 1);

        // Second run sees the stored URLs and appends nothing.
        let outcome = crawl_platform(&crawler, &keywords, &store).await.unwrap();
        assert_eq!(outcome.found, 0);
        assert_eq!(outcome.appended, 0);
        assert_eq!(store.row_count(Platform::Zhihu).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_crawl_platform_drops_empty_urls() {
        let tmp = TempDir::new().unwrap();
        let store = CsvStore::new(tmp.path());

        let crawler = StubCrawler {
            posts: vec![post(""), post("https://example.com/1")],
        };

        let outcome = crawl_platform(&crawler, &[], &store).await.unwrap();
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.duplicates, 1);
    }
}
