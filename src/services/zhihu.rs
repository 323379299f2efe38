// src/services/zhihu.rs

//! Zhihu keyword search through a driven browser.
//!
//! Zhihu renders search results client-side and sits behind
//! risk-control checks, so this crawler navigates a real Chromium,
//! scrolls like a reader, then snapshots the DOM and extracts fields
//! with CSS selectors. Walls (captcha, login, abnormal-traffic pages)
//! are detected by red-flag substrings and leave a screenshot + HTML
//! dump behind instead of garbage rows.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use rand::Rng;
use scraper::{Html, Selector};
use url::Url;

use crate::browser::{BrowserSession, save_debug};
use crate::error::{AppError, Result};
use crate::models::{Config, Platform, Post, ZhihuConfig};
use crate::services::PlatformCrawler;
use crate::utils::time::now_stamp;
use crate::utils::url::normalize_zhihu_url;
use crate::utils::{safe_name, truncate_chars};

const SEARCH_URL: &str = "https://www.zhihu.com/search";
const HOME_URL: &str = "https://www.zhihu.com";
const EXCERPT_CHARS: usize = 200;

/// Crawler for zhihu content search.
pub struct ZhihuCrawler {
    config: Arc<Config>,
}

impl ZhihuCrawler {
    /// Create a new zhihu crawler with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn zhihu(&self) -> &ZhihuConfig {
        &self.config.zhihu
    }

    fn debug_dir(&self) -> &Path {
        Path::new(&self.config.paths.debug_dir)
    }

    /// Navigate with retries. Returns false when every attempt failed;
    /// the final failure leaves a debug dump.
    async fn goto_with_retry(&self, page: &Page, url: &str, prefix: &str) -> bool {
        let timeout = Duration::from_millis(self.zhihu().goto_timeout_ms);
        let retries = self.zhihu().goto_retries;

        for attempt in 1..=retries {
            let nav = tokio::time::timeout(timeout, async {
                page.goto(url)
                    .await
                    .map_err(|e| AppError::browser(e))?;
                page.wait_for_navigation()
                    .await
                    .map_err(|e| AppError::browser(e))?;
                Ok::<_, AppError>(())
            })
            .await;

            match nav {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    log::warn!("Navigation error (attempt {attempt}/{retries}): {url} err={e}");
                    if attempt == retries {
                        save_debug(
                            page,
                            self.debug_dir(),
                            &format!("{prefix}_error"),
                            &format!("Final error for {url}"),
                        )
                        .await;
                        return false;
                    }
                    tokio::time::sleep(Duration::from_secs(3 * attempt as u64)).await;
                }
                Err(_) => {
                    log::warn!("Navigation timeout (attempt {attempt}/{retries}): {url}");
                    if attempt == retries {
                        save_debug(
                            page,
                            self.debug_dir(),
                            &format!("{prefix}_timeout"),
                            &format!("Final timeout for {url}"),
                        )
                        .await;
                        return false;
                    }
                    tokio::time::sleep(Duration::from_secs(5 * attempt as u64)).await;
                }
            }
        }
        false
    }

    /// Poll until the result-card selector matches something.
    async fn wait_for_cards(&self, page: &Page) -> bool {
        let check = match serde_json::to_string(&self.zhihu().card_selector) {
            Ok(quoted) => format!("document.querySelector({quoted}) !== null"),
            Err(_) => return false,
        };

        let deadline = Duration::from_millis(self.zhihu().selector_timeout_ms);
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            let found = page
                .evaluate(check.as_str())
                .await
                .ok()
                .and_then(|v| v.into_value::<bool>().ok())
                .unwrap_or(false);
            if found {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        false
    }

    /// Scroll the page a few screens with reader-like pauses.
    async fn human_scroll(&self, page: &Page, times: u32) {
        for _ in 0..times {
            let (dy, pause_ms) = {
                let mut rng = rand::rng();
                (rng.random_range(500..=900), rng.random_range(1000..=2500))
            };
            let script = format!("window.scrollBy(0, {dy})");
            if let Err(e) = page.evaluate(script.as_str()).await {
                log::debug!("Scroll failed: {e}");
                return;
            }
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        }
    }

    /// Search one keyword and return its unseen rows.
    async fn search_keyword(
        &self,
        page: &Page,
        keyword: &str,
        session: &mut HashSet<String>,
    ) -> Vec<Post> {
        let prefix = safe_name(keyword, 20);
        log::info!("zhihu search: {keyword}");

        let search_url = match Url::parse_with_params(
            SEARCH_URL,
            &[("type", "content"), ("q", keyword)],
        ) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::warn!("Could not build search URL for 「{keyword}」: {e}");
                return Vec::new();
            }
        };

        if !self
            .goto_with_retry(page, &search_url, &format!("{prefix}_search"))
            .await
        {
            log::warn!("Search page unreachable, skipping 「{keyword}」");
            return Vec::new();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Could not read search page HTML: {e}");
                return Vec::new();
            }
        };
        let title = page
            .evaluate("document.title")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .unwrap_or_default();

        if looks_like_wall(&title, &html, &self.zhihu().red_flags) {
            log::warn!("Risk-control or login wall for 「{keyword}」 (see debug dir)");
            save_debug(
                page,
                self.debug_dir(),
                &format!("{prefix}_wall"),
                "Red-flag match on search page",
            )
            .await;
            return Vec::new();
        }

        if !self.wait_for_cards(page).await {
            log::warn!("No result cards appeared for 「{keyword}」 (DOM drift or throttling)");
            save_debug(
                page,
                self.debug_dir(),
                &format!("{prefix}_noresult"),
                "Result selector never matched",
            )
            .await;
            return Vec::new();
        }

        let settle_ms = rand::rng().random_range(2000..=4000);
        tokio::time::sleep(Duration::from_millis(settle_ms)).await;
        self.human_scroll(page, 4).await;

        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Could not snapshot result page: {e}");
                return Vec::new();
            }
        };

        let rows = match extract_cards(
            &html,
            self.zhihu(),
            keyword,
            &now_stamp(),
            self.zhihu().max_results,
        ) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Card extraction failed for 「{keyword}」: {e}");
                return Vec::new();
            }
        };
        if rows.is_empty() {
            save_debug(
                page,
                self.debug_dir(),
                &format!("{prefix}_emptycards"),
                "Selector matched but no usable cards",
            )
            .await;
        }

        let fresh: Vec<Post> = rows
            .into_iter()
            .filter(|p| session.insert(p.url.clone()))
            .collect();
        log::info!("Keyword 「{keyword}」: {} new rows", fresh.len());
        fresh
    }
}

#[async_trait]
impl PlatformCrawler for ZhihuCrawler {
    fn platform(&self) -> Platform {
        Platform::Zhihu
    }

    async fn crawl(&self, keywords: &[String], seen: &HashSet<String>) -> Result<Vec<Post>> {
        let session = BrowserSession::launch(&self.config, self.zhihu().headless).await?;
        let page = session.new_page().await?;

        // One pass over the home page first. A wall here means the
        // session is bad and every search would come back empty.
        if self.goto_with_retry(&page, HOME_URL, "home").await {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if let Ok(html) = page.content().await {
                if looks_like_wall("", &html, &self.zhihu().red_flags) {
                    log::warn!("Home page shows a login/risk-control wall; expect few results");
                }
            }
        } else {
            log::warn!("Home page unreachable, trying searches anyway");
        }

        let mut session_urls = seen.clone();
        let mut out = Vec::new();

        for (i, keyword) in keywords.iter().enumerate() {
            if i > 0 {
                let min = self.config.crawler.keyword_delay_min_ms;
                let max = self.config.crawler.keyword_delay_max_ms;
                let delay_ms = if max > min {
                    rand::rng().random_range(min..=max)
                } else {
                    min
                };
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let rows = self.search_keyword(&page, keyword, &mut session_urls).await;
            out.extend(rows);
        }

        session.close().await;
        Ok(out)
    }
}

/// True when the page looks like a captcha/login/risk-control wall.
fn looks_like_wall(title: &str, html: &str, red_flags: &[String]) -> bool {
    red_flags
        .iter()
        .any(|flag| title.contains(flag.as_str()) || html.contains(flag.as_str()))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Extract rows from a result-page snapshot.
///
/// At most `max_results` cards are considered; cards without a usable
/// title link are dropped.
fn extract_cards(
    html: &str,
    config: &ZhihuConfig,
    keyword: &str,
    scraped_at: &str,
    max_results: usize,
) -> Result<Vec<Post>> {
    let document = Html::parse_document(html);

    let card_sel = parse_selector(&config.card_selector)?;
    let title_sel = parse_selector(&config.title_selector)?;
    let author_sel = parse_selector(&config.author_selector)?;
    let excerpt_sel = parse_selector(&config.excerpt_selector)?;
    let any_link_sel = parse_selector("a[href]")?;

    let mut rows = Vec::new();
    for card in document.select(&card_sel).take(max_results) {
        let title_el = card
            .select(&title_sel)
            .next()
            .or_else(|| card.select(&any_link_sel).next());
        let Some(title_el) = title_el else { continue };

        let title = title_el.text().collect::<String>().trim().to_string();
        let href = title_el.value().attr("href").unwrap_or("");
        if title.is_empty() || href.is_empty() {
            continue;
        }

        let author = card
            .select(&author_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "未知".to_string());

        let excerpt = card
            .select(&excerpt_sel)
            .next()
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .replace('\n', " ")
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();

        rows.push(Post {
            author,
            title,
            content: truncate_chars(&excerpt, EXCERPT_CHARS),
            url: normalize_zhihu_url(href),
            scraped_at: scraped_at.to_string(),
            ..Post::new(keyword, "zhihu")
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ZhihuConfig {
        ZhihuConfig::default()
    }

    const RESULT_PAGE: &str = r#"
        <div class="ContentItem">
          <h2><a href="/question/12345/answer/67890">量子计算的进展如何？</a></h2>
          <div class="AuthorInfo-name">某研究员</div>
          <div class="RichContent-inner">
            最近的一些进展包括
            纠错码的突破。
          </div>
        </div>
        <div class="SearchResult-Card">
          <a href="//www.zhihu.com/collection/222">收藏夹标题</a>
        </div>
        <div class="ContentItem">
          <span>没有链接的卡片</span>
        </div>
    "#;

    #[test]
    fn test_extract_cards() {
        let rows = extract_cards(RESULT_PAGE, &test_config(), "量子", "2026-03-10 15:30:00", 30)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "量子计算的进展如何？");
        assert_eq!(
            rows[0].url,
            "https://www.zhihu.com/question/12345/answer/67890"
        );
        assert_eq!(rows[0].author, "某研究员");
        assert!(rows[0].content.contains("纠错码的突破"));

        // Second card has no question/article link, so the fallback
        // anchor is used, and the missing author becomes a placeholder.
        assert_eq!(rows[1].url, "https://www.zhihu.com/collection/222");
        assert_eq!(rows[1].title, "收藏夹标题");
        assert_eq!(rows[1].author, "未知");
    }

    #[test]
    fn test_extract_cards_respects_max_results() {
        let rows = extract_cards(RESULT_PAGE, &test_config(), "量子", "2026-03-10 15:30:00", 1)
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_looks_like_wall() {
        let flags = test_config().red_flags;
        assert!(looks_like_wall("安全验证", "", &flags));
        assert!(looks_like_wall("", "<div>请输入验证码</div>", &flags));
        assert!(!looks_like_wall("搜索结果", "<div>正常内容</div>", &flags));
    }
}
