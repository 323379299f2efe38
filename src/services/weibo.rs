// src/services/weibo.rs

//! Weibo keyword search.
//!
//! The m.weibo.cn mobile API is tried first; it returns structured
//! JSON and tolerates logged-out sessions better. When a keyword
//! yields nothing new there, the s.weibo.com HTML search is parsed as
//! a fallback. External links found in post bodies are resolved into
//! companion rows carrying the page title and a short snippet.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rand::Rng;
use reqwest::Client;
use reqwest::header::{COOKIE, USER_AGENT};
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Config, Platform, Post};
use crate::services::PlatformCrawler;
use crate::utils::http::create_client;
use crate::utils::time::{now_stamp, standardize};
use crate::utils::truncate_chars;
use crate::utils::url::{is_http, is_weibo_internal};

const API_URL: &str = "https://m.weibo.cn/api/container/getIndex";
const HTML_SEARCH_URL: &str = "https://s.weibo.com/weibo";
const SNIPPET_CHARS: usize = 200;

/// m.weibo.cn search response. Only the fields we read are modeled;
/// everything else in the payload is ignored.
#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    ok: i64,
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    cards: Vec<Card>,
}

/// A result card. Grouped cards nest the actual posts one level down.
#[derive(Debug, Default, Clone, Deserialize)]
struct Card {
    #[serde(default)]
    card_group: Option<Vec<Card>>,
    #[serde(default)]
    mblog: Option<Mblog>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct Mblog {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    user: Option<MblogUser>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct MblogUser {
    #[serde(default)]
    screen_name: String,
}

/// Crawler for weibo search endpoints.
pub struct WeiboCrawler {
    config: Arc<Config>,
    client: Client,
}

impl WeiboCrawler {
    /// Create a new weibo crawler with the given configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = create_client(&config.crawler)?;
        Ok(Self { config, client })
    }

    /// Search the m.weibo.cn API, page by page. Errors end the page
    /// loop and return whatever was collected so far.
    async fn search_api(&self, keyword: &str, seen: &HashSet<String>) -> Vec<Post> {
        log::info!("m.weibo.cn search: {keyword}");
        let containerid = format!("100103type=1&q={keyword}");
        let mut rows = Vec::new();

        for page in 1..=self.config.weibo.max_pages {
            let page_param = page.to_string();
            let mut request = self
                .client
                .get(API_URL)
                .query(&[
                    ("containerid", containerid.as_str()),
                    ("page_type", "searchall"),
                    ("page", page_param.as_str()),
                ])
                .header(USER_AGENT, &self.config.crawler.mobile_user_agent)
                .header("MWeibo-Pwa", "1")
                .header("X-Requested-With", "XMLHttpRequest");
            if !self.config.weibo.cookie.trim().is_empty() {
                request = request.header(COOKIE, self.config.weibo.cookie.trim());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("m.weibo.cn request failed (page {page}): {e}");
                    break;
                }
            };
            let payload: SearchResponse = match response.json().await {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("m.weibo.cn returned non-JSON (page {page}): {e}");
                    break;
                }
            };
            if payload.ok != 1 {
                break;
            }

            match rows_from_response(&payload, keyword, seen, Local::now()) {
                Ok(fresh) => rows.extend(fresh),
                Err(e) => {
                    log::warn!("Failed to parse m.weibo.cn cards: {e}");
                    break;
                }
            }

            self.page_delay().await;
        }
        rows
    }

    /// Search the s.weibo.com HTML pages.
    async fn search_html(&self, keyword: &str, seen: &HashSet<String>) -> Vec<Post> {
        log::info!("s.weibo.com search: {keyword}");
        let mut rows = Vec::new();

        for page in 1..=self.config.weibo.max_pages {
            let page_param = page.to_string();
            let mut request = self
                .client
                .get(HTML_SEARCH_URL)
                .query(&[("q", keyword), ("page", page_param.as_str())])
                .header(USER_AGENT, &self.config.crawler.user_agent);
            if !self.config.weibo.cookie.trim().is_empty() {
                request = request.header(COOKIE, self.config.weibo.cookie.trim());
            }

            let html = match request.send().await {
                Ok(response) => match response.text().await {
                    Ok(html) => html,
                    Err(e) => {
                        log::warn!("s.weibo.com body read failed (page {page}): {e}");
                        break;
                    }
                },
                Err(e) => {
                    log::warn!("s.weibo.com request failed (page {page}): {e}");
                    break;
                }
            };

            match rows_from_search_html(&html, keyword, seen, Local::now()) {
                Ok(fresh) => rows.extend(fresh),
                Err(e) => {
                    log::warn!("Failed to parse s.weibo.com page: {e}");
                    break;
                }
            }

            self.page_delay().await;
        }
        rows
    }

    /// Resolve external links found in post bodies into
    /// `link_content` rows. Weibo-internal links are skipped; each
    /// link is fetched at most once per run.
    async fn resolve_links(&self, posts: &[Post], session: &mut HashSet<String>) -> Vec<Post> {
        let mut rows = Vec::new();
        for post in posts {
            for link in &post.links {
                if is_weibo_internal(link) || !session.insert(link.clone()) {
                    continue;
                }
                log::info!("Resolving external link: {link}");
                match self.fetch_link(link).await {
                    Ok((page_title, page_snippet)) => rows.push(Post::link_content(
                        &post.keyword,
                        link,
                        page_title,
                        page_snippet,
                        now_stamp(),
                    )),
                    Err(e) => {
                        log::warn!("Failed to resolve {link}: {e}");
                        continue;
                    }
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        rows
    }

    async fn fetch_link(&self, link: &str) -> Result<(String, String)> {
        let html = self
            .client
            .get(link)
            .header(USER_AGENT, &self.config.crawler.user_agent)
            .send()
            .await?
            .text()
            .await?;
        parse_link_page(&html)
    }

    async fn page_delay(&self) {
        sleep_jittered(
            self.config.crawler.delay_min_ms,
            self.config.crawler.delay_max_ms,
        )
        .await;
    }
}

#[async_trait]
impl PlatformCrawler for WeiboCrawler {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    async fn crawl(&self, keywords: &[String], seen: &HashSet<String>) -> Result<Vec<Post>> {
        if self.config.weibo.cookie.trim().is_empty() {
            log::warn!("weibo.cookie is empty; searches run logged-out and may miss results");
        }

        let mut session = seen.clone();
        let mut out = Vec::new();

        for (i, keyword) in keywords.iter().enumerate() {
            if i > 0 {
                sleep_jittered(
                    self.config.crawler.keyword_delay_min_ms,
                    self.config.crawler.keyword_delay_max_ms,
                )
                .await;
            }

            let mut found = self.search_api(keyword, &session).await;
            if found.is_empty() {
                log::info!("No API results for 「{keyword}」, trying HTML search");
                found = self.search_html(keyword, &session).await;
            }

            let fresh: Vec<Post> = found
                .into_iter()
                .filter(|p| session.insert(p.url.clone()))
                .collect();
            log::info!("Keyword 「{keyword}」: {} new rows", fresh.len());
            out.extend(fresh);
        }

        if self.config.weibo.resolve_links {
            let link_rows = self.resolve_links(&out, &mut session).await;
            out.extend(link_rows);
        }

        Ok(out)
    }
}

/// Sleep a random duration within `[min_ms, max_ms]`.
async fn sleep_jittered(min_ms: u64, max_ms: u64) {
    let ms = if max_ms > min_ms {
        rand::rng().random_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Turn an API payload into rows, skipping posts already in `seen`.
fn rows_from_response(
    payload: &SearchResponse,
    keyword: &str,
    seen: &HashSet<String>,
    now: DateTime<Local>,
) -> Result<Vec<Post>> {
    let mut rows = Vec::new();

    for card in &payload.data.cards {
        let group: Vec<&Card> = match &card.card_group {
            Some(group) => group.iter().collect(),
            None => vec![card],
        };
        for card in group {
            let Some(mblog) = &card.mblog else { continue };
            if mblog.id.is_empty() {
                continue;
            }
            let url = format!("https://m.weibo.cn/detail/{}", mblog.id);
            if seen.contains(&url) {
                continue;
            }

            let (content, links) = parse_mblog_text(&mblog.text)?;
            rows.push(Post {
                author: mblog
                    .user
                    .as_ref()
                    .map(|u| u.screen_name.clone())
                    .unwrap_or_default(),
                published_at: standardize(&mblog.created_at, now),
                content,
                url,
                scraped_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
                links,
                ..Post::new(keyword, "m.weibo.cn")
            });
        }
    }
    Ok(rows)
}

/// Extract plain text and outbound links from an mblog's HTML body.
fn parse_mblog_text(html: &str) -> Result<(String, Vec<String>)> {
    let fragment = Html::parse_fragment(html);

    let text = fragment
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let link_sel = parse_selector("a[href]")?;
    let mut links = Vec::new();
    let mut unique = HashSet::new();
    for a in fragment.select(&link_sel) {
        if let Some(href) = a.value().attr("href") {
            if is_http(href) && unique.insert(href.to_string()) {
                links.push(href.to_string());
            }
        }
    }
    Ok((text, links))
}

/// Turn one s.weibo.com search page into rows, skipping posts already
/// in `seen`. Rows without an `mid` or a body are dropped.
fn rows_from_search_html(
    html: &str,
    keyword: &str,
    seen: &HashSet<String>,
    now: DateTime<Local>,
) -> Result<Vec<Post>> {
    let document = Html::parse_document(html);

    let card_sel = parse_selector(".card-wrap")?;
    let content_sel = parse_selector(".content .txt")?;
    let name_sel = parse_selector(".name")?;
    let time_sel = parse_selector(".from a")?;
    let link_sel = parse_selector("a[href]")?;

    let mut rows = Vec::new();
    for card in document.select(&card_sel) {
        let Some(mid) = card.value().attr("mid") else {
            continue;
        };
        let url = format!("https://weibo.com/detail/{mid}");
        if seen.contains(&url) {
            continue;
        }

        let Some(content_el) = card.select(&content_sel).next() else {
            continue;
        };
        let content = content_el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let author = card
            .select(&name_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let raw_time = card
            .select(&time_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let links: Vec<String> = content_el
            .select(&link_sel)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| is_http(href))
            .map(String::from)
            .collect();

        rows.push(Post {
            author,
            published_at: standardize(&raw_time, now),
            content,
            url,
            scraped_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            links,
            ..Post::new(keyword, "s.weibo.com")
        });
    }
    Ok(rows)
}

/// Page title and a leading text snippet of a resolved link target.
fn parse_link_page(html: &str) -> Result<(String, String)> {
    let document = Html::parse_document(html);

    let title_sel = parse_selector("title")?;
    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Ok((title, truncate_chars(&text, SNIPPET_CHARS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap()
    }

    const API_FIXTURE: &str = r#"{
        "ok": 1,
        "data": {
            "cards": [
                {
                    "card_group": [
                        {
                            "mblog": {
                                "id": "500001",
                                "text": "转发 <a href=\"https://example.com/article\">全文</a> 内容",
                                "created_at": "5分钟前",
                                "user": {"screen_name": "测试账号"}
                            }
                        }
                    ]
                },
                {
                    "mblog": {
                        "id": "500002",
                        "text": "无链接正文",
                        "created_at": "昨天 12:30",
                        "user": {"screen_name": "另一个账号"}
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn test_rows_from_response() {
        let payload: SearchResponse = serde_json::from_str(API_FIXTURE).unwrap();
        let rows =
            rows_from_response(&payload, "测试", &HashSet::new(), fixed_now()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "https://m.weibo.cn/detail/500001");
        assert_eq!(rows[0].author, "测试账号");
        assert_eq!(rows[0].published_at, "2026-03-10 15:25:00");
        assert_eq!(rows[0].links, vec!["https://example.com/article"]);
        assert_eq!(rows[1].source, "m.weibo.cn");
        assert_eq!(rows[1].published_at, "2026-03-09 12:30:00");
    }

    #[test]
    fn test_rows_from_response_skips_seen() {
        let payload: SearchResponse = serde_json::from_str(API_FIXTURE).unwrap();
        let seen: HashSet<String> =
            ["https://m.weibo.cn/detail/500001".to_string()].into_iter().collect();
        let rows = rows_from_response(&payload, "测试", &seen, fixed_now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://m.weibo.cn/detail/500002");
    }

    #[test]
    fn test_parse_mblog_text_dedupes_links() {
        let (text, links) = parse_mblog_text(
            "看这个<a href=\"https://example.com/a\">链接</a>和\
             <a href=\"https://example.com/a\">同一个</a>\
             <a href=\"/relative\">站内</a>",
        )
        .unwrap();
        assert_eq!(text, "看这个链接和同一个站内");
        assert_eq!(links, vec!["https://example.com/a"]);
    }

    #[test]
    fn test_rows_from_search_html() {
        let html = r#"
            <div class="card-wrap" mid="600001">
              <div class="info"><a class="name">微博用户</a></div>
              <div class="content">
                <p class="txt">正文提到了 <a href="https://news.example.com/x">报道</a></p>
                <div class="from"><a>今天 09:05</a></div>
              </div>
            </div>
            <div class="card-wrap">
              <div class="content"><p class="txt">没有 mid，应被跳过</p></div>
            </div>
        "#;
        let rows = rows_from_search_html(html, "测试", &HashSet::new(), fixed_now()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://weibo.com/detail/600001");
        assert_eq!(rows[0].author, "微博用户");
        assert_eq!(rows[0].published_at, "2026-03-10 09:05:00");
        assert_eq!(rows[0].links, vec!["https://news.example.com/x"]);
        assert_eq!(rows[0].source, "s.weibo.com");
    }

    #[test]
    fn test_parse_link_page() {
        let html = r#"<html><head><title> 示例页面 </title></head>
            <body><p>第一段。</p><p>第二段。</p></body></html>"#;
        let (title, snippet) = parse_link_page(html).unwrap();
        assert_eq!(title, "示例页面");
        assert!(snippet.contains("第一段。"));
        assert!(snippet.contains("第二段。"));
    }

    #[tokio::test]
    #[ignore] // live network test: cargo test live_weibo_search -- --ignored --nocapture
    async fn live_weibo_search() {
        let mut config = Config::default();
        config.weibo.max_pages = 1;
        config.weibo.resolve_links = false;
        if let Ok(cookie) = std::env::var("WEIBO_COOKIE") {
            config.weibo.cookie = cookie;
        }

        let crawler = WeiboCrawler::new(Arc::new(config)).unwrap();
        let rows = crawler
            .crawl(&["新闻".to_string()], &HashSet::new())
            .await
            .unwrap();
        println!("fetched {} rows", rows.len());
        for row in rows.iter().take(3) {
            println!("  {} | {} | {}", row.author, row.published_at, row.url);
        }
    }
}
