//! Post data structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A platform the crawler knows how to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Weibo,
    Zhihu,
    Xiaohongshu,
}

impl Platform {
    /// All platforms, in crawl order.
    pub const ALL: [Platform; 3] = [Platform::Weibo, Platform::Zhihu, Platform::Xiaohongshu];

    /// Stable lowercase name, used for file naming.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Weibo => "weibo",
            Platform::Zhihu => "zhihu",
            Platform::Xiaohongshu => "xiaohongshu",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weibo" => Ok(Platform::Weibo),
            "zhihu" => Ok(Platform::Zhihu),
            "xiaohongshu" => Ok(Platform::Xiaohongshu),
            other => Err(AppError::config(format!(
                "Unknown platform '{other}' (expected weibo, zhihu or xiaohongshu)"
            ))),
        }
    }
}

/// Whether a row is a post itself or a resolved outbound link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Post,
    LinkContent,
}

/// One row of crawl output. Field order fixes the CSV column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Search keyword that produced this row
    pub keyword: String,

    /// Endpoint the row came from (e.g. "m.weibo.cn", "zhihu")
    pub source: String,

    /// Row kind
    pub kind: PostKind,

    /// Author display name (may be empty)
    pub author: String,

    /// Title (empty for weibo posts)
    pub title: String,

    /// Publication time, standardized where derivable
    pub published_at: String,

    /// Body text or excerpt
    pub content: String,

    /// Absolute post URL, the dedup key
    pub url: String,

    /// Page title of a resolved outbound link
    pub page_title: String,

    /// Leading text of a resolved outbound link
    pub page_snippet: String,

    /// Local wall-clock time of extraction
    pub scraped_at: String,

    /// Outbound links found in the body; in-memory only
    #[serde(skip)]
    pub links: Vec<String>,
}

impl Post {
    /// An empty `post` row for the given keyword and source.
    pub fn new(keyword: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            source: source.into(),
            kind: PostKind::Post,
            author: String::new(),
            title: String::new(),
            published_at: String::new(),
            content: String::new(),
            url: String::new(),
            page_title: String::new(),
            page_snippet: String::new(),
            scraped_at: String::new(),
            links: Vec::new(),
        }
    }

    /// A `link_content` row for an outbound link resolved from a post.
    pub fn link_content(
        keyword: impl Into<String>,
        url: impl Into<String>,
        page_title: impl Into<String>,
        page_snippet: impl Into<String>,
        scraped_at: impl Into<String>,
    ) -> Self {
        Self {
            kind: PostKind::LinkContent,
            url: url.into(),
            page_title: page_title.into(),
            page_snippet: page_snippet.into(),
            scraped_at: scraped_at.into(),
            ..Self::new(keyword, "external_link")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("douyin".parse::<Platform>().is_err());
    }

    #[test]
    fn csv_header_matches_field_order() {
        let mut buf = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut buf);
            writer.serialize(Post::new("kw", "zhihu")).unwrap();
            writer.flush().unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(
            header,
            "keyword,source,kind,author,title,published_at,content,url,page_title,page_snippet,scraped_at"
        );
    }

    #[test]
    fn link_content_row_has_expected_shape() {
        let row = Post::link_content("kw", "https://example.com", "Title", "snippet", "now");
        assert_eq!(row.kind, PostKind::LinkContent);
        assert_eq!(row.source, "external_link");
        assert!(row.author.is_empty());
    }
}
