//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment variable consulted for the workflow API token.
pub const API_TOKEN_ENV: &str = "MEDIAWATCH_API_TOKEN";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Output and state file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Keywords to search on every platform
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,

    /// Weibo search settings
    #[serde(default)]
    pub weibo: WeiboConfig,

    /// Zhihu search settings
    #[serde(default)]
    pub zhihu: ZhihuConfig,

    /// Xiaohongshu workflow API settings
    #[serde(default)]
    pub xiaohongshu: XiaohongshuConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// The workflow API token may be overridden via `MEDIAWATCH_API_TOKEN`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.xiaohongshu.api_token = token;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.mobile_user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.mobile_user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.delay_min_ms > self.crawler.delay_max_ms {
            return Err(AppError::validation(
                "crawler.delay_min_ms must not exceed crawler.delay_max_ms",
            ));
        }
        if self.crawler.keyword_delay_min_ms > self.crawler.keyword_delay_max_ms {
            return Err(AppError::validation(
                "crawler.keyword_delay_min_ms must not exceed crawler.keyword_delay_max_ms",
            ));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(AppError::validation("No keywords defined"));
        }
        if self.weibo.max_pages == 0 {
            return Err(AppError::validation("weibo.max_pages must be > 0"));
        }
        if self.zhihu.max_results == 0 {
            return Err(AppError::validation("zhihu.max_results must be > 0"));
        }
        if self.zhihu.goto_retries == 0 {
            return Err(AppError::validation("zhihu.goto_retries must be > 0"));
        }
        if self.zhihu.goto_timeout_ms == 0 || self.zhihu.selector_timeout_ms == 0 {
            return Err(AppError::validation("zhihu timeouts must be > 0"));
        }
        if self.xiaohongshu.enabled {
            if self.xiaohongshu.api_token.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "xiaohongshu.api_token is empty (set it in the config or via {API_TOKEN_ENV})"
                )));
            }
            if self.xiaohongshu.workflow_id.trim().is_empty() {
                return Err(AppError::validation("xiaohongshu.workflow_id is empty"));
            }
        }
        Ok(())
    }

    /// Keywords with surrounding whitespace removed, empties dropped.
    pub fn clean_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            paths: PathsConfig::default(),
            keywords: defaults::keywords(),
            weibo: WeiboConfig::default(),
            zhihu: ZhihuConfig::default(),
            xiaohongshu: XiaohongshuConfig::default(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Desktop User-Agent for HTML endpoints and the browser
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Mobile User-Agent for the m.weibo.cn API
    #[serde(default = "defaults::mobile_user_agent")]
    pub mobile_user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between requests in milliseconds
    #[serde(default = "defaults::delay_min")]
    pub delay_min_ms: u64,

    /// Maximum delay between requests in milliseconds
    #[serde(default = "defaults::delay_max")]
    pub delay_max_ms: u64,

    /// Minimum delay between keywords in milliseconds
    #[serde(default = "defaults::keyword_delay_min")]
    pub keyword_delay_min_ms: u64,

    /// Maximum delay between keywords in milliseconds
    #[serde(default = "defaults::keyword_delay_max")]
    pub keyword_delay_max_ms: u64,

    /// Optional HTTP proxy URL
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            mobile_user_agent: defaults::mobile_user_agent(),
            timeout_secs: defaults::timeout(),
            delay_min_ms: defaults::delay_min(),
            delay_max_ms: defaults::delay_max(),
            keyword_delay_min_ms: defaults::keyword_delay_min(),
            keyword_delay_max_ms: defaults::keyword_delay_max(),
            proxy: None,
        }
    }
}

/// Output and state file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for CSV tables
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Directory for debug screenshots and page dumps
    #[serde(default = "defaults::debug_dir")]
    pub debug_dir: String,

    /// Browser session state file (cookies)
    #[serde(default = "defaults::state_file")]
    pub state_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            debug_dir: defaults::debug_dir(),
            state_file: defaults::state_file(),
        }
    }
}

/// Weibo search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeiboConfig {
    /// Whether the weibo crawler runs at all
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Raw Cookie header value for weibo requests.
    /// Searches run logged-out when empty, which usually returns less.
    #[serde(default)]
    pub cookie: String,

    /// Pages fetched per keyword on each endpoint
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Resolve external links found in post bodies
    #[serde(default = "defaults::enabled")]
    pub resolve_links: bool,
}

impl Default for WeiboConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie: String::new(),
            max_pages: defaults::max_pages(),
            resolve_links: true,
        }
    }
}

/// Zhihu search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZhihuConfig {
    /// Whether the zhihu crawler runs at all
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Run the browser headless
    #[serde(default = "defaults::enabled")]
    pub headless: bool,

    /// Result cards consumed per keyword
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Navigation timeout in milliseconds
    #[serde(default = "defaults::goto_timeout")]
    pub goto_timeout_ms: u64,

    /// Navigation attempts before giving up on a URL
    #[serde(default = "defaults::goto_retries")]
    pub goto_retries: u32,

    /// How long to poll for the result-card selector, in milliseconds
    #[serde(default = "defaults::selector_timeout")]
    pub selector_timeout_ms: u64,

    /// CSS selector matching one search-result card
    #[serde(default = "defaults::card_selector")]
    pub card_selector: String,

    /// CSS selector for the title link inside a card
    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    /// CSS selector for the author inside a card
    #[serde(default = "defaults::author_selector")]
    pub author_selector: String,

    /// CSS selector for the excerpt inside a card
    #[serde(default = "defaults::excerpt_selector")]
    pub excerpt_selector: String,

    /// Substrings that mark a page as a login/captcha/risk-control wall
    #[serde(default = "defaults::red_flags")]
    pub red_flags: Vec<String>,
}

impl Default for ZhihuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            max_results: defaults::max_results(),
            goto_timeout_ms: defaults::goto_timeout(),
            goto_retries: defaults::goto_retries(),
            selector_timeout_ms: defaults::selector_timeout(),
            card_selector: defaults::card_selector(),
            title_selector: defaults::title_selector(),
            author_selector: defaults::author_selector(),
            excerpt_selector: defaults::excerpt_selector(),
            red_flags: defaults::red_flags(),
        }
    }
}

/// Xiaohongshu workflow API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XiaohongshuConfig {
    /// Whether the xiaohongshu crawler runs at all.
    /// Off by default because it needs an API token.
    #[serde(default)]
    pub enabled: bool,

    /// Workflow API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Workflow to run; its output is the list of matching notes
    #[serde(default)]
    pub workflow_id: String,

    /// Bearer token; `MEDIAWATCH_API_TOKEN` overrides this
    #[serde(default)]
    pub api_token: String,
}

impl Default for XiaohongshuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: defaults::api_base(),
            workflow_id: String::new(),
            api_token: String::new(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36"
            .into()
    }
    pub fn mobile_user_agent() -> String {
        "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/90.0.4430.91 Mobile Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn delay_min() -> u64 {
        2000
    }
    pub fn delay_max() -> u64 {
        4000
    }
    pub fn keyword_delay_min() -> u64 {
        4000
    }
    pub fn keyword_delay_max() -> u64 {
        8000
    }

    // Path defaults
    pub fn data_dir() -> String {
        "data".into()
    }
    pub fn debug_dir() -> String {
        "debug".into()
    }
    pub fn state_file() -> String {
        "storage_state.json".into()
    }

    // Keyword defaults
    pub fn keywords() -> Vec<String> {
        [
            "自动化学会",
            "王飞跃",
            "范丽丽",
            "杨孟飞",
            "郑南宁",
            "张楠",
            "高会军",
            "侯增广",
            "孙彦广",
            "辛景民",
            "阳春华",
            "袁利",
            "张承慧",
            "赵延龙",
            "周杰",
            "陈杰",
            "戴琼海",
            "桂卫华",
            "郭雷",
            "何友",
            "蒋昌俊",
            "李少远",
            "钱锋",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    // Weibo defaults
    pub fn max_pages() -> u32 {
        5
    }

    // Zhihu defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn max_results() -> usize {
        30
    }
    pub fn goto_timeout() -> u64 {
        180_000
    }
    pub fn goto_retries() -> u32 {
        3
    }
    pub fn selector_timeout() -> u64 {
        15_000
    }
    pub fn card_selector() -> String {
        ".ContentItem, .SearchResult-Card, .List-item".into()
    }
    pub fn title_selector() -> String {
        "a[href*='/question/'], a[href*='/p/']".into()
    }
    pub fn author_selector() -> String {
        ".AuthorInfo-name, .UserLink-link".into()
    }
    pub fn excerpt_selector() -> String {
        ".RichContent-inner, .ContentItem-excerpt".into()
    }
    pub fn red_flags() -> Vec<String> {
        [
            "安全验证",
            "验证码",
            "异常访问",
            "风险",
            "robot",
            "SignFlow",
            "signin",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    // Xiaohongshu defaults
    pub fn api_base() -> String {
        "https://api.coze.cn".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_delay_range() {
        let mut config = Config::default();
        config.crawler.delay_min_ms = 5000;
        config.crawler.delay_max_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_enabled_xiaohongshu_without_token() {
        let mut config = Config::default();
        config.xiaohongshu.enabled = true;
        config.xiaohongshu.workflow_id = "12345".to_string();
        config.xiaohongshu.api_token = String::new();
        assert!(config.validate().is_err());

        config.xiaohongshu.api_token = "tok".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            keywords = ["量子计算"]

            [weibo]
            max_pages = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.keywords, vec!["量子计算"]);
        assert_eq!(config.weibo.max_pages, 2);
        assert_eq!(config.zhihu.max_results, 30);
        assert!(config.zhihu.headless);
        assert!(!config.xiaohongshu.enabled);
    }

    #[test]
    fn clean_keywords_drops_blanks() {
        let mut config = Config::default();
        config.keywords = vec![" 张楠 ".into(), "".into(), "  ".into()];
        assert_eq!(config.clean_keywords(), vec!["张楠"]);
    }
}
