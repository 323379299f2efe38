// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the domain from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}

/// Absolutize an href as found on zhihu search pages.
///
/// Handles the scheme-relative (`//www.zhihu.com/...`) and root-relative
/// (`/question/...`) forms; anything else passes through unchanged.
pub fn normalize_zhihu_url(href: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://www.zhihu.com{href}")
    } else {
        href.to_string()
    }
}

/// True for links that stay inside the weibo/sina ecosystem.
///
/// Those are detail pages and share shims, not external content worth
/// resolving.
pub fn is_weibo_internal(link: &str) -> bool {
    const INTERNAL: [&str; 3] = ["weibo.cn", "weibo.com", "sina.cn"];

    match get_domain(link) {
        Some(host) => INTERNAL
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}"))),
        None => INTERNAL.iter().any(|d| link.contains(d)),
    }
}

/// True for absolute http(s) URLs.
pub fn is_http(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://Example.COM/path"),
            Some("example.com".to_string())
        );
        assert_eq!(get_domain("not a url"), None);
    }

    #[test]
    fn test_normalize_zhihu_url() {
        assert_eq!(
            normalize_zhihu_url("//www.zhihu.com/question/1"),
            "https://www.zhihu.com/question/1"
        );
        assert_eq!(
            normalize_zhihu_url("/question/1"),
            "https://www.zhihu.com/question/1"
        );
        assert_eq!(
            normalize_zhihu_url("https://zhuanlan.zhihu.com/p/2"),
            "https://zhuanlan.zhihu.com/p/2"
        );
    }

    #[test]
    fn test_is_weibo_internal() {
        assert!(is_weibo_internal("https://m.weibo.cn/detail/123"));
        assert!(is_weibo_internal("https://weibo.com/detail/123"));
        assert!(is_weibo_internal("https://t.sina.cn/abc"));
        assert!(!is_weibo_internal("https://example.com/weibo"));
    }

    #[test]
    fn test_is_http() {
        assert!(is_http("https://example.com"));
        assert!(!is_http("//example.com"));
        assert!(!is_http("javascript:void(0)"));
    }
}
