// src/browser.rs

//! Chromium session management.
//!
//! Wraps chromiumoxide with the pieces every browser-driven crawl
//! needs: launch flags, an event handler task, an anti-automation init
//! script, cookie persistence, and debug dumps (screenshot + HTML) for
//! diagnosing captcha walls and DOM drift.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::ScreenshotParams;
use chrono::Local;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Lowers the odds of being flagged as automation. Does not defeat
/// real risk-control checks.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    window.chrome = { runtime: {} };
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

/// A cookie as persisted in the session state file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// Load persisted cookies, or an empty list if the file is absent.
pub fn load_state(path: &Path) -> Result<Vec<StoredCookie>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// A launched browser plus its event-handler task.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    user_agent: String,
    cookies: Vec<StoredCookie>,
}

impl BrowserSession {
    /// Launch Chromium and start draining its event stream.
    ///
    /// Session cookies are read from the configured state file and
    /// replayed onto every page this session opens.
    pub async fn launch(config: &Config, headless: bool) -> Result<Self> {
        let state_path = PathBuf::from(&config.paths.state_file);
        let cookies = load_state(&state_path)?;
        if cookies.is_empty() {
            log::warn!(
                "No session state at {} (searches may run logged-out)",
                state_path.display()
            );
        } else {
            log::info!("Loaded {} cookies from {}", cookies.len(), state_path.display());
        }

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 800)
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if !headless {
            builder = builder.with_head();
        }

        let browser_config = builder.build().map_err(AppError::Browser)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::browser(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            handler_task,
            user_agent: config.crawler.user_agent.clone(),
            cookies,
        })
    }

    /// Open a blank page with the user agent, stealth script and
    /// session cookies applied.
    pub async fn new_page(&self) -> Result<Page> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::browser(format!("failed to open page: {e}")))?;

        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(|e| AppError::browser(format!("failed to set user agent: {e}")))?;

        page.evaluate_on_new_document(STEALTH_SCRIPT)
            .await
            .map_err(|e| AppError::browser(format!("failed to inject init script: {e}")))?;

        for cookie in &self.cookies {
            let param = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .build()
                .map_err(AppError::Browser)?;
            if let Err(e) = page.set_cookie(param).await {
                log::debug!("Failed to set cookie {}: {}", cookie.name, e);
            }
        }

        Ok(page)
    }

    /// Persist the page's cookies to the given state file.
    pub async fn save_state(&self, page: &Page, path: &Path) -> Result<()> {
        let cookies: Vec<StoredCookie> = page
            .get_cookies()
            .await
            .map_err(|e| AppError::browser(format!("failed to read cookies: {e}")))?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
            })
            .collect();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&cookies)?)?;
        log::info!("Saved {} cookies to {}", cookies.len(), path.display());
        Ok(())
    }

    /// Close the browser and wait for the handler task to drain.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::debug!("Browser close failed: {}", e);
        }
        let _ = self.handler_task.await;
    }
}

/// Save a full-page screenshot and the page HTML under the debug
/// directory, named `{prefix}_{timestamp}`.
///
/// Never fails the crawl; dump errors are logged and swallowed.
pub async fn save_debug(page: &Page, debug_dir: &Path, prefix: &str, reason: &str) {
    if let Err(e) = std::fs::create_dir_all(debug_dir) {
        log::warn!("Failed to create debug dir {}: {}", debug_dir.display(), e);
        return;
    }

    let base = format!("{}_{}", prefix, Local::now().format("%Y%m%d_%H%M%S"));

    match page
        .screenshot(ScreenshotParams::builder().full_page(true).build())
        .await
    {
        Ok(bytes) => {
            let png_path = debug_dir.join(format!("{base}.png"));
            if let Err(e) = std::fs::write(&png_path, bytes) {
                log::warn!("Failed to write {}: {}", png_path.display(), e);
            }
        }
        Err(e) => log::warn!("Screenshot failed: {}", e),
    }

    match page.content().await {
        Ok(html) => {
            let html_path = debug_dir.join(format!("{base}.html"));
            if let Err(e) = std::fs::write(&html_path, html) {
                log::warn!("Failed to write {}: {}", html_path.display(), e);
            }
        }
        Err(e) => log::warn!("Failed to read page HTML: {}", e),
    }

    log::warn!("Saved debug files {base}.png / {base}.html. {reason}");
}

/// Marker that only renders for signed-in zhihu users.
const LOGGED_IN_SELECTOR: &str = ".AppHeader-profileAvatar, .Avatar.AppHeader-profileAvatar";

/// How long the operator gets to finish the QR-code login.
const LOGIN_WAIT_SECS: u64 = 180;

/// Interactive login capture.
///
/// Opens a visible browser on the zhihu sign-in page, waits for the
/// operator to scan the QR code, then saves the session cookies to the
/// configured state file. Cookies are saved even if the signed-in
/// marker never shows up, so a partially completed login still leaves
/// usable state behind.
pub async fn capture_login(config: &Config) -> Result<()> {
    let session = BrowserSession::launch(config, false).await?;
    let page = session.new_page().await?;

    page.goto("https://www.zhihu.com/signin")
        .await
        .map_err(|e| AppError::browser(format!("failed to open sign-in page: {e}")))?;

    log::info!(
        "Scan the QR code in the browser window. Waiting up to {}s...",
        LOGIN_WAIT_SECS
    );

    let check = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(LOGGED_IN_SELECTOR)?
    );
    let mut logged_in = false;
    for _ in 0..(LOGIN_WAIT_SECS / 2) {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let found = page
            .evaluate(check.as_str())
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if found {
            logged_in = true;
            break;
        }
    }

    if logged_in {
        log::info!("Login detected");
    } else {
        log::warn!("No signed-in marker after {}s; saving cookies anyway", LOGIN_WAIT_SECS);
    }

    session
        .save_state(&page, Path::new(&config.paths.state_file))
        .await?;
    session.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_state_missing_file_is_empty() {
        let cookies = load_state(Path::new("definitely/not/here.json")).unwrap();
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_stored_cookie_round_trip() {
        let cookies = vec![StoredCookie {
            name: "z_c0".to_string(),
            value: "token".to_string(),
            domain: ".zhihu.com".to_string(),
            path: "/".to_string(),
        }];

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, serde_json::to_string_pretty(&cookies).unwrap()).unwrap();

        assert_eq!(load_state(&path).unwrap(), cookies);
    }

    #[test]
    fn test_load_state_rejects_garbage() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_state(&path).is_err());
    }
}
