//! Chromium-backed challenge pages.
//!
//! Uses chromiumoxide (CDP) to open the target page, then runs small
//! scripts inside it: one pulls the challenge image through `fetch()` so the
//! page's session cookies apply, the other fills the input field.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info};

use super::page::{ChallengePage, FieldLocator, PageError};
use crate::config::BrowserSettings;

/// Interval between lookups while waiting for the challenge image.
const IMAGE_POLL_MS: u64 = 200;

/// Launches or connects to Chrome and opens challenge pages.
pub struct ChallengeBrowser {
    settings: BrowserSettings,
    browser: Option<Browser>,
}

impl ChallengeBrowser {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    const CHROME_NAMES: &'static [&'static str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];

    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: None,
        }
    }

    fn find_chrome(&self) -> Result<PathBuf> {
        if let Some(path) = &self.settings.chrome_path {
            return Ok(path.clone());
        }

        if let Some(path) = Self::CHROME_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
        {
            info!("Found Chrome at: {}", path.display());
            return Ok(path);
        }

        if let Some(path) = Self::CHROME_NAMES
            .iter()
            .find_map(|name| which::which(name).ok())
        {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it or set browser.chrome_path:\n\
             - Ubuntu/Debian: sudo apt install chromium-browser\n\
             - Fedora: sudo dnf install chromium\n\
             - Arch/Manjaro: sudo pacman -S chromium"
        ))
    }

    /// Launch or connect to the browser if not already running.
    pub async fn ensure_browser(&mut self) -> Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        if let Some(remote_url) = self.settings.remote_url.clone() {
            return self.connect_remote(&remote_url).await;
        }

        info!("Launching browser (headless={})", self.settings.headless);
        let mut builder = BrowserConfig::builder()
            .chrome_executable(self.find_chrome()?)
            .request_timeout(Duration::from_secs(self.settings.timeout_secs));

        // with_head means NOT headless
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        self.browser = Some(browser);
        Ok(())
    }

    /// Connect to a remote Chrome instance via its /json/version endpoint.
    async fn connect_remote(&mut self, url: &str) -> Result<()> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;
        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.settings.timeout_secs),
            ..Default::default()
        };
        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        self.browser = Some(browser);
        Ok(())
    }

    /// Open `url` and wrap it as a challenge page.
    pub async fn open(
        &mut self,
        url: &str,
        image_xpath: &str,
        image_wait: Duration,
    ) -> Result<BrowserChallengePage> {
        self.ensure_browser().await?;
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("browser not initialized after ensure_browser"))?;

        info!("Opening challenge page {}", url);
        let page = tokio::time::timeout(
            Duration::from_secs(self.settings.timeout_secs),
            browser.new_page(url),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Timed out opening {}", url))?
        .with_context(|| format!("Failed to open {}", url))?;

        if let Some(ref user_agent) = self.settings.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .context("Failed to set user agent")?;
        }

        Ok(BrowserChallengePage {
            page,
            image_xpath: image_xpath.to_string(),
            image_wait,
        })
    }

    /// Close the browser.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
        }
    }
}

/// Reply shape shared by the in-page scripts.
#[derive(Debug, Default, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    found: bool,
    data: Option<String>,
    error: Option<String>,
}

/// An open page showing a challenge.
pub struct BrowserChallengePage {
    page: Page,
    image_xpath: String,
    image_wait: Duration,
}

impl BrowserChallengePage {
    async fn run(&self, script: String) -> Result<ScriptReply, PageError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::Script(format!("unexpected script result: {}", e)))
    }

    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            debug!("Page close failed: {}", e);
        }
    }
}

/// JS string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn image_script(xpath: &str, wait: Duration) -> String {
    format!(
        r#"
        (async () => {{
            const deadline = Date.now() + {wait_ms};
            let img = null;
            while (true) {{
                img = document.evaluate({xpath}, document, null,
                    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                if (img || Date.now() >= deadline) break;
                await new Promise((resolve) => setTimeout(resolve, {poll_ms}));
            }}
            if (!img) return {{ found: false }};

            const src = img.currentSrc || img.src;
            if (!src) return {{ found: true, error: 'image has no src' }};
            try {{
                const response = await fetch(src, {{ credentials: 'include' }});
                if (!response.ok) {{
                    return {{ found: true, error: `HTTP ${{response.status}}: ${{response.statusText}}` }};
                }}
                const bytes = new Uint8Array(await response.arrayBuffer());
                let binary = '';
                for (let i = 0; i < bytes.length; i++) {{
                    binary += String.fromCharCode(bytes[i]);
                }}
                return {{ found: true, data: btoa(binary) }};
            }} catch (e) {{
                return {{ found: true, error: e.toString() }};
            }}
        }})()
        "#,
        wait_ms = wait.as_millis(),
        xpath = js_string(xpath),
        poll_ms = IMAGE_POLL_MS,
    )
}

fn fill_script(locator: &FieldLocator, text: &str) -> String {
    format!(
        r#"
        (() => {{
            const by = {by};
            const value = {value};
            let el = null;
            try {{
                if (by === 'id') {{
                    el = document.getElementById(value);
                }} else if (by === 'css') {{
                    el = document.querySelector(value);
                }} else {{
                    el = document.evaluate(value, document, null,
                        XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                }}
            }} catch (e) {{
                return {{ found: false, error: e.toString() }};
            }}
            if (!el) return {{ found: false }};

            el.focus();
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.value = {text};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ found: true }};
        }})()
        "#,
        by = js_string(locator.kind()),
        value = js_string(locator.value()),
        text = js_string(text),
    )
}

#[async_trait]
impl ChallengePage for BrowserChallengePage {
    async fn fetch_challenge_image(&self) -> Result<Option<Vec<u8>>, PageError> {
        let reply = self
            .run(image_script(&self.image_xpath, self.image_wait))
            .await?;

        if !reply.found {
            return Ok(None);
        }
        if let Some(error) = reply.error {
            return Err(PageError::ImageUnavailable(error));
        }

        use base64::Engine;
        let data = reply.data.unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| PageError::ImageUnavailable(format!("bad image payload: {}", e)))?;
        debug!("Fetched challenge image ({} bytes)", bytes.len());
        Ok(Some(bytes))
    }

    async fn fill_field(&self, locator: &FieldLocator, text: &str) -> Result<(), PageError> {
        let reply = self.run(fill_script(locator, text)).await?;
        match (reply.found, reply.error) {
            (true, _) => Ok(()),
            (false, Some(error)) => Err(PageError::Script(error)),
            (false, None) => Err(PageError::FieldNotFound(locator.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string(r#"a'b"c"#), r#""a'b\"c""#);
        assert_eq!(js_string("DWNL$ctl10"), r#""DWNL$ctl10""#);
    }

    #[test]
    fn test_fill_script_embeds_locator() {
        let script = fill_script(&FieldLocator::css_for_id("DWNL$ctl10"), "AB\"12");
        assert!(script.contains(r#"const by = "css";"#));
        assert!(script.contains(r##"const value = "#DWNL\\$ctl10";"##));
        assert!(script.contains(r#"el.value = "AB\"12";"#));
    }

    #[test]
    fn test_image_script_embeds_wait() {
        let script = image_script("//img[contains(@src, 'Captcha')]", Duration::from_secs(3));
        assert!(script.contains("Date.now() + 3000"));
        assert!(script.contains(r#""//img[contains(@src, 'Captcha')]""#));
    }

    #[test]
    fn test_script_reply_defaults() {
        let reply: ScriptReply = serde_json::from_str(r#"{"found": true}"#).unwrap();
        assert!(reply.found);
        assert!(reply.data.is_none());
    }

    #[test]
    fn test_explicit_chrome_path_wins() {
        let browser = ChallengeBrowser::new(BrowserSettings {
            chrome_path: Some(PathBuf::from("/custom/chrome")),
            ..BrowserSettings::default()
        });
        assert_eq!(browser.find_chrome().unwrap(), PathBuf::from("/custom/chrome"));
    }
}
