//! Chromium over the DevTools protocol via `chromiumoxide`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    BrowserError, BrowserSession, PAGE_SELECTOR, PageHandle, ScrollMetrics, SessionLauncher,
};
use crate::config::EngineConfig;
use crate::user_agent::browser_user_agent_arg;

/// Environment override for the browser binary.
pub const CHROMIUM_PATH_ENV: &str = "SCRIBD_CHROMIUM_PATH";

const SCROLL_METRICS_SCRIPT: &str = "({\
    offset: Math.round(window.pageYOffset || document.documentElement.scrollTop || 0), \
    viewport_height: Math.round(window.innerHeight || 0), \
    scroll_height: Math.round(document.body ? document.body.scrollHeight : 0)})";

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Locates a Chromium binary: env override, configured path, `PATH`, then the
/// usual macOS install.
#[must_use]
pub fn find_chromium(config: &EngineConfig) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(path) = &config.chrome_path
        && path.exists()
    {
        return Some(path.clone());
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: EngineConfig,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, chrome_path: PathBuf) -> Result<BrowserConfig, BrowserError> {
        let config = &self.config;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.window_width, config.window_height)
            .viewport(None)
            .request_timeout(config.navigation_timeout)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .arg("--disable-extensions")
            .arg(format!(
                "--window-size={},{}",
                config.window_width, config.window_height
            ))
            .arg(browser_user_agent_arg());
        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let chrome_path = find_chromium(&self.config).ok_or(BrowserError::NotFound)?;
        debug!(path = %chrome_path.display(), "launching Chromium");
        let browser_config = self.browser_config(chrome_path)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    debug!(%error, "browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(error) => {
                handler_task.abort();
                return Err(BrowserError::Launch(format!("failed to open tab: {error}")));
            }
        };
        info!("browser session ready");

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            page: Some(page),
            handler_task: Some(handler_task),
            navigation_timeout: self.config.navigation_timeout,
            pages: Vec::new(),
        }))
    }
}

/// One Chromium process with a single tab.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    navigation_timeout: Duration,
    /// Page elements from the last `page_handles` call.
    pages: Vec<Element>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Script("session already closed".to_string()))
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, BrowserError> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(format!("unexpected script result: {e:?}")))
    }

    fn element(&self, handle: &PageHandle) -> Result<&Element, BrowserError> {
        handle
            .index()
            .checked_sub(1)
            .and_then(|slot| self.pages.get(slot))
            .ok_or_else(|| BrowserError::Capture {
                index: handle.index(),
                reason: "page element is no longer attached".to_string(),
            })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let page = self.page()?;
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {
                if let Err(error) = page.wait_for_navigation().await {
                    debug!(%error, "wait for navigation");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!(
                    "timed out after {}s",
                    self.navigation_timeout.as_secs()
                ),
            }),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let page = self.page()?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn run_script(&mut self, script: &str) -> Result<(), BrowserError> {
        self.page()?
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, BrowserError> {
        self.evaluate(SCROLL_METRICS_SCRIPT).await
    }

    async fn scroll_to(&mut self, position: u64) -> Result<(), BrowserError> {
        self.run_script(&format!("window.scrollTo(0, {position});"))
            .await
    }

    async fn count_pages(&mut self) -> Result<usize, BrowserError> {
        self.evaluate(&format!(
            "document.querySelectorAll('{PAGE_SELECTOR}').length"
        ))
        .await
    }

    async fn page_handles(&mut self) -> Result<Vec<PageHandle>, BrowserError> {
        let elements = match self.page()?.find_elements(PAGE_SELECTOR).await {
            Ok(elements) => elements,
            Err(error) => {
                debug!(%error, "no page elements");
                Vec::new()
            }
        };
        self.pages = elements;
        Ok((1..=self.pages.len()).map(PageHandle::new).collect())
    }

    async fn scroll_into_view(&mut self, handle: &PageHandle) -> Result<(), BrowserError> {
        self.element(handle)?
            .scroll_into_view()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Capture {
                index: handle.index(),
                reason: e.to_string(),
            })
    }

    async fn print_page_pdf(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            landscape: Some(false),
            paper_width: Some(8.5),
            paper_height: Some(11.0),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            prefer_css_page_size: Some(true),
            page_ranges: Some("1".to_string()),
            ..Default::default()
        };
        self.page()?
            .pdf(params)
            .await
            .map_err(|e| BrowserError::Capture {
                index: handle.index(),
                reason: format!("print failed: {e}"),
            })
    }

    async fn screenshot_page_png(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError> {
        self.element(handle)?
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| BrowserError::Capture {
                index: handle.index(),
                reason: format!("screenshot failed: {e}"),
            })
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        self.page()?
            .content()
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.pages.clear();
        if let Some(page) = self.page.take()
            && let Err(error) = page.close().await
        {
            debug!(%error, "tab close");
        }
        let mut result = Ok(());
        if let Some(mut browser) = self.browser.take() {
            if let Err(error) = browser.close().await {
                warn!(%error, "browser close");
                result = Err(BrowserError::Launch(format!("failed to close browser: {error}")));
            }
            if let Err(error) = browser.wait().await {
                debug!(%error, "browser wait");
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        result
    }
}
