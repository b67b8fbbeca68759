//! Browser automation for dynamic capture.
//!
//! The engine talks to a live browser only through [`BrowserSession`], one
//! exclusively owned session per run. [`ChromiumLauncher`] starts a real
//! Chromium over the DevTools protocol; tests script the trait directly.
//!
//! On top of the session sit the [`LazyLoadDriver`], which scrolls until
//! every page has materialized, and the [`PageCapturer`], which turns each
//! page into a single-page PDF with retry, fallback, and placeholder.

mod capture;
mod chromium;
mod lazy_load;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use capture::{CaptureOutcome, PageCapturer};
pub use chromium::{ChromiumLauncher, find_chromium};
pub use lazy_load::{LazyLoadDriver, LoadReport};

/// CSS class of one rendered document page.
pub const PAGE_SELECTOR: &str = ".outer_page";

/// Container that appears once the embed viewer has booted.
pub const CONTENT_SELECTOR: &str = ".document_scroller";

/// Accepts the consent banner, then hides consent dialogs and both toolbars.
pub const DISMISS_OVERLAYS_SCRIPT: &str = r"
(function() {
  try {
    document.querySelectorAll('.osano-cm-accept-all, .osano-cm-accept, .osano-cm-save, button[class*=\x22osano-cm-accept\x22]')
      .forEach(function(btn) { btn.click(); });
  } catch (e) {}
  setTimeout(function() {
    ['.osano-cm-window__dialog', '.osano-cm-dialog', '.osano-cm-window',
     '.osano-cm-info-dialog-header', 'div[id^=\x22osano-cm-window\x22]'].forEach(function(sel) {
      document.querySelectorAll(sel).forEach(function(el) {
        el.style.setProperty('display', 'none', 'important');
        el.style.setProperty('visibility', 'hidden', 'important');
        el.style.setProperty('opacity', '0', 'important');
        el.style.setProperty('z-index', '-9999', 'important');
      });
    });
    document.querySelectorAll('.toolbar_top, .toolbar_bottom').forEach(function(el) {
      el.style.setProperty('display', 'none', 'important');
      el.style.setProperty('visibility', 'hidden', 'important');
    });
  }, 500);
  return true;
})()
";

/// Errors from the browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no Chromium executable found (set SCRIBD_CHROMIUM_PATH or --chrome-path)")]
    NotFound,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("capture of page {index} failed: {reason}")]
    Capture { index: usize, reason: String },

    /// Screenshot could not be turned into a PDF page.
    #[error("image conversion failed: {0}")]
    Conversion(String),
}

/// Reference to one materialized page inside the live session.
///
/// Only meaningful to the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageHandle {
    index: usize,
}

impl PageHandle {
    /// `index` is 1-based.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Vertical scroll state of the viewport, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
pub struct ScrollMetrics {
    pub offset: u64,
    pub viewport_height: u64,
    pub scroll_height: u64,
}

/// One live browser tab driven by the engine.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Waits until `selector` matches. `Ok(false)` on timeout.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError>;

    /// Runs a script for its side effects.
    async fn run_script(&mut self, script: &str) -> Result<(), BrowserError>;

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, BrowserError>;

    async fn scroll_to(&mut self, position: u64) -> Result<(), BrowserError>;

    /// Number of materialized page elements.
    async fn count_pages(&mut self) -> Result<usize, BrowserError>;

    /// Handles for every materialized page, in document order.
    async fn page_handles(&mut self) -> Result<Vec<PageHandle>, BrowserError>;

    async fn scroll_into_view(&mut self, handle: &PageHandle) -> Result<(), BrowserError>;

    /// Prints the current view as a one-page 8.5x11in PDF with zero margins.
    async fn print_page_pdf(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError>;

    /// PNG screenshot of the page element.
    async fn screenshot_page_png(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError>;

    /// Serialized DOM of the whole document.
    async fn page_source(&mut self) -> Result<String, BrowserError>;

    /// Releases the tab and the browser process. Safe to call more than once.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Starts browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[cfg(test)]
pub(crate) mod scripted;
