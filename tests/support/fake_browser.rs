//! In-memory browser session with a fixed number of rendered pages.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scribd_core::assemble::pdf::text_page_pdf;
use scribd_core::{BrowserError, BrowserSession, PageHandle, ScrollMetrics, SessionLauncher};

/// Observations shared with the test after the session is handed to the engine.
#[derive(Debug, Default)]
pub struct CallLog {
    pub closed: AtomicBool,
    pub prints: AtomicU32,
}

pub struct FakeSession {
    pages: usize,
    position: u64,
    broken_pages: HashSet<usize>,
    calls: Arc<CallLog>,
}

impl FakeSession {
    pub fn new(pages: usize) -> (Self, Arc<CallLog>) {
        let calls = Arc::new(CallLog::default());
        (
            Self {
                pages,
                position: 0,
                broken_pages: HashSet::new(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    /// Both capture methods fail for `index`.
    pub fn with_broken_page(mut self, index: usize) -> Self {
        self.broken_pages.insert(index);
        self
    }

    fn capture_error(index: usize) -> BrowserError {
        BrowserError::Capture {
            index,
            reason: "renderer crashed".to_string(),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: Duration,
    ) -> Result<bool, BrowserError> {
        Ok(true)
    }

    async fn run_script(&mut self, _script: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, BrowserError> {
        Ok(ScrollMetrics {
            offset: self.position.min(1200),
            viewport_height: 1080,
            scroll_height: 2280,
        })
    }

    async fn scroll_to(&mut self, position: u64) -> Result<(), BrowserError> {
        self.position = position;
        Ok(())
    }

    async fn count_pages(&mut self) -> Result<usize, BrowserError> {
        Ok(self.pages)
    }

    async fn page_handles(&mut self) -> Result<Vec<PageHandle>, BrowserError> {
        Ok((1..=self.pages).map(PageHandle::new).collect())
    }

    async fn scroll_into_view(&mut self, _handle: &PageHandle) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn print_page_pdf(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError> {
        self.calls.prints.fetch_add(1, Ordering::SeqCst);
        let index = handle.index();
        if self.broken_pages.contains(&index) {
            return Err(Self::capture_error(index));
        }
        text_page_pdf(&format!("Page {index}"), 612.0, 792.0)
            .map_err(|e| BrowserError::Conversion(e.to_string()))
    }

    async fn screenshot_page_png(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError> {
        Err(Self::capture_error(handle.index()))
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        Ok(format!(
            "<html><body><div class=\"document_scroller\">{}</div></body></html>",
            "<div class=\"outer_page\"></div>".repeat(self.pages)
        ))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.calls.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that hands out a single prepared session.
pub struct FakeLauncher {
    session: Mutex<Option<FakeSession>>,
}

impl FakeLauncher {
    pub fn new(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    /// A launcher whose every launch fails.
    pub fn unavailable() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        match session {
            Some(session) => Ok(Box::new(session)),
            None => Err(BrowserError::Launch("no browser available".to_string())),
        }
    }
}
