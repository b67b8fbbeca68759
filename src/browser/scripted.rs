//! Deterministic in-memory browser session for unit tests.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};

use super::{BrowserError, BrowserSession, PageHandle, ScrollMetrics, SessionLauncher};
use crate::assemble::pdf::text_page_pdf;
use crate::cancel::CancellationToken;

/// Fixed document geometry.
#[derive(Debug, Clone, Copy)]
pub struct ScrollPlan {
    scroll_height: u64,
    viewport_height: u64,
}

impl ScrollPlan {
    pub fn fixed(scroll_height: u64, viewport_height: u64) -> Self {
        Self {
            scroll_height,
            viewport_height,
        }
    }
}

/// Everything the session observed, shared so tests can inspect it after
/// the session has been boxed and closed.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub navigations: Vec<String>,
    pub scripts: Vec<String>,
    pub scroll_positions: Vec<u64>,
    pub print_attempts: HashMap<usize, u32>,
    pub screenshot_attempts: HashMap<usize, u32>,
    pub closed: u32,
}

pub struct ScriptedSession {
    pages: usize,
    growth: Vec<usize>,
    scroll: ScrollPlan,
    position: u64,
    content_ready: bool,
    source: String,
    print_failures: HashSet<usize>,
    screenshot_failures: HashSet<usize>,
    cancel_at: Option<(usize, CancellationToken)>,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedSession {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            growth: Vec::new(),
            scroll: ScrollPlan::fixed(1000, 1080),
            position: 0,
            content_ready: true,
            source: "<html><body><div class=\"document_scroller\"></div></body></html>".to_string(),
            print_failures: HashSet::new(),
            screenshot_failures: HashSet::new(),
            cancel_at: None,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    /// Page counts reached after each successive scroll.
    pub fn with_page_growth(mut self, growth: Vec<usize>) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_scroll(mut self, plan: ScrollPlan) -> Self {
        self.scroll = plan;
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn without_content(mut self) -> Self {
        self.content_ready = false;
        self
    }

    /// Print always fails for `index`.
    pub fn failing_print(mut self, index: usize) -> Self {
        self.print_failures.insert(index);
        self
    }

    /// Screenshot always fails for `index`.
    pub fn failing_screenshot(mut self, index: usize) -> Self {
        self.screenshot_failures.insert(index);
        self
    }

    /// Trips `token` once page `index` has been printed.
    pub fn cancel_after_page(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((index, token));
        self
    }

    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.log)
    }

    pub fn scroll_positions(&self) -> Vec<u64> {
        self.with_log(|log| log.scroll_positions.clone())
    }

    pub fn print_attempts(&self, index: usize) -> u32 {
        self.with_log(|log| log.print_attempts.get(&index).copied().unwrap_or(0))
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut SessionLog) -> T) -> T {
        let mut guard = self.log.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

pub fn sample_png() -> Vec<u8> {
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(20, 30, Rgb([200, 180, 160]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap_or_else(|e| panic!("png encoding failed: {e}"));
    bytes.into_inner()
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.with_log(|log| log.navigations.push(url.to_string()));
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: Duration,
    ) -> Result<bool, BrowserError> {
        Ok(self.content_ready)
    }

    async fn run_script(&mut self, script: &str) -> Result<(), BrowserError> {
        self.with_log(|log| log.scripts.push(script.to_string()));
        Ok(())
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics, BrowserError> {
        let max_offset = self
            .scroll
            .scroll_height
            .saturating_sub(self.scroll.viewport_height);
        Ok(ScrollMetrics {
            offset: self.position.min(max_offset),
            viewport_height: self.scroll.viewport_height,
            scroll_height: self.scroll.scroll_height,
        })
    }

    async fn scroll_to(&mut self, position: u64) -> Result<(), BrowserError> {
        self.position = position;
        if !self.growth.is_empty() {
            self.pages = self.growth.remove(0);
        }
        self.with_log(|log| log.scroll_positions.push(position));
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
        let index = handle.index();
        self.with_log(|log| *log.print_attempts.entry(index).or_default() += 1);
        if self.print_failures.contains(&index) {
            return Err(BrowserError::Capture {
                index,
                reason: "print failed".to_string(),
            });
        }
        if let Some((at, token)) = &self.cancel_at
            && *at == index
        {
            token.cancel();
        }
        text_page_pdf(&format!("Page {index}"), 612.0, 792.0)
            .map_err(|e| BrowserError::Capture {
                index,
                reason: e.to_string(),
            })
    }

    async fn screenshot_page_png(&mut self, handle: &PageHandle) -> Result<Vec<u8>, BrowserError> {
        let index = handle.index();
        self.with_log(|log| *log.screenshot_attempts.entry(index).or_default() += 1);
        if self.screenshot_failures.contains(&index) {
            return Err(BrowserError::Capture {
                index,
                reason: "screenshot failed".to_string(),
            });
        }
        Ok(sample_png())
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        Ok(self.source.clone())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.with_log(|log| log.closed += 1);
        Ok(())
    }
}

/// Hands out one prepared session after `failures` failed launches.
pub struct ScriptedLauncher {
    session: Mutex<Option<ScriptedSession>>,
    failures: u32,
    missing_binary: bool,
    launches: AtomicU32,
}

impl ScriptedLauncher {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            failures: 0,
            missing_binary: false,
            launches: AtomicU32::new(0),
        }
    }

    pub fn failing(failures: u32, session: Option<ScriptedSession>) -> Self {
        Self {
            session: Mutex::new(session),
            failures,
            missing_binary: false,
            launches: AtomicU32::new(0),
        }
    }

    /// Every launch reports a missing browser binary.
    pub fn missing_binary() -> Self {
        Self {
            session: Mutex::new(None),
            failures: 0,
            missing_binary: true,
            launches: AtomicU32::new(0),
        }
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.missing_binary {
            return Err(BrowserError::NotFound);
        }
        if attempt <= self.failures {
            return Err(BrowserError::Launch(format!("launch {attempt} refused")));
        }
        let session = self
            .session
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or_else(|| BrowserError::Launch("no session prepared".to_string()))?;
        Ok(Box::new(session))
    }
}
