//! Per-page capture with retry, raster fallback, and placeholder.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::{BrowserError, BrowserSession, PageHandle};
use crate::assemble::{PageArtifact, image_to_pdf};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::Reporter;

/// Pages captured by one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// One artifact per handle processed, in handle order.
    pub artifacts: Vec<PageArtifact>,
    pub placeholders: usize,
    pub stopped: bool,
}

/// Turns each materialized page into a one-page PDF.
///
/// Every attempt first prints the page and, if that fails, screenshots it
/// and lays the image out as a page. After `attempts` failed attempts the
/// page becomes a placeholder so the output keeps its page count.
#[derive(Debug, Clone)]
pub struct PageCapturer {
    attempts: u32,
    retry_delay: Duration,
    settle_delay: Duration,
    reporter: Reporter,
}

impl PageCapturer {
    #[must_use]
    pub fn new(config: &EngineConfig, reporter: Reporter) -> Self {
        Self {
            attempts: config.capture_attempts.max(1),
            retry_delay: config.capture_retry_delay,
            settle_delay: config.settle_delay,
            reporter,
        }
    }

    /// Captures `handles` in order, polling `token` before each page.
    #[instrument(skip_all, fields(pages = handles.len()))]
    pub async fn capture_all(
        &self,
        session: &mut dyn BrowserSession,
        handles: &[PageHandle],
        token: &CancellationToken,
    ) -> CaptureOutcome {
        let total = handles.len();
        let mut outcome = CaptureOutcome {
            artifacts: Vec::with_capacity(total),
            placeholders: 0,
            stopped: false,
        };

        for handle in handles {
            if token.is_cancelled() {
                self.reporter.info("PDF generation stopped by user.");
                outcome.stopped = true;
                break;
            }
            self.reporter
                .info(format!("Capturing page {}/{total}...", handle.index()));
            let artifact = self.capture(session, handle).await;
            if artifact.is_placeholder {
                outcome.placeholders += 1;
            }
            outcome.artifacts.push(artifact);
        }
        outcome
    }

    /// Captures one page. Never fails; exhaustion yields a placeholder.
    pub async fn capture(&self, session: &mut dyn BrowserSession, handle: &PageHandle) -> PageArtifact {
        let index = handle.index();
        if let Err(error) = session.scroll_into_view(handle).await {
            debug!(index, %error, "scroll into view failed");
        }
        tokio::time::sleep(self.settle_delay).await;

        for attempt in 1..=self.attempts {
            match self.attempt(session, handle).await {
                Ok(artifact) => return artifact,
                Err(error) => {
                    warn!(index, attempt, %error, "capture attempt failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let exhausted = EngineError::CaptureExhausted {
            index,
            attempts: self.attempts,
        };
        self.reporter
            .warn(format!("{exhausted}; inserting placeholder"));
        PageArtifact::placeholder(index)
    }

    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        handle: &PageHandle,
    ) -> Result<PageArtifact, BrowserError> {
        let index = handle.index();
        match session.print_page_pdf(handle).await {
            Ok(bytes) => return Ok(PageArtifact::printed(index, bytes)),
            Err(error) => debug!(index, %error, "print failed, falling back to screenshot"),
        }
        let png = session.screenshot_page_png(handle).await?;
        let bytes = image_to_pdf(&png).map_err(|e| BrowserError::Conversion(e.to_string()))?;
        Ok(PageArtifact::rasterized(index, bytes))
    }
}
