//! Incremental scrolling until the page count stops growing.

use std::time::Duration;

use tracing::{debug, instrument};

use super::{BrowserError, BrowserSession};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::events::Reporter;

/// How a lazy-load pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub page_count: usize,
    pub increments: u32,
    pub stopped: bool,
}

/// Scrolls the viewport in fixed steps so the viewer materializes every page.
///
/// The pass ends when the scroll position reaches the document height, or
/// when the viewport touches the bottom and the page count has not grown for
/// `stability_threshold` consecutive increments.
#[derive(Debug, Clone)]
pub struct LazyLoadDriver {
    step_px: u64,
    pause: Duration,
    stability_threshold: u32,
    reporter: Reporter,
}

impl LazyLoadDriver {
    #[must_use]
    pub fn new(config: &EngineConfig, reporter: Reporter) -> Self {
        Self {
            step_px: u64::from(config.scroll_step_px.max(1)),
            pause: config.scroll_pause,
            stability_threshold: config.stability_threshold,
            reporter,
        }
    }

    /// Scrolls until every page is loaded or the token trips.
    ///
    /// # Errors
    ///
    /// Propagates scroll and metric failures from the session. Page counting
    /// failures count as zero pages.
    #[instrument(skip_all)]
    pub async fn load_all(
        &self,
        session: &mut dyn BrowserSession,
        token: &CancellationToken,
    ) -> Result<LoadReport, BrowserError> {
        self.reporter.info("Loading all pages...");
        let mut position: u64 = 0;
        let mut stable: u32 = 0;
        let mut report = LoadReport {
            page_count: self.count(session).await,
            increments: 0,
            stopped: false,
        };

        loop {
            if token.is_cancelled() {
                self.reporter.info("Page loading stopped by user.");
                report.stopped = true;
                return Ok(report);
            }

            let before = self.count(session).await;
            position += self.step_px;
            session.scroll_to(position).await?;
            tokio::time::sleep(self.pause).await;
            let after = self.count(session).await;
            report.increments += 1;
            report.page_count = after;

            if after > before {
                stable = 0;
                self.reporter.info(format!("Loaded {after} pages..."));
            } else {
                stable += 1;
            }

            let metrics = session.scroll_metrics().await?;
            debug!(position, stable, ?metrics, "scroll increment");
            let at_bottom = metrics.offset + metrics.viewport_height >= metrics.scroll_height;
            if (at_bottom && stable >= self.stability_threshold) || position >= metrics.scroll_height
            {
                break;
            }
        }

        self.reporter
            .info(format!("Finished loading {} pages", report.page_count));
        Ok(report)
    }

    async fn count(&self, session: &mut dyn BrowserSession) -> usize {
        match session.count_pages().await {
            Ok(count) => count,
            Err(error) => {
                debug!(%error, "page count unavailable");
                0
            }
        }
    }
}
