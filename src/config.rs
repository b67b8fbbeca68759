//! Engine tunables.
//!
//! [`EngineConfig::default`] carries the production values. Tests shrink the
//! waits to keep scripted sessions fast.

use std::path::PathBuf;
use std::time::Duration;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Public host serving the embeddable document representation.
pub const DEFAULT_ENDPOINT_BASE: &str = "https://www.scribd.com";

/// Vertical distance scrolled per lazy-load increment.
pub const DEFAULT_SCROLL_STEP_PX: u32 = 800;

/// Pause after each scroll increment while pages materialize.
pub const DEFAULT_SCROLL_PAUSE: Duration = Duration::from_millis(1500);

/// Consecutive increments without new pages before the bottom is trusted.
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 3;

/// Capture attempts per page before a placeholder is emitted.
pub const DEFAULT_CAPTURE_ATTEMPTS: u32 = 3;

/// Browser launch attempts before the run is aborted.
pub const DEFAULT_DRIVER_INIT_ATTEMPTS: u32 = 3;

/// Complete tuning surface for a run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheme and host used to build the canonical embed endpoint.
    pub endpoint_base: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Base delay for embed page fetch backoff.
    pub fetch_retry_backoff: Duration,
    pub scroll_step_px: u32,
    pub scroll_pause: Duration,
    pub stability_threshold: u32,
    pub capture_attempts: u32,
    /// Wait between failed capture attempts of the same page.
    pub capture_retry_delay: Duration,
    /// Wait after scrolling a page element into view.
    pub settle_delay: Duration,
    pub driver_init_attempts: u32,
    /// Base delay for browser launch backoff.
    pub driver_init_backoff: Duration,
    pub navigation_timeout: Duration,
    /// How long to wait for the document container after navigation.
    pub content_wait: Duration,
    /// Wait after the cookie-banner dismissal script runs.
    pub banner_delay: Duration,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint_base: DEFAULT_ENDPOINT_BASE.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            fetch_retry_backoff: Duration::from_secs(1),
            scroll_step_px: DEFAULT_SCROLL_STEP_PX,
            scroll_pause: DEFAULT_SCROLL_PAUSE,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            capture_attempts: DEFAULT_CAPTURE_ATTEMPTS,
            capture_retry_delay: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            driver_init_attempts: DEFAULT_DRIVER_INIT_ATTEMPTS,
            driver_init_backoff: Duration::from_secs(2),
            navigation_timeout: Duration::from_secs(60),
            content_wait: Duration::from_secs(10),
            banner_delay: Duration::from_secs(1),
            headless: true,
            chrome_path: None,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

impl EngineConfig {
    /// Zero-wait configuration for scripted sessions and mock servers.
    #[must_use]
    pub fn without_delays() -> Self {
        Self {
            fetch_retry_backoff: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            capture_retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            driver_init_backoff: Duration::ZERO,
            content_wait: Duration::from_millis(50),
            banner_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Overrides the endpoint host (used to point the engine at a mirror or mock).
    #[must_use]
    pub fn with_endpoint_base(mut self, base: impl Into<String>) -> Self {
        self.endpoint_base = base.into().trim_end_matches('/').to_string();
        self
    }
}
