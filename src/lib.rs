//! Scribd Downloader Core Library
//!
//! This library reconstructs a paginated, dynamically-loaded remote document
//! into a single offline artifact: plain text, an image sequence, an HTML
//! document, or a page-accurate PDF.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`locator`] - Document reference parsing and canonical embed endpoint
//! - [`download`] - HTTP client, retry policy, and output filename helpers
//! - [`retriever`] - Static acquisition from per-page content descriptors
//! - [`browser`] - Browser session, lazy-load driver, and page capturer
//! - [`assemble`] - PDF page construction, merging, and scratch cleanup
//! - [`pipeline`] - Mode dispatch, run state machine, and tri-state outcomes
//!
//! Cross-cutting pieces:
//! - [`cancel`] - Cooperative cancellation token polled at suspension points
//! - [`events`] - Status event bus that front-ends subscribe to
//! - [`config`] - Engine tunables with production defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assemble;
pub mod browser;
pub mod cancel;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod locator;
pub mod pipeline;
pub mod retriever;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;
pub(crate) mod utils;

// Re-export commonly used types
pub use assemble::{AssembleError, Assembler, PageArtifact, PageKind, placeholder_pdf};
pub use browser::{
    BrowserError, BrowserSession, CaptureOutcome, ChromiumLauncher, LazyLoadDriver, PageCapturer,
    PageHandle, ScrollMetrics, SessionLauncher,
};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use download::{DownloadError, HttpClient, RetryDecision, RetryPolicy, sanitize_title};
pub use error::{EngineError, ErrorKind};
pub use events::{EventBus, Reporter, Severity, StatusEvent};
pub use locator::{DocumentReference, LocatorError, identify};
pub use pipeline::{Mode, OutputArtifact, RunOutcome, RunPhase, RunRequest, run};
pub use retriever::{ContentDescriptor, StaticRetriever};
