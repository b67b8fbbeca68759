//! HTTP fetching, retry policy, and output filenames.
//!
//! # Features
//!
//! - Streaming image downloads (memory-efficient for large page images)
//! - In-memory fetches for markup, callback payloads, and inlined images
//! - Configurable timeouts (30s connect, 5min read by default)
//! - Structured error types with full context
//! - Exponential backoff with jitter for transient failures

mod client;
pub mod constants;
mod error;
pub mod filename;
mod retry;

pub use client::{FetchedBytes, HttpClient};
pub use error::DownloadError;
pub use filename::sanitize_title;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
