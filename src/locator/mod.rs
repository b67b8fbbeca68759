//! Document reference parsing.
//!
//! Three reference shapes are recognized, differing only in the path literal
//! in front of the numeric id:
//!
//! - `https://www.scribd.com/document/<id>/<slug>`
//! - `https://www.scribd.com/doc/<id>/<slug>`
//! - `https://www.scribd.com/embeds/<id>/content`
//!
//! All of them normalize to the embed endpoint, which renders the complete
//! document in one page.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::DEFAULT_ENDPOINT_BASE;
use crate::utils::compile_static_regex;

/// First numeric id following one of the recognized path literals.
static DOCUMENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?:doc|document|embeds)/(\d+)"));

/// Errors raised while identifying a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// No `doc/`, `document/`, or `embeds/` literal followed by digits.
    #[error("invalid document reference: {url}")]
    InvalidReference { url: String },
}

/// A parsed reference to one remote document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    raw_url: String,
    document_id: String,
}

impl DocumentReference {
    /// The reference exactly as supplied.
    #[must_use]
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Non-empty numeric id.
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Canonical embed endpoint on the public host.
    #[must_use]
    pub fn content_endpoint(&self) -> String {
        self.content_endpoint_at(DEFAULT_ENDPOINT_BASE)
    }

    /// Canonical embed endpoint on `base` (scheme and host, no trailing slash).
    #[must_use]
    pub fn content_endpoint_at(&self, base: &str) -> String {
        format!(
            "{}/embeds/{}/content",
            base.trim_end_matches('/'),
            self.document_id
        )
    }
}

/// Parses `raw_url` into a [`DocumentReference`].
///
/// # Errors
///
/// Returns [`LocatorError::InvalidReference`] when no recognized shape is found.
///
/// ```
/// use scribd_core::identify;
///
/// let reference = identify("https://www.scribd.com/document/799698609/Price-Action").unwrap();
/// assert_eq!(reference.document_id(), "799698609");
/// assert_eq!(
///     reference.content_endpoint(),
///     "https://www.scribd.com/embeds/799698609/content"
/// );
/// ```
#[instrument(level = "debug")]
pub fn identify(raw_url: &str) -> Result<DocumentReference, LocatorError> {
    let document_id = DOCUMENT_ID_RE
        .captures(raw_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| LocatorError::InvalidReference {
            url: raw_url.to_string(),
        })?;

    debug!(document_id = %document_id, "identified document");
    Ok(DocumentReference {
        raw_url: raw_url.to_string(),
        document_id,
    })
}
