//! Callback payload extraction.
//!
//! Each descriptor URL returns a script of the form
//! `window.page<N>_callback(["<markup>"]);`. The sole argument is a JSON
//! array whose first string element is the page markup.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::utils::compile_static_regex;

static CALLBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?s)window\.page\d+_callback\((.*)\);"));

/// Malformed payload errors. The affected descriptor is skipped.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("no page callback wrapper in payload")]
    MissingCallback,

    #[error("callback argument is not valid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    /// The JSON array was empty or its first element was not a string.
    #[error("callback argument has no markup string")]
    MissingMarkup,
}

/// Returns the markup carried by a page callback script.
///
/// # Errors
///
/// Returns [`PayloadError`] when the wrapper is absent, its argument is not
/// JSON, or the first array element is not a string.
pub fn extract_payload(body: &str) -> Result<String, PayloadError> {
    let argument = CALLBACK_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .ok_or(PayloadError::MissingCallback)?
        .as_str();

    let value: serde_json::Value =
        serde_json::from_str(argument).map_err(|source| PayloadError::InvalidJson { source })?;

    value
        .as_array()
        .and_then(|items| items.first())
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or(PayloadError::MissingMarkup)
}
