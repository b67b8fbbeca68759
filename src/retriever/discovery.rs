//! Content descriptor discovery.
//!
//! Embed markup addresses each page payload with a `.jsonp` URL inside a
//! `<script>` body. Two encodings exist in the wild, each handled by one
//! [`DescriptorDiscovery`] implementation. Discoveries are consulted in
//! priority order and the first one that recognizes the scripts wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::utils::compile_static_regex;

/// Fixed extension of payload URLs.
const PAYLOAD_EXTENSION: &str = ".jsonp";

/// `contentUrl: "https://....jsonp"`, key optionally quoted, slashes possibly `\u002F`-escaped.
static CONTENT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"["']?contentUrl["']?\s*:\s*"(https?:(?://|\\u002F\\u002F)[^"]+?\.jsonp)""#,
    )
});

/// Start of an absolute URL inside a legacy callback script.
static URL_START_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"https?://"));

/// One discovered page payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub url: String,
    /// 1-based, in discovery order.
    pub ordinal: usize,
}

/// Relative precedence of discovery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiscoveryPriority {
    Legacy,
    Structured,
}

/// One encoding of payload URLs inside script bodies.
pub trait DescriptorDiscovery: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> DiscoveryPriority;

    /// True when `scripts` carry this encoding.
    fn can_handle(&self, scripts: &[String]) -> bool;

    /// Payload URLs in discovery order.
    fn discover(&self, scripts: &[String]) -> Vec<String>;
}

/// Inline callback scripts: the first absolute `...jsonp` URL of each script body.
#[derive(Debug, Default)]
pub struct LegacyInlineDiscovery;

impl DescriptorDiscovery for LegacyInlineDiscovery {
    fn name(&self) -> &'static str {
        "legacy-inline"
    }

    fn priority(&self) -> DiscoveryPriority {
        DiscoveryPriority::Legacy
    }

    fn can_handle(&self, scripts: &[String]) -> bool {
        scripts
            .iter()
            .any(|body| body.contains("window.page") && body.contains("_callback"))
    }

    fn discover(&self, scripts: &[String]) -> Vec<String> {
        scripts
            .iter()
            .filter_map(|body| {
                let start = URL_START_RE.find(body)?.start();
                let end = body[start..].find(PAYLOAD_EXTENSION)? + start + PAYLOAD_EXTENSION.len();
                Some(body[start..end].to_string())
            })
            .collect()
    }
}

/// Embed bootstrap scripts: every `contentUrl` value in every script body.
#[derive(Debug, Default)]
pub struct StructuredKeyDiscovery;

impl DescriptorDiscovery for StructuredKeyDiscovery {
    fn name(&self) -> &'static str {
        "structured-key"
    }

    fn priority(&self) -> DiscoveryPriority {
        DiscoveryPriority::Structured
    }

    fn can_handle(&self, scripts: &[String]) -> bool {
        scripts.iter().any(|body| CONTENT_URL_RE.is_match(body))
    }

    fn discover(&self, scripts: &[String]) -> Vec<String> {
        scripts
            .iter()
            .flat_map(|body| CONTENT_URL_RE.captures_iter(body))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().replace("\\u002F", "/"))
            .collect()
    }
}

/// The registered strategies, highest precedence first.
#[must_use]
pub fn default_discoveries() -> Vec<Box<dyn DescriptorDiscovery>> {
    let mut discoveries: Vec<Box<dyn DescriptorDiscovery>> =
        vec![Box::new(StructuredKeyDiscovery), Box::new(LegacyInlineDiscovery)];
    discoveries.sort_by_key(|d| d.priority());
    discoveries
}

/// Runs the first matching strategy and numbers its URLs from 1.
#[must_use]
pub fn discover_descriptors(
    discoveries: &[Box<dyn DescriptorDiscovery>],
    scripts: &[String],
) -> Vec<ContentDescriptor> {
    let Some(discovery) = discoveries.iter().find(|d| d.can_handle(scripts)) else {
        debug!("no discovery strategy recognized the scripts");
        return Vec::new();
    };

    let descriptors: Vec<ContentDescriptor> = discovery
        .discover(scripts)
        .into_iter()
        .enumerate()
        .map(|(i, url)| ContentDescriptor { url, ordinal: i + 1 })
        .collect();
    debug!(
        strategy = discovery.name(),
        count = descriptors.len(),
        "discovered content descriptors"
    );
    descriptors
}
