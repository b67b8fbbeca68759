//! Markup helpers for the embed page and page fragments.
//!
//! Selection uses `scraper`; image rewriting works on the raw fragment text
//! so everything outside `<img>` tags is written back byte-for-byte.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use url::Url;

use crate::utils::{compile_static_regex, compile_static_selector};

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("title"));
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("script"));
static STYLESHEET_SEL: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"link[rel~="stylesheet"]"#));
static STYLE_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("style"));
static OUTER_PAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.outer_page"));
static TEXT_SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("span.a"));
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("img"));

static IMG_TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<img\b[^>]*>"));
static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
});
static ORIG_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\sorig\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+)"#)
});

/// Media type assumed when an image response carries none.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Appended after the harvested CSS to center the page column.
pub const CENTERING_CSS: &str = "
body { background-color: #f4f4f4; display: flex; justify-content: center; }
.document_scroller { background-color: white; box-shadow: 0 0 10px rgba(0,0,0,0.1); padding: 20px; }
.outer_page { margin-bottom: 10px; }
";

/// Closes the scroller container opened by [`document_head`].
pub const DOCUMENT_TAIL: &str = "\n</div>\n</body>\n</html>";

/// Everything the retriever needs from the embed page, extracted up front.
#[derive(Debug, Clone, Default)]
pub struct EmbedMarkup {
    pub title: Option<String>,
    /// Script bodies in document order, empty ones dropped.
    pub scripts: Vec<String>,
    /// Absolute stylesheet URLs.
    pub stylesheet_urls: Vec<String>,
    pub inline_styles: Vec<String>,
    /// Outer HTML of pages already rendered into the embed page.
    pub outer_pages: Vec<String>,
}

impl EmbedMarkup {
    /// Parses the embed page. `base` resolves relative stylesheet links.
    #[must_use]
    pub fn parse(html: &str, base: &Url) -> Self {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE_SEL)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let scripts = document
            .select(&SCRIPT_SEL)
            .map(|el| el.text().collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .collect();

        let stylesheet_urls = document
            .select(&STYLESHEET_SEL)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .map(String::from)
            .collect();

        let inline_styles = document
            .select(&STYLE_SEL)
            .map(|el| el.text().collect::<String>())
            .filter(|css| !css.trim().is_empty())
            .collect();

        let outer_pages = document.select(&OUTER_PAGE_SEL).map(|el| el.html()).collect();

        Self {
            title,
            scripts,
            stylesheet_urls,
            inline_styles,
            outer_pages,
        }
    }
}

/// Text of every `span.a` in a page fragment, in document order.
#[must_use]
pub fn text_spans(fragment: &str) -> Vec<String> {
    Html::parse_fragment(fragment)
        .select(&TEXT_SPAN_SEL)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// Absolute URLs of every `<img src>` in `fragment`, first occurrence order, deduplicated.
#[must_use]
pub fn image_sources(fragment: &str, base: &Url) -> Vec<String> {
    let mut seen = Vec::new();
    let parsed = Html::parse_fragment(fragment);
    for img in parsed.select(&IMG_SEL) {
        if let Some(url) = img
            .value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .and_then(|src| absolutize(base, src))
            && !seen.contains(&url)
        {
            seen.push(url);
        }
    }
    seen
}

/// Rewrites every `<img>` with a `src`: the source becomes its replacement
/// (or its absolute URL when none is known) and any `orig` attribute is dropped.
#[must_use]
pub fn rewrite_images(fragment: &str, base: &Url, replacements: &HashMap<String, String>) -> String {
    IMG_TAG_RE
        .replace_all(fragment, |caps: &Captures<'_>| {
            let tag = &caps[0];
            let Some(absolute) = src_of(tag).and_then(|src| absolutize(base, &src)) else {
                return tag.to_string();
            };
            let new_src = replacements
                .get(&absolute)
                .map_or(absolute.as_str(), String::as_str)
                .replace('"', "&quot;");
            let without_orig = ORIG_ATTR_RE.replace_all(tag, "");
            SRC_ATTR_RE
                .replace(&without_orig, |_: &Captures<'_>| format!(" src=\"{new_src}\""))
                .into_owned()
        })
        .into_owned()
}

/// `data:` URI for an image body.
#[must_use]
pub fn data_uri(bytes: &[u8], content_type: Option<&str>) -> String {
    let mime = content_type.unwrap_or(DEFAULT_IMAGE_MIME);
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Wraps one page fragment in the standard page container.
#[must_use]
pub fn wrap_page(ordinal: usize, fragment: &str) -> String {
    format!(
        "\n<div class=\"outer_page\" id=\"outer_page_{ordinal}\" style=\"margin-bottom: 10px; border: 1px solid #ccc;\">\n{fragment}\n</div>\n"
    )
}

/// Document prologue up to and including the opened scroller container.
#[must_use]
pub fn document_head(title: &str, css: &str) -> String {
    let title = escape_text(title);
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title>\n<style>{css}\n{CENTERING_CSS}</style>\n</head>\n<body>\n<div class=\"document_scroller\">\n"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Stylesheet block with its provenance comment.
#[must_use]
pub fn sourced_css(url: &str, css: &str) -> String {
    format!("\n/* Source: {url} */\n{css}")
}

/// Entity-decoded `src` of a single `<img>` tag.
fn src_of(tag: &str) -> Option<String> {
    let parsed = Html::parse_fragment(tag);
    let value = parsed.select(&IMG_SEL).next()?.value().attr("src")?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn absolutize(base: &Url, src: &str) -> Option<String> {
    if src.starts_with("data:") {
        return None;
    }
    base.join(src).ok().map(String::from)
}
