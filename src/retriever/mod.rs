//! Static acquisition from per-page content descriptors.
//!
//! The retriever fetches the embed page once, discovers the payload URL of
//! every page from its scripts, and feeds the descriptors in order to the
//! sink for the requested mode. One failing descriptor is logged and
//! skipped; the others still run. Cancellation is checked before each
//! descriptor, and the open output is always finalized.

mod discovery;
pub mod markup;
mod payload;
pub mod sinks;

use std::path::Path;

use tracing::{debug, info, instrument, warn};
use url::Url;

pub use discovery::{
    ContentDescriptor, DescriptorDiscovery, DiscoveryPriority, LegacyInlineDiscovery,
    StructuredKeyDiscovery, default_discoveries, discover_descriptors,
};
pub use payload::{PayloadError, extract_payload};
pub use sinks::{ContentSink, HtmlSink, ImageSink, SinkError, TextSink};

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::download::filename::fallback_title;
use crate::download::{
    DownloadError, HttpClient, RetryDecision, RetryPolicy, classify_error, sanitize_title,
};
use crate::error::EngineError;
use crate::events::Reporter;
use crate::locator::DocumentReference;
use crate::pipeline::OutputArtifact;

/// Output flavour of a static run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticMode {
    Text,
    Images,
    Html,
}

/// Result of a static run that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    /// `None` when every descriptor failed or the run stopped before any output.
    pub artifact: Option<OutputArtifact>,
    pub stopped: bool,
    pub processed: usize,
    pub skipped: usize,
}

/// Static-mode engine bound to one HTTP client.
pub struct StaticRetriever {
    client: HttpClient,
    config: EngineConfig,
    reporter: Reporter,
    discoveries: Vec<Box<dyn DescriptorDiscovery>>,
}

impl StaticRetriever {
    #[must_use]
    pub fn new(client: HttpClient, config: EngineConfig, reporter: Reporter) -> Self {
        Self {
            client,
            config,
            reporter,
            discoveries: default_discoveries(),
        }
    }

    /// Retrieves `reference` in `mode` into `output_dir`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Network`] when the embed page cannot be fetched
    /// - [`EngineError::NoContent`] when no descriptor (and, for HTML, no
    ///   inline page) is found
    /// - [`EngineError::Io`] when the output directory or file cannot be created
    #[instrument(skip(self, token), fields(document_id = %reference.document_id(), ?mode))]
    pub async fn retrieve(
        &self,
        reference: &DocumentReference,
        mode: StaticMode,
        output_dir: &Path,
        token: &CancellationToken,
    ) -> Result<Retrieval, EngineError> {
        if token.is_cancelled() {
            return Ok(Retrieval::stopped_before_start());
        }

        let endpoint = reference.content_endpoint_at(&self.config.endpoint_base);
        let base = Url::parse(&endpoint)
            .map_err(|_| EngineError::Network(DownloadError::invalid_url(&endpoint)))?;
        self.reporter.info(format!("Fetching document: {endpoint}"));
        let html = self.fetch_embed_page(&endpoint, token).await?;

        let embed = markup::EmbedMarkup::parse(&html, &base);
        let title = sanitize_title(
            &embed
                .title
                .clone()
                .unwrap_or_else(|| fallback_title(reference.document_id())),
        );
        let descriptors = discover_descriptors(&self.discoveries, &embed.scripts);
        let inline_pages = if mode == StaticMode::Html {
            embed.outer_pages.clone()
        } else {
            Vec::new()
        };
        debug!(
            title = %title,
            descriptors = descriptors.len(),
            inline_pages = inline_pages.len(),
            "parsed embed page"
        );

        if descriptors.is_empty() && inline_pages.is_empty() {
            return Err(EngineError::NoContent {
                reason: "no content descriptors found".to_string(),
            });
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| EngineError::io(output_dir, e))?;
        self.reporter
            .info(format!("Downloading {title} in {mode:?} mode"));

        let mut retrieval = Retrieval {
            artifact: None,
            stopped: false,
            processed: 0,
            skipped: 0,
        };

        let mut sink: Box<dyn ContentSink> = match mode {
            StaticMode::Text => Box::new(TextSink::new(output_dir, &title)),
            StaticMode::Images => Box::new(ImageSink::new(output_dir, &title)),
            StaticMode::Html => {
                self.reporter.info("Extracting CSS for offline viewing...");
                let css = self.harvest_css(&embed, token).await;
                let mut html_sink = HtmlSink::create(output_dir, &title, &css, base)
                    .await
                    .map_err(EngineError::from_sink)?
                    .with_cancellation(token.clone());
                for page in &inline_pages {
                    if token.is_cancelled() {
                        retrieval.stopped = true;
                        break;
                    }
                    if let Err(error) = html_sink.append_inline_page(&self.client, page).await {
                        self.reporter.warn(format!("Inline page skipped: {error}"));
                    }
                }
                Box::new(html_sink)
            }
        };

        for descriptor in &descriptors {
            if retrieval.stopped || token.is_cancelled() {
                retrieval.stopped = true;
                break;
            }
            match sink.accept(&self.client, descriptor).await {
                Ok(()) => {
                    retrieval.processed += 1;
                    self.reporter.info(format!(
                        "Page {}/{} retrieved",
                        descriptor.ordinal,
                        descriptors.len()
                    ));
                }
                Err(error) => {
                    let error = EngineError::from_sink(error);
                    if error.is_fatal() {
                        if let Err(finish_error) = sink.finish().await {
                            warn!(error = %finish_error, "output not finalized");
                        }
                        return Err(error);
                    }
                    retrieval.skipped += 1;
                    self.reporter
                        .warn(format!("Page {} skipped: {error}", descriptor.ordinal));
                }
            }
        }
        if retrieval.stopped {
            self.reporter.info("Download stopped by user.");
        }

        retrieval.artifact = sink.finish().await.map_err(EngineError::from_sink)?;
        info!(
            processed = retrieval.processed,
            skipped = retrieval.skipped,
            stopped = retrieval.stopped,
            "static retrieval finished"
        );
        Ok(retrieval)
    }

    async fn fetch_embed_page(
        &self,
        endpoint: &str,
        token: &CancellationToken,
    ) -> Result<String, EngineError> {
        let policy = RetryPolicy::default().with_base_delay(self.config.fetch_retry_backoff);
        let mut attempt = 1;
        loop {
            match self.client.get_text(endpoint).await {
                Ok(html) => return Ok(html),
                Err(error) => match policy.should_retry(classify_error(&error), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } if !token.is_cancelled() => {
                        self.reporter.warn(format!(
                            "Fetching embed page failed ({error}); retrying in {}ms",
                            delay.as_millis()
                        ));
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    _ => return Err(EngineError::Network(error)),
                },
            }
        }
    }

    /// Linked stylesheets (each preceded by its source comment), then inline styles.
    async fn harvest_css(&self, embed: &markup::EmbedMarkup, token: &CancellationToken) -> String {
        let mut css = String::new();
        for url in &embed.stylesheet_urls {
            if token.is_cancelled() {
                debug!("stylesheet harvest stopped");
                break;
            }
            match self.client.get_text(url).await {
                Ok(body) => css.push_str(&markup::sourced_css(url, &body)),
                Err(error) => warn!(url = %url, error = %error, "stylesheet not harvested"),
            }
        }
        for style in &embed.inline_styles {
            css.push('\n');
            css.push_str(style);
        }
        css
    }
}

impl Retrieval {
    fn stopped_before_start() -> Self {
        Self {
            artifact: None,
            stopped: true,
            processed: 0,
            skipped: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::locator::identify;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever(server: &MockServer) -> StaticRetriever {
        let config = EngineConfig::without_delays().with_endpoint_base(server.uri());
        let client = HttpClient::from_config(&config).unwrap();
        StaticRetriever::new(client, config, Reporter::silent())
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn embed_page(server: &MockServer, pages: &[u32]) -> String {
        let scripts: String = pages
            .iter()
            .map(|n| {
                format!(
                    r#"docManager.addPage({{contentUrl: "{}/pages/{n}.jsonp"}});"#,
                    server.uri()
                )
            })
            .collect();
        format!("<html><head><title>My Doc</title></head><body><script>{scripts}</script></body></html>")
    }

    #[tokio::test]
    async fn test_retrieve_without_descriptors_fails() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(
            &server,
            "/embeds/5/content",
            200,
            "<html><title>t</title></html>".to_string(),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let reference = identify("https://www.scribd.com/doc/5/x").unwrap();

        let result = retriever(&server)
            .retrieve(&reference, StaticMode::Text, dir.path(), &CancellationToken::new())
            .await;

        match result {
            Err(EngineError::NoContent { reason }) => {
                assert_eq!(reason, "no content descriptors found");
            }
            other => panic!("expected NoContent, got {other:?}"),
        }
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_retrieve_embed_404_is_network_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(&server, "/embeds/5/content", 404, String::new()).await;
        let dir = TempDir::new().unwrap();
        let reference = identify("https://www.scribd.com/doc/5/x").unwrap();

        let result = retriever(&server)
            .retrieve(&reference, StaticMode::Text, dir.path(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::Network(_))));
    }

    #[tokio::test]
    async fn test_retrieve_cancelled_before_start_touches_nothing() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let reference = identify("https://www.scribd.com/doc/5/x").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let retrieval = retriever(&server)
            .retrieve(&reference, StaticMode::Text, dir.path(), &token)
            .await
            .unwrap();
        assert!(retrieval.stopped);
        assert!(retrieval.artifact.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_during_stylesheet_harvest_skips_remaining_fetches() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let links: String = (1..=3)
            .map(|n| format!(r#"<link rel="stylesheet" href="/css/{n}.css">"#))
            .collect();
        let page = format!(
            r#"<html><head><title>Styled</title>{links}</head><body><script>contentUrl: "{}/pages/1.jsonp"</script></body></html>"#,
            server.uri()
        );
        mount(&server, "/embeds/5/content", 200, page).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/css/\d\.css$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("p { margin: 0; }")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let reference = identify("https://www.scribd.com/doc/5/x").unwrap();
        let token = CancellationToken::new();
        let trip = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trip.cancel();
        });

        let retrieval = retriever(&server)
            .retrieve(&reference, StaticMode::Html, dir.path(), &token)
            .await
            .unwrap();

        assert!(retrieval.stopped);
        assert_eq!(retrieval.processed, 0);
        let requests = server.received_requests().await.unwrap();
        let css_fetches = requests
            .iter()
            .filter(|r| r.url.path().starts_with("/css/"))
            .count();
        assert_eq!(css_fetches, 1);
        assert!(!requests.iter().any(|r| r.url.path() == "/pages/1.jsonp"));
        let html = std::fs::read_to_string(dir.path().join("Styled.html")).unwrap();
        assert!(html.ends_with("</html>"));
    }

    #[tokio::test]
    async fn test_unwritable_text_output_is_fatal() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let page = embed_page(&server, &[1, 2]);
        mount(&server, "/embeds/5/content", 200, page).await;
        mount(
            &server,
            "/pages/1.jsonp",
            200,
            r#"window.page1_callback(["<span class=\"a\">x</span>"]);"#.to_string(),
        )
        .await;
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("My_Doc.txt")).unwrap();
        let reference = identify("https://www.scribd.com/doc/5/x").unwrap();

        let result = retriever(&server)
            .retrieve(&reference, StaticMode::Text, dir.path(), &CancellationToken::new())
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Io);
        assert!(error.is_fatal());
        let requests = server.received_requests().await.unwrap();
        assert!(!requests.iter().any(|r| r.url.path() == "/pages/2.jsonp"));
    }

    #[tokio::test]
    async fn test_embed_page_scripts_use_structured_discovery() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let page = embed_page(&server, &[1, 2]);
        let embed = markup::EmbedMarkup::parse(&page, &Url::parse(&server.uri()).unwrap());
        let descriptors = discover_descriptors(&default_discoveries(), &embed.scripts);
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[1].url.ends_with("/pages/2.jsonp"));
    }
}
