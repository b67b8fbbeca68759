//! Output sinks for static acquisition.
//!
//! A sink receives descriptors one at a time, fetches what it needs, and
//! writes to its output. `finish` closes the output and reports what was
//! produced. A failed `accept` leaves the output consistent so the next
//! descriptor can proceed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use url::Url;

use super::discovery::ContentDescriptor;
use super::markup;
use super::payload::{PayloadError, extract_payload};
use crate::cancel::CancellationToken;
use crate::download::filename::{html_output_path, image_output_path, text_output_path};
use crate::download::{DownloadError, HttpClient};
use crate::pipeline::OutputArtifact;

/// Per-descriptor failure. Logged and skipped by the retriever.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("malformed payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: PayloadError,
    },

    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    fn payload(url: &str, source: PayloadError) -> Self {
        Self::Payload {
            url: url.to_string(),
            source,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Destination for static page content.
#[async_trait]
pub trait ContentSink: Send {
    /// Fetches and writes one descriptor.
    async fn accept(
        &mut self,
        client: &HttpClient,
        descriptor: &ContentDescriptor,
    ) -> Result<(), SinkError>;

    /// Finalizes the output. `None` when nothing was written.
    async fn finish(&mut self) -> Result<Option<OutputArtifact>, SinkError>;
}

async fn fetch_markup(client: &HttpClient, url: &str) -> Result<String, SinkError> {
    let body = client.get_text(url).await?;
    extract_payload(&body).map_err(|e| SinkError::payload(url, e))
}

/// Appends the `span.a` text of every page to `<title>.txt`, one span per line.
///
/// The file is created (truncating any previous run) on the first page that
/// yields content, so a run that retrieves nothing leaves nothing behind.
pub struct TextSink {
    path: PathBuf,
    file: Option<File>,
}

impl TextSink {
    #[must_use]
    pub fn new(dir: &Path, title: &str) -> Self {
        Self {
            path: text_output_path(dir, title),
            file: None,
        }
    }

    async fn file(&mut self) -> Result<&mut File, SinkError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::create(&self.path)
                .await
                .map_err(|e| SinkError::io(&self.path, e))?,
        };
        Ok(self.file.insert(file))
    }
}

#[async_trait]
impl ContentSink for TextSink {
    #[instrument(skip(self, client), fields(ordinal = descriptor.ordinal))]
    async fn accept(
        &mut self,
        client: &HttpClient,
        descriptor: &ContentDescriptor,
    ) -> Result<(), SinkError> {
        let fragment = fetch_markup(client, &descriptor.url).await?;
        let mut chunk = String::new();
        for span in markup::text_spans(&fragment) {
            chunk.push_str(&span);
            chunk.push('\n');
        }
        debug!(bytes = chunk.len(), "extracted text");

        let path = self.path.clone();
        let file = self.file().await?;
        file.write_all(chunk.as_bytes())
            .await
            .map_err(|e| SinkError::io(&path, e))
    }

    async fn finish(&mut self) -> Result<Option<OutputArtifact>, SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(None);
        };
        file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
        Ok(Some(OutputArtifact::Text(self.path.clone())))
    }
}

/// Streams each page's image rendition to `<title>_<n>.jpg`.
pub struct ImageSink {
    dir: PathBuf,
    title: String,
    saved: Vec<PathBuf>,
}

impl ImageSink {
    #[must_use]
    pub fn new(dir: &Path, title: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            title: title.to_string(),
            saved: Vec::new(),
        }
    }
}

/// Maps a payload URL to the image rendition of the same page.
#[must_use]
pub fn image_url_for(payload_url: &str) -> String {
    payload_url
        .replace("/pages/", "/images/")
        .replace("jsonp", "jpg")
}

#[async_trait]
impl ContentSink for ImageSink {
    #[instrument(skip(self, client), fields(ordinal = descriptor.ordinal))]
    async fn accept(
        &mut self,
        client: &HttpClient,
        descriptor: &ContentDescriptor,
    ) -> Result<(), SinkError> {
        let url = image_url_for(&descriptor.url);
        let path = image_output_path(&self.dir, &self.title, descriptor.ordinal);
        let bytes = client.download_to_path(&url, &path).await?;
        debug!(bytes, path = %path.display(), "saved page image");
        self.saved.push(path);
        Ok(())
    }

    async fn finish(&mut self) -> Result<Option<OutputArtifact>, SinkError> {
        if self.saved.is_empty() {
            return Ok(None);
        }
        Ok(Some(OutputArtifact::Images(std::mem::take(&mut self.saved))))
    }
}

/// Accumulates pages into one self-contained `<title>.html`.
///
/// The document head is written on creation; [`finish`](ContentSink::finish)
/// always writes the closing tags, even after a stop.
pub struct HtmlSink {
    path: PathBuf,
    file: Option<File>,
    base: Url,
    token: CancellationToken,
}

impl HtmlSink {
    /// Creates the file and writes the head with the harvested `css`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be created or written.
    pub async fn create(dir: &Path, title: &str, css: &str, base: Url) -> Result<Self, SinkError> {
        let path = html_output_path(dir, title);
        let mut file = File::create(&path)
            .await
            .map_err(|e| SinkError::io(&path, e))?;
        file.write_all(markup::document_head(title, css).as_bytes())
            .await
            .map_err(|e| SinkError::io(&path, e))?;
        Ok(Self {
            path,
            file: Some(file),
            base,
            token: CancellationToken::new(),
        })
    }

    /// Stops image inlining once `token` trips; pages are still written.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inlines images and appends `fragment` verbatim (already wrapped pages).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] on write failure.
    pub async fn append_inline_page(
        &mut self,
        client: &HttpClient,
        fragment: &str,
    ) -> Result<(), SinkError> {
        let inlined = inline_images(client, fragment, &self.base, &self.token).await;
        self.write(&inlined).await
    }

    async fn write(&mut self, text: &str) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(SinkError::io(
                &self.path,
                std::io::Error::other("html output already finalized"),
            ));
        };
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

#[async_trait]
impl ContentSink for HtmlSink {
    #[instrument(skip(self, client), fields(ordinal = descriptor.ordinal))]
    async fn accept(
        &mut self,
        client: &HttpClient,
        descriptor: &ContentDescriptor,
    ) -> Result<(), SinkError> {
        let fragment = fetch_markup(client, &descriptor.url).await?;
        let inlined = inline_images(client, &fragment, &self.base, &self.token).await;
        self.write(&markup::wrap_page(descriptor.ordinal, &inlined))
            .await
    }

    async fn finish(&mut self) -> Result<Option<OutputArtifact>, SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(None);
        };
        file.write_all(markup::DOCUMENT_TAIL.as_bytes())
            .await
            .map_err(|e| SinkError::io(&self.path, e))?;
        file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
        Ok(Some(OutputArtifact::Html(self.path.clone())))
    }
}

/// Fetches every image in `fragment` and embeds it as a data URI.
///
/// Images that fail to download, or that come after `token` trips, keep
/// their absolute URL.
pub async fn inline_images(
    client: &HttpClient,
    fragment: &str,
    base: &Url,
    token: &CancellationToken,
) -> String {
    let mut replacements = HashMap::new();
    for url in markup::image_sources(fragment, base) {
        if token.is_cancelled() {
            debug!("image inlining stopped");
            break;
        }
        match client.get_bytes(&url).await {
            Ok(fetched) => {
                let uri = markup::data_uri(&fetched.bytes, fetched.content_type.as_deref());
                replacements.insert(url, uri);
            }
            Err(error) => warn!(url = %url, error = %error, "image not inlined"),
        }
    }
    markup::rewrite_images(fragment, base, &replacements)
}
