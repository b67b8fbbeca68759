//! HTTP client wrapper for markup, payload, and image fetches.
//!
//! [`HttpClient`] is built once per run and reused for every request so the
//! connection pool is shared across descriptors.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::DownloadError;
use crate::config::EngineConfig;
use crate::user_agent;

/// A fetched binary body with its declared media type.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    /// `Content-Type` header value without parameters, when the server sent one.
    pub content_type: Option<String>,
}

/// HTTP client with configured timeouts and a browser User-Agent.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client with the timeouts from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the TLS backend cannot be initialised.
    pub fn from_config(config: &EngineConfig) -> Result<Self, DownloadError> {
        Self::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)
            .map_err(|e| DownloadError::network(&config.endpoint_base, e))
    }

    /// Builds a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Fetches a URL and returns the body decoded as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, transport failures, timeouts,
    /// and non-success statuses.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send_request(url).await?;
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        debug!(bytes = text.len(), "fetched text");
        Ok(text)
    }

    /// Fetches a URL fully into memory, keeping its media type.
    ///
    /// # Errors
    ///
    /// Same as [`get_text`](Self::get_text).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_bytes(&self, url: &str) -> Result<FetchedBytes, DownloadError> {
        let response = self.send_request(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    /// Streams a URL to `path`, replacing any existing file.
    ///
    /// A partially written file is removed when the stream fails.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for request failures and write failures.
    #[instrument(skip(self, path), fields(url = %url, path = %path.display()))]
    pub async fn download_to_path(&self, url: &str, path: &Path) -> Result<u64, DownloadError> {
        let response = self.send_request(url).await?;
        let mut file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        match stream_to_file(&mut file, response, url, path).await {
            Ok(bytes_written) => {
                debug!(bytes_written, "download complete");
                Ok(bytes_written)
            }
            Err(error) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(path).await {
                    warn!(error = %cleanup, "failed to remove partial download");
                }
                Err(error)
            }
        }
    }

    async fn send_request(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

fn map_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_transport_error(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
