//! Final output of dynamic runs.
//!
//! Captured pages are staged as numbered scratch files, merged into one PDF
//! in capture order, and the scratch directory is removed once the merged
//! file is on disk. A failed merge leaves the scratch files in place.

pub mod pdf;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use pdf::{image_to_pdf, merge_pdfs, placeholder_pdf};

use crate::download::filename::scratch_page_path;
use crate::events::Reporter;
use crate::pipeline::OutputArtifact;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to merge pages: {reason}")]
    MergeFailed { reason: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single page document could not be produced.
    #[error("PDF error: {reason}")]
    Pdf { reason: String },
}

impl AssembleError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How a page's bytes were obtained. The bytes are always a one-page PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Printed by the browser.
    Pdf,
    /// Screenshot laid out as a page.
    RasterImage,
}

/// Captured representation of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub kind: PageKind,
    pub is_placeholder: bool,
}

impl PageArtifact {
    #[must_use]
    pub fn printed(index: usize, bytes: Vec<u8>) -> Self {
        Self {
            index,
            bytes,
            kind: PageKind::Pdf,
            is_placeholder: false,
        }
    }

    #[must_use]
    pub fn rasterized(index: usize, bytes: Vec<u8>) -> Self {
        Self {
            index,
            bytes,
            kind: PageKind::RasterImage,
            is_placeholder: false,
        }
    }

    #[must_use]
    pub fn placeholder(index: usize) -> Self {
        Self {
            index,
            bytes: placeholder_pdf(),
            kind: PageKind::Pdf,
            is_placeholder: true,
        }
    }
}

/// Writes merged PDFs and rendered HTML to their final location.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    reporter: Reporter,
}

impl Assembler {
    #[must_use]
    pub fn new(reporter: Reporter) -> Self {
        Self { reporter }
    }

    /// Stages `artifacts` under `scratch`, merges them in index order into
    /// `output`, then removes `scratch`.
    ///
    /// # Errors
    ///
    /// [`AssembleError::MergeFailed`] when the pages cannot be combined (the
    /// scratch files are kept), [`AssembleError::Io`] when staging or the
    /// final write fails.
    pub async fn assemble_pdf(
        &self,
        artifacts: &[PageArtifact],
        output: &Path,
        scratch: &Path,
    ) -> Result<OutputArtifact, AssembleError> {
        let mut ordered: Vec<&PageArtifact> = artifacts.iter().collect();
        ordered.sort_by_key(|artifact| artifact.index);

        tokio::fs::create_dir_all(scratch)
            .await
            .map_err(|e| AssembleError::io(scratch, e))?;
        for artifact in &ordered {
            let path = scratch_page_path(scratch, artifact.index);
            tokio::fs::write(&path, &artifact.bytes)
                .await
                .map_err(|e| AssembleError::io(&path, e))?;
        }
        debug!(pages = ordered.len(), scratch = %scratch.display(), "pages staged");

        self.reporter
            .info(format!("Merging {} pages into PDF...", ordered.len()));
        let pages: Vec<&[u8]> = ordered.iter().map(|a| a.bytes.as_slice()).collect();
        let merged = match merge_pdfs(&pages) {
            Ok(merged) => merged,
            Err(error) => {
                self.reporter.error(format!(
                    "{error}; page files kept in {}",
                    scratch.display()
                ));
                return Err(error);
            }
        };

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AssembleError::io(parent, e))?;
        }
        tokio::fs::write(output, &merged)
            .await
            .map_err(|e| AssembleError::io(output, e))?;

        self.cleanup_scratch(scratch).await;
        let placeholders = ordered.iter().filter(|a| a.is_placeholder).count();
        info!(pages = ordered.len(), placeholders, output = %output.display(), "PDF assembled");
        self.reporter
            .info(format!("PDF saved to: {}", output.display()));
        Ok(OutputArtifact::Pdf(output.to_path_buf()))
    }

    /// Writes the rendered document source to `output`.
    ///
    /// # Errors
    ///
    /// [`AssembleError::Io`] when the file cannot be written.
    pub async fn persist_html(
        &self,
        source: &str,
        output: &Path,
        page_count: usize,
    ) -> Result<OutputArtifact, AssembleError> {
        tokio::fs::write(output, source)
            .await
            .map_err(|e| AssembleError::io(output, e))?;
        self.reporter.info(format!(
            "HTML saved to: {} ({page_count} pages)",
            output.display()
        ));
        Ok(OutputArtifact::Html(output.to_path_buf()))
    }

    /// Removes the scratch directory; failures are only logged.
    pub async fn cleanup_scratch(&self, scratch: &Path) {
        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => debug!(scratch = %scratch.display(), "scratch removed"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(scratch = %scratch.display(), %error, "scratch not removed"),
        }
    }
}
