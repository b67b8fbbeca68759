//! Engine-level error taxonomy.
//!
//! Module errors are folded into [`EngineError`] at the run boundary. Each
//! variant maps to an [`ErrorKind`]; only fatal kinds end a run as failed.
//! Network and parse problems on a single descriptor and exhausted page
//! captures are handled where they occur (skip or placeholder) and reach
//! this type only for reporting.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::assemble::AssembleError;
use crate::browser::BrowserError;
use crate::download::DownloadError;
use crate::locator::LocatorError;
use crate::retriever::{PayloadError, SinkError};

/// Coarse classification used for outcome mapping and exit messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidReference,
    NetworkError,
    ParseError,
    CaptureExhausted,
    DriverInitFailed,
    Browser,
    MergeFailed,
    NoContent,
    Io,
}

/// Any error that can end or degrade a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidReference(#[from] LocatorError),

    #[error(transparent)]
    Network(#[from] DownloadError),

    #[error("malformed payload from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: PayloadError,
    },

    #[error("page {index} capture failed after {attempts} attempts")]
    CaptureExhausted { index: usize, attempts: u32 },

    #[error("browser initialization failed after {attempts} attempts: {source}")]
    DriverInitFailed {
        attempts: u32,
        #[source]
        source: BrowserError,
    },

    /// Navigation or scripting failure in an already running session.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Merge(#[from] AssembleError),

    #[error("{reason}")]
    NoContent { reason: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn from_sink(error: SinkError) -> Self {
        match error {
            SinkError::Download(source) => Self::Network(source),
            SinkError::Payload { url, source } => Self::Parse { url, source },
            SinkError::Io { path, source } => Self::Io { path, source },
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference(_) => ErrorKind::InvalidReference,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::CaptureExhausted { .. } => ErrorKind::CaptureExhausted,
            Self::DriverInitFailed { .. } => ErrorKind::DriverInitFailed,
            Self::Browser(_) => ErrorKind::Browser,
            Self::Merge(_) => ErrorKind::MergeFailed,
            Self::NoContent { .. } => ErrorKind::NoContent,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// True for kinds that abort the run rather than skip a unit of work.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::NetworkError | ErrorKind::ParseError | ErrorKind::CaptureExhausted
        )
    }
}
