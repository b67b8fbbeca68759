//! Run orchestration.
//!
//! [`run`] dispatches a [`RunRequest`] to the static retriever or to the
//! browser path and always answers with a [`RunOutcome`]; errors never cross
//! this boundary. The browser path walks the [`RunPhase`] state machine and
//! closes its session on every exit.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::assemble::Assembler;
use crate::browser::{
    BrowserSession, CONTENT_SELECTOR, DISMISS_OVERLAYS_SCRIPT, LazyLoadDriver,
    PageCapturer, SessionLauncher,
};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::download::filename::{
    dynamic_html_path, dynamic_pdf_path, resolve_output_dir, scratch_dir,
};
use crate::download::{FailureType, HttpClient, RetryDecision, RetryPolicy};
use crate::error::EngineError;
use crate::events::Reporter;
use crate::locator::{DocumentReference, identify};
use crate::retriever::{Retrieval, StaticMode, StaticRetriever};

/// Requested output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Text,
    Images,
    HtmlStatic,
    HtmlDynamic,
    PdfDynamic,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Text,
        Mode::Images,
        Mode::HtmlStatic,
        Mode::HtmlDynamic,
        Mode::PdfDynamic,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Images => "images",
            Mode::HtmlStatic => "html-static",
            Mode::HtmlDynamic => "html-dynamic",
            Mode::PdfDynamic => "pdf-dynamic",
        }
    }

    /// True for modes that need a browser session.
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(self, Mode::HtmlDynamic | Mode::PdfDynamic)
    }

    fn static_mode(self) -> Option<StaticMode> {
        match self {
            Mode::Text => Some(StaticMode::Text),
            Mode::Images => Some(StaticMode::Images),
            Mode::HtmlStatic => Some(StaticMode::Html),
            Mode::HtmlDynamic | Mode::PdfDynamic => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode '{0}' (expected one of: text, images, html-static, html-dynamic, pdf-dynamic)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ParseModeError(s.to_string()))
    }
}

/// One download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub url: String,
    pub mode: Mode,
    /// Current directory when `None`.
    pub output_dir: Option<PathBuf>,
}

impl RunRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, mode: Mode) -> Self {
        Self {
            url: url.into(),
            mode,
            output_dir: None,
        }
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// File(s) a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputArtifact {
    Text(PathBuf),
    Images(Vec<PathBuf>),
    Html(PathBuf),
    Pdf(PathBuf),
}

impl OutputArtifact {
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            OutputArtifact::Text(path) | OutputArtifact::Html(path) | OutputArtifact::Pdf(path) => {
                vec![path.as_path()]
            }
            OutputArtifact::Images(paths) => paths.iter().map(PathBuf::as_path).collect(),
        }
    }

    /// First written file.
    #[must_use]
    pub fn primary_path(&self) -> Option<&Path> {
        self.paths().into_iter().next()
    }
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputArtifact::Images(paths) => match paths.first() {
                Some(first) => write!(f, "{} images starting at {}", paths.len(), first.display()),
                None => f.write_str("no images"),
            },
            other => match other.primary_path() {
                Some(path) => write!(f, "{}", path.display()),
                None => Ok(()),
            },
        }
    }
}

/// Tri-state result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded(OutputArtifact),
    Stopped,
    Failed(String),
}

impl RunOutcome {
    /// Process exit code: 0, 130 (interrupted) or 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded(_) => 0,
            RunOutcome::Stopped => 130,
            RunOutcome::Failed(_) => 1,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    fn failed(error: &EngineError) -> Self {
        RunOutcome::Failed(error.to_string())
    }
}

/// States of a browser-backed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    SessionInit,
    Navigate,
    LazyLoad,
    Capture,
    Assemble,
    Cleanup,
    Done,
    Stopped,
    Failed,
}

impl RunPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Stopped | RunPhase::Failed)
    }

    /// Whether `next` may follow `self`. Cleanup is reachable from every
    /// non-terminal phase; terminals are reachable only from Cleanup.
    #[must_use]
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::{
            Assemble, Capture, Cleanup, Done, Failed, Idle, LazyLoad, Navigate, SessionInit,
            Stopped,
        };
        match (self, next) {
            (from, Cleanup) => !from.is_terminal() && from != Cleanup,
            (Idle, SessionInit)
            | (SessionInit, Navigate)
            | (Navigate, LazyLoad)
            | (LazyLoad, Capture | Assemble)
            | (Capture, Assemble)
            | (Cleanup, Done | Stopped | Failed) => true,
            _ => false,
        }
    }

    fn terminal_for(outcome: &RunOutcome) -> RunPhase {
        match outcome {
            RunOutcome::Succeeded(_) => RunPhase::Done,
            RunOutcome::Stopped => RunPhase::Stopped,
            RunOutcome::Failed(_) => RunPhase::Failed,
        }
    }
}

#[derive(Debug)]
struct PhaseTracker {
    phase: RunPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        if !self.phase.can_advance_to(next) {
            warn!(from = ?self.phase, to = ?next, "unexpected phase transition");
        }
        debug!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        if self.phase != RunPhase::Cleanup {
            self.advance(RunPhase::Cleanup);
        }
        self.advance(RunPhase::terminal_for(outcome));
    }
}

/// Runs one request to completion.
///
/// `launcher` is only used by the browser-backed modes.
#[instrument(skip(config, launcher, reporter, token), fields(url = %request.url, mode = %request.mode))]
pub async fn run(
    request: &RunRequest,
    config: &EngineConfig,
    launcher: &dyn SessionLauncher,
    reporter: &Reporter,
    token: &CancellationToken,
) -> RunOutcome {
    let outcome = match identify(&request.url) {
        Err(error) => RunOutcome::failed(&error.into()),
        Ok(reference) => {
            let output_dir = resolve_output_dir(request.output_dir.as_deref());
            match request.mode.static_mode() {
                Some(mode) => {
                    run_static(&reference, mode, &output_dir, config, reporter, token).await
                }
                None => {
                    let dynamic = Dynamic {
                        reference: &reference,
                        mode: request.mode,
                        output_dir: &output_dir,
                        config,
                        reporter,
                        token,
                    };
                    dynamic.run(launcher).await
                }
            }
        }
    };

    match &outcome {
        RunOutcome::Succeeded(artifact) => {
            reporter.info(format!("Download completed: {artifact}"));
        }
        RunOutcome::Stopped => reporter.warn("Download stopped."),
        RunOutcome::Failed(reason) => reporter.error(format!("Download failed: {reason}")),
    }
    outcome
}

async fn run_static(
    reference: &DocumentReference,
    mode: StaticMode,
    output_dir: &Path,
    config: &EngineConfig,
    reporter: &Reporter,
    token: &CancellationToken,
) -> RunOutcome {
    let client = match HttpClient::from_config(config) {
        Ok(client) => client,
        Err(error) => return RunOutcome::failed(&error.into()),
    };
    let retriever = StaticRetriever::new(client, config.clone(), reporter.clone());
    match retriever.retrieve(reference, mode, output_dir, token).await {
        Ok(Retrieval { stopped: true, .. }) => RunOutcome::Stopped,
        Ok(Retrieval {
            artifact: Some(artifact),
            ..
        }) => RunOutcome::Succeeded(artifact),
        Ok(_) => RunOutcome::Failed("no content could be retrieved".to_string()),
        Err(error) => RunOutcome::failed(&error),
    }
}

/// Browser-backed run state.
struct Dynamic<'a> {
    reference: &'a DocumentReference,
    mode: Mode,
    output_dir: &'a Path,
    config: &'a EngineConfig,
    reporter: &'a Reporter,
    token: &'a CancellationToken,
}

impl Dynamic<'_> {
    async fn run(&self, launcher: &dyn SessionLauncher) -> RunOutcome {
        let mut phases = PhaseTracker::new();

        if let Err(error) = tokio::fs::create_dir_all(self.output_dir).await {
            let outcome = RunOutcome::failed(&EngineError::io(self.output_dir, error));
            phases.finish(&outcome);
            return outcome;
        }

        phases.advance(RunPhase::SessionInit);
        let mut session = match self.init_session(launcher).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                phases.finish(&RunOutcome::Stopped);
                return RunOutcome::Stopped;
            }
            Err(error) => {
                let outcome = RunOutcome::failed(&error);
                phases.finish(&outcome);
                return outcome;
            }
        };

        let result = self.drive(session.as_mut(), &mut phases).await;

        phases.advance(RunPhase::Cleanup);
        if let Err(error) = session.close().await {
            warn!(%error, "browser session did not close cleanly");
        }
        let outcome = result.unwrap_or_else(|error| RunOutcome::failed(&error));
        phases.finish(&outcome);
        outcome
    }

    /// `Ok(None)` when cancelled before a session came up.
    async fn init_session(
        &self,
        launcher: &dyn SessionLauncher,
    ) -> Result<Option<Box<dyn BrowserSession>>, EngineError> {
        let policy = RetryPolicy::with_max_attempts(self.config.driver_init_attempts)
            .with_base_delay(self.config.driver_init_backoff);
        self.reporter.info("Starting browser...");
        let mut attempt = 1;
        loop {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            let error = match launcher.launch().await {
                Ok(session) => return Ok(Some(session)),
                Err(error) => error,
            };
            match policy.should_retry(FailureType::Transient, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    self.reporter.warn(format!(
                        "Browser launch attempt {attempt} failed: {error}; retrying"
                    ));
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { .. } => {
                    return Err(EngineError::DriverInitFailed {
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        phases: &mut PhaseTracker,
    ) -> Result<RunOutcome, EngineError> {
        phases.advance(RunPhase::Navigate);
        let endpoint = self
            .reference
            .content_endpoint_at(&self.config.endpoint_base);
        self.reporter.info(format!("Opening {endpoint}"));
        session.navigate(&endpoint).await?;

        if !session
            .wait_for_selector(CONTENT_SELECTOR, self.config.content_wait)
            .await?
        {
            return Err(EngineError::NoContent {
                reason: format!(
                    "document viewer did not appear within {}s",
                    self.config.content_wait.as_secs()
                ),
            });
        }
        if let Err(error) = session.run_script(DISMISS_OVERLAYS_SCRIPT).await {
            debug!(%error, "overlay dismissal failed");
        }
        tokio::time::sleep(self.config.banner_delay).await;

        phases.advance(RunPhase::LazyLoad);
        let loader = LazyLoadDriver::new(self.config, self.reporter.clone());
        let loaded = loader.load_all(session, self.token).await?;
        if loaded.stopped {
            return Ok(RunOutcome::Stopped);
        }

        let document_id = self.reference.document_id();
        let assembler = Assembler::new(self.reporter.clone());

        if self.mode == Mode::HtmlDynamic {
            phases.advance(RunPhase::Assemble);
            let source = session.page_source().await?;
            let output = dynamic_html_path(self.output_dir, document_id);
            let artifact = assembler
                .persist_html(&source, &output, loaded.page_count)
                .await?;
            return Ok(RunOutcome::Succeeded(artifact));
        }

        phases.advance(RunPhase::Capture);
        let handles = session.page_handles().await?;
        if handles.is_empty() {
            return Err(EngineError::NoContent {
                reason: "No pages found to capture".to_string(),
            });
        }
        self.reporter
            .info(format!("Found {} pages to capture", handles.len()));
        let capturer = PageCapturer::new(self.config, self.reporter.clone());
        let captured = capturer.capture_all(session, &handles, self.token).await;
        if captured.stopped {
            return Ok(RunOutcome::Stopped);
        }
        if captured.placeholders > 0 {
            self.reporter.warn(format!(
                "{} of {} pages replaced by placeholders",
                captured.placeholders,
                captured.artifacts.len()
            ));
        }

        phases.advance(RunPhase::Assemble);
        let output = dynamic_pdf_path(self.output_dir, document_id);
        let scratch = scratch_dir(self.output_dir, document_id);
        let artifact = assembler
            .assemble_pdf(&captured.artifacts, &output, &scratch)
            .await?;
        info!(pages = captured.artifacts.len(), "dynamic capture finished");
        Ok(RunOutcome::Succeeded(artifact))
    }
}
