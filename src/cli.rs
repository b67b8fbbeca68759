//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use scribd_core::Mode;

/// Download Scribd documents as text, images, HTML, or PDF.
///
/// Static modes read the per-page content the embed viewer references;
/// dynamic modes drive a headless Chromium and capture the rendered pages.
#[derive(Parser, Debug)]
#[command(name = "scribd-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Document URL (doc/<id>, document/<id>, or embeds/<id>)
    pub url: Option<String>,

    /// Output mode
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<Mode>,

    /// Shortcut for --mode images
    #[arg(short, long, conflicts_with_all = ["mode", "html"])]
    pub images: bool,

    /// Shortcut for --mode html-static (html-dynamic with --dynamic)
    #[arg(long, conflicts_with = "mode")]
    pub html: bool,

    /// With --html, capture the rendered page instead; alone, capture a PDF
    #[arg(long, conflicts_with_all = ["mode", "images"])]
    pub dynamic: bool,

    /// Directory for the output (default: current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Show the browser window in dynamic modes
    #[arg(long)]
    pub headed: bool,

    /// Chromium or Chrome binary for dynamic modes
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    value.parse::<Mode>().map_err(|e| e.to_string())
}

impl Args {
    /// Mode selected by flags, if any.
    #[must_use]
    pub fn requested_mode(&self) -> Option<Mode> {
        if let Some(mode) = self.mode {
            return Some(mode);
        }
        match (self.images, self.html, self.dynamic) {
            (true, _, _) => Some(Mode::Images),
            (false, true, true) => Some(Mode::HtmlDynamic),
            (false, true, false) => Some(Mode::HtmlStatic),
            (false, false, true) => Some(Mode::PdfDynamic),
            (false, false, false) => None,
        }
    }
}
