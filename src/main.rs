//! CLI entry point for the Scribd downloader.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use scribd_core::{
    CancellationToken, ChromiumLauncher, EngineConfig, EventBus, Mode, RunOutcome, RunRequest,
    Severity, StatusEvent, run,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, VerbositySetting, load_default_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = load_default_file_config()?.unwrap_or_default();

    init_tracing(&args, &file_config);
    debug!(
        ?args,
        file_verbosity = file_config.verbosity.map(VerbositySetting::as_str),
        "CLI arguments parsed"
    );

    let Some(url) = args.url.clone() else {
        Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a document URL is required",
            )
            .exit();
    };

    let mode = args
        .requested_mode()
        .or(file_config.mode)
        .unwrap_or(Mode::Text);
    let mut request = RunRequest::new(url, mode);
    request.output_dir = args.output_dir.clone().or(file_config.output_dir.clone());
    let config = engine_config(&args, &file_config);
    info!(mode = %mode, "Scribd downloader starting");

    let token = CancellationToken::new();
    spawn_interrupt_handler(token.clone());

    let bus = EventBus::new();
    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let spinner = use_spinner.then(|| spawn_spinner(bus.subscribe()));
    let reporter = bus.reporter();

    let launcher = ChromiumLauncher::new(config.clone());
    let outcome = run(&request, &config, &launcher, &reporter, &token).await;

    drop(reporter);
    drop(bus);
    if let Some(handle) = spinner
        && let Err(error) = handle.await
    {
        debug!(%error, "spinner task ended abnormally");
    }

    match &outcome {
        RunOutcome::Succeeded(artifact) => {
            for path in artifact.paths() {
                println!("{}", path.display());
            }
        }
        RunOutcome::Stopped => eprintln!("Download stopped."),
        RunOutcome::Failed(reason) => eprintln!("error: {reason}"),
    }
    Ok(ExitCode::from(
        u8::try_from(outcome.exit_code()).unwrap_or(1),
    ))
}

/// Priority: `RUST_LOG` > `-q`/`-v` > file `verbosity` > info.
fn init_tracing(args: &Args, file_config: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else if args.verbose > 0 {
        if args.verbose == 1 { "debug" } else { "trace" }
    } else {
        match file_config.verbosity {
            Some(VerbositySetting::Quiet) => "error",
            Some(VerbositySetting::Verbose) => "debug",
            Some(VerbositySetting::Debug) => "trace",
            Some(VerbositySetting::Default) | None => "info",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let no_color = args.no_color
        || std::env::var_os("NO_COLOR").is_some()
        || std::env::var("TERM").is_ok_and(|term| term == "dumb");

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!no_color)
        .init();
}

/// Command-line values override file values.
fn engine_config(args: &Args, file_config: &FileConfig) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(headless) = file_config.headless {
        config.headless = headless;
    }
    if args.headed {
        config.headless = false;
    }
    config.chrome_path = args
        .chrome_path
        .clone()
        .or_else(|| file_config.chrome_path.clone());
    if let Some(pause) = file_config.scroll_pause_ms {
        config.scroll_pause = Duration::from_millis(pause);
    }
    if let Some(secs) = file_config.connect_timeout_secs {
        config.connect_timeout_secs = secs;
    }
    if let Some(secs) = file_config.read_timeout_secs {
        config.read_timeout_secs = secs;
    }
    config
}

fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            token.cancel();
        }
    });
}

/// Renders the latest status line until the bus closes.
fn spawn_spinner(mut events: broadcast::Receiver<StatusEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        loop {
            match events.recv().await {
                Ok(event) => match event.severity {
                    Severity::Info => spinner.set_message(event.message),
                    Severity::Warning | Severity::Error => {
                        spinner.println(format!("{:?}: {}", event.severity, event.message));
                    }
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "spinner lagged"),
                Err(RecvError::Closed) => break,
            }
        }

        spinner.finish_and_clear();
    })
}
