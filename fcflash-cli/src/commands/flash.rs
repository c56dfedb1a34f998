//! Flash command implementation.

use anyhow::{Context, Result, anyhow};
use console::style;
use fcflash::{
    FlashEngine, FlashEvent, FlashOutcome, FlashRequest, FlashTimings, NativePort, SerialConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, get_baud, get_port, use_fancy_output};

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    connect_timeout: u64,
    erase_timeout: u64,
) -> Result<()> {
    let port = get_port(cli, config)?;
    let baud = get_baud(cli, config);

    if !cli.quiet {
        eprintln!(
            "{} Flashing {} via {} at {} baud",
            style("⚡").cyan(),
            style(firmware.display()).bold(),
            style(&port).cyan(),
            baud
        );
    }

    let mut timings = FlashTimings {
        connect_timeout: Duration::from_secs(connect_timeout),
        erase_timeout: Duration::from_secs(erase_timeout),
        ..FlashTimings::default()
    };
    if let Some(chunk_size) = config.flash.chunk_size {
        if chunk_size == 0 || chunk_size > 252 || chunk_size % 4 != 0 {
            return Err(CliError::Usage(format!(
                "Invalid chunk_size {chunk_size}: must be a multiple of 4, at most 252"
            ))
            .into());
        }
        timings.chunk_size = chunk_size;
    }
    let serial_config =
        SerialConfig::new(&port, baud).with_timeout(timings.read_timeout);

    let engine = FlashEngine::new();
    let request = FlashRequest::new(firmware).with_timings(timings);
    let handle = engine
        .start(request, move || NativePort::open_with_retry(&serial_config))
        .context("Failed to start flash operation")?;

    // Ctrl-C requests cooperative cancellation; the worker closes the
    // port and reports a Cancelled outcome on its own.
    let cancel = handle.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, cancelling...");
        cancel.cancel();
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }

    // Progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut outcome = None;
    for event in handle.events().iter() {
        match event {
            FlashEvent::Progress { stage, percent } => {
                pb.set_position(u64::from(percent));
                pb.set_message(stage.to_string());
            },
            FlashEvent::Status(msg) => {
                if !cli.quiet {
                    if pb.is_hidden() {
                        eprintln!("{} {msg}", style("•").dim());
                    } else {
                        pb.println(format!("{} {msg}", style("•").dim()));
                    }
                }
            },
            FlashEvent::Complete(result) => {
                outcome = Some(result);
                break;
            },
        }
    }
    handle.join();

    match outcome {
        Some(FlashOutcome::Success { message }) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!("\n{} {message}", style("🎉").green().bold());
            }
            Ok(())
        },
        Some(FlashOutcome::Cancelled) => {
            pb.abandon_with_message("cancelled");
            Err(CliError::Cancelled.into())
        },
        Some(FlashOutcome::Failed { message }) => {
            pb.abandon_with_message("failed");
            Err(anyhow!(message))
        },
        // The worker always sends a terminal event; a closed channel
        // without one means it panicked.
        None => Err(anyhow!("Flash worker exited without a result")),
    }
}
