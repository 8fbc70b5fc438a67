/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{error, info, warn};

use bindicator::channel::{ChannelOptions, PatternChannel};
use bindicator::config::Config;
use bindicator::deferred::TaskScheduler;
use bindicator::gesture::{Debouncer, Edge};
use bindicator::jobs::Device;
use bindicator::output::RgbOutput;
use bindicator::provider::{BinDateProvider, BinDates, DateFile, StaticDates};

/// Status LED pins (R, G, B).
const STATUS_PINS: [u8; 3] = [21, 18, 11];
/// Bin LED pins (R, G, B).
const BIN_PINS: [u8; 3] = [10, 9, 17];

// ── CLI argument definition ───────────────────────────────────────────────────

/// Bindicator bin-collection reminder, host build.
///
/// Both LEDs are mock PWM pins (run with RUST_LOG=trace to see duty
/// changes).  Type `p` + Enter to press the button and `r` + Enter to
/// release it.
///
/// Example:
///   bindicator --config bindicator.yaml --dates dates.yaml
#[derive(Debug, Parser)]
#[command(
    name = "bindicator",
    about = "Bin-collection notification device – host build",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML device configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// YAML file of `label: YYYY-MM-DD` collection dates (re-read on every refresh).
    #[arg(short = 'd', long = "dates")]
    dates: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: String,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    info!("Bindicator starting up...");
    info!(config = ?cli.config, dates = ?cli.dates, "Arguments");

    // ── Load configuration ────────────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default settings");
            Config::default()
        }
    };

    // ── Build the device ──────────────────────────────────────────────────────
    let (status_out, status_pins) = RgbOutput::mock(STATUS_PINS, config.status_inverted);
    let (bin_out, bin_pins) = RgbOutput::mock(BIN_PINS, config.bin_inverted);
    info!(
        status_pins = ?status_pins.each_ref().map(|p| p.pin()),
        bin_pins = ?bin_pins.each_ref().map(|p| p.pin()),
        "Mock PWM outputs ready"
    );
    let status = PatternChannel::new("status", status_out, ChannelOptions::default());
    let bins = PatternChannel::new("bins", bin_out, ChannelOptions::default());

    let provider: Arc<dyn BinDateProvider> = match &cli.dates {
        Some(path) => {
            let file = DateFile::new(path);
            info!("Reading bin dates from: {}", file.path().display());
            Arc::new(file)
        }
        None => {
            warn!("No bin date file provided, using demo dates");
            Arc::new(StaticDates(BinDates::from([
                ("general".to_string(), 3),
                ("recycling".to_string(), 10),
            ])))
        }
    };

    let gesture_timing = config.gesture;
    let device = Device::new(config, status, bins, TaskScheduler::default(), provider);

    let level = Arc::new(AtomicBool::new(false));
    let button = Debouncer::new(
        "button",
        tokio::runtime::Handle::current(),
        gesture_timing,
        level.clone(),
        device.gesture_handler(),
    );

    let timing = button.timing();
    info!(
        double_tap_ms = timing.double_tap.as_millis() as u64,
        long_hold_ms = timing.long_hold.as_millis() as u64,
        "Button gestures armed"
    );

    device.start();
    info!("Ready: 'p' presses the button, 'r' releases it, Ctrl-C quits");

    // ── Button edges from stdin until Ctrl-C ──────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "p" => {
                        level.store(true, Ordering::SeqCst);
                        button.edge(Edge::Rising, Instant::now());
                    }
                    "r" => {
                        level.store(false, Ordering::SeqCst);
                        button.edge(Edge::Falling, Instant::now());
                    }
                    "" => {}
                    other => warn!(input = other, "unknown command, expected 'p' or 'r'"),
                },
                Ok(None) => {
                    info!("stdin closed, waiting for Ctrl-C");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }

    device.shutdown().await;
}
