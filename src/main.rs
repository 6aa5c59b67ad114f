//! Annunciator main entry point
//!
//! Reads one request per line from stdin:
//! - a JSON array of detections, composed into a sentence and queued
//! - `:status`, `:clear`, `:mute`, `:unmute`, `:restart` or `:quit`
//! - anything else, queued verbatim
//!
//! Replies are printed to stdout as JSON. Announcements the browser
//! fallback accepted are printed as `delegate: <text>` for the client.

use annunciator::compose::parse_detections;
use annunciator::config::Config;
use annunciator::pipeline::{EnqueueReply, RestartReply};
use annunciator::speech::create_backends;
use annunciator::Announcer;
use anyhow::Context;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often delegated announcements are flushed to stdout
const DELEGATE_POLL: Duration = Duration::from_millis(250);

fn main() {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");

    // Initialize logger
    if debug_mode {
        // Debug mode: write to annunciator.log
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("annunciator.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to open annunciator.log for debug logging: {}",
                    e
                );
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "Annunciator version {} starting (debug mode, logging to annunciator.log)",
            annunciator::VERSION
        );
    } else {
        // Normal mode: warnings and errors to stderr
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Warn)
            .init();
    }

    if let Err(e) = run(config_arg(&args)) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Value following `--config` / `-c`, if given
fn config_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
    .context("loading configuration")?;
    info!("Configuration loaded from {:?}", config.path());

    let settings = config
        .pipeline_settings()
        .context("reading pipeline settings")?;
    let backends = create_backends(&config).context("creating speech backends")?;

    let announcer = Arc::new(
        Announcer::from_backends(settings, backends)
            .context("creating announcer")?
            .with_composer(config.composer()),
    );

    announcer.set_muted(config.mute());
    if !announcer.start() {
        warn!("Announcer started without a working speech backend");
    }

    let running = Arc::new(AtomicBool::new(true));
    let printer = spawn_delegate_printer(Arc::clone(&announcer), Arc::clone(&running))
        .context("starting delegate printer")?;

    println!(
        "{} {} ready, backends: [{}]",
        annunciator::APP_NAME,
        annunciator::VERSION,
        announcer.status().available_backends.join(", ")
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            ":quit" => break,
            ":status" => reply(&announcer.status())?,
            ":clear" => reply(&announcer.clear_queue())?,
            ":mute" => {
                announcer.set_muted(true);
                reply(&announcer.status())?
            }
            ":unmute" => {
                announcer.set_muted(false);
                reply(&announcer.status())?
            }
            ":restart" => reply(&RestartReply {
                success: announcer.restart(),
            })?,
            _ if line.starts_with('[') => match parse_detections(line) {
                Ok(detections) => {
                    debug!("Received {} detections", detections.len());
                    reply(&EnqueueReply {
                        queued: announcer.announce_detections(&detections),
                    })?
                }
                Err(e) => {
                    warn!("Ignoring malformed detection batch: {}", e);
                    reply(&EnqueueReply { queued: false })?
                }
            },
            text => reply(&EnqueueReply {
                queued: announcer.enqueue(text),
            })?,
        }
    }

    running.store(false, Ordering::SeqCst);
    if printer.join().is_err() {
        warn!("Delegate printer panicked");
    }

    if let Err(e) = announcer.stop(announcer.settings().stop_timeout) {
        warn!("{}", e);
    }
    flush_delegated(&announcer)?;
    info!("Annunciator exiting");
    Ok(())
}

fn reply<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn flush_delegated(announcer: &Announcer) -> io::Result<()> {
    let delegated = announcer.take_delegated();
    if delegated.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for text in delegated {
        writeln!(out, "delegate: {}", text)?;
    }
    out.flush()
}

fn spawn_delegate_printer(
    announcer: Arc<Announcer>,
    running: Arc<AtomicBool>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("delegate-printer".to_string())
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                if let Err(e) = flush_delegated(&announcer) {
                    warn!("Failed to print delegated announcements: {}", e);
                }
                thread::sleep(DELEGATE_POLL);
            }
        })
}
