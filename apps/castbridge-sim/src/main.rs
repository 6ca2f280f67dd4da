//! Castbridge simulator.
//!
//! Boots a cast session over simulated Google Cast receivers and AirPlay
//! routes, runs a command script against it and prints every host event as a
//! JSON line.

mod config;
mod script;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use castbridge_core::{bootstrap_session, HostEvent, TokioSpawner};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;

use crate::config::SimConfig;

/// Castbridge session simulator.
#[derive(Parser, Debug)]
#[command(name = "castbridge-sim")]
#[command(about = "Drive a simulated cast session from a command script")]
#[command(version)]
struct Args {
    /// Path to configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Script to run; reads stdin when omitted.
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "CASTBRIDGE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Connect timeout in milliseconds (overrides config).
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Stay alive after the script finishes until Ctrl+C.
    #[arg(long)]
    linger: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON event stream.
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting castbridge-sim v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SimConfig::load(args.config.as_deref())?;
    if let Some(timeout) = args.connect_timeout_ms {
        config.connect_timeout_ms = Some(timeout);
    }

    let boot = bootstrap_session(
        &config.to_core_config(),
        config.backends(),
        TokioSpawner::current(),
    )
    .context("Failed to bootstrap cast session")?;

    log::info!(
        "Session ready: {} receiver(s), {} AirPlay route(s), providers {:?}",
        config.receivers.len(),
        config.airplay_routes.len(),
        boot.providers
    );

    let printer = tokio::spawn(print_events(boot.subscribe()));

    let source = read_script(args.script.as_deref()).await?;
    let commands = script::parse_script(&source).context("Failed to parse script")?;

    let mut stdout = std::io::stdout();
    tokio::select! {
        result = script::run(&boot.session, &commands, &mut stdout) => {
            result.context("Script failed")?;
            if args.linger {
                log::info!("Script finished, waiting for Ctrl+C");
                shutdown_signal().await;
            }
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received");
        }
    }

    boot.session
        .dispose()
        .await
        .context("Failed to dispose session")?;

    // The printer exits once every event sender is gone.
    drop(boot);
    if let Err(e) = printer.await {
        log::warn!("Event printer ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

async fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script: {}", path.display())),
        None => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .context("Failed to read script from stdin")?;
            Ok(source)
        }
    }
}

/// Prints host events as JSON lines until the channel closes.
async fn print_events(mut rx: broadcast::Receiver<HostEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    if let Err(e) = writeln!(stdout, "{}", line) {
                        log::warn!("Failed to write event: {}", e);
                        break;
                    }
                }
                Err(e) => log::warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event printer lagged, skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
