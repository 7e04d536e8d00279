// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turnstile coordinator daemon (turnstiled)
//!
//! Listens for lock clients and serializes access to named resources.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use turnstile_daemon::lifecycle::{self, Config, LifecycleError, Overrides};

#[derive(Parser)]
#[command(
    name = "turnstiled",
    version,
    about = "Turnstile - network lock coordinator"
)]
struct Args {
    /// Host to listen on [default: localhost]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on [default: 12312]
    #[arg(long, short)]
    port: Option<u16>,

    /// Close connections silent for this long, e.g. "10m" [default: 10m]
    #[arg(long, value_parser = humantime::parse_duration)]
    idle_timeout: Option<Duration>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

impl From<Args> for Overrides {
    fn from(args: Args) -> Self {
        Overrides {
            config_path: args.config,
            host: args.host,
            port: args.port,
            idle_timeout: args.idle_timeout,
            log_path: args.log_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let overrides = Overrides::from(Args::parse());

    // Load configuration
    let config = Config::load(&overrides)?;

    // Set up logging
    let _log_guard = setup_logging(&config)?;

    if let Some(path) = &config.config_file {
        info!("Loaded config from {}", path.display());
    }

    info!("Starting turnstiled on {}", config.listen_addr());

    let coordinator = match lifecycle::startup(&config).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to start coordinator: {}", e);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // Signal ready for a parent process waiting on startup
    println!("READY {}", coordinator.local_addr());

    coordinator
        .serve(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            }
        })
        .await;

    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_path) = &config.log_path else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let dir = log_path
        .parent()
        .ok_or_else(|| LifecycleError::NoLogDir(log_path.clone()))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| LifecycleError::NoLogDir(log_path.clone()))?;
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
    }

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(Some(guard))
}
