// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile - lock coordinator client

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{run, status};
use turnstile::LockClient;

#[derive(Parser)]
#[command(
    name = "turnstile",
    version,
    about = "Turnstile - run commands under network locks"
)]
struct Cli {
    /// Coordinator host [default: $TURNSTILE_HOST or localhost]
    #[arg(long, global = true)]
    host: Option<String>,

    /// Coordinator port [default: $TURNSTILE_PORT or 12312]
    #[arg(long, short, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program while holding a lock
    Run(run::RunArgs),
    /// Show resources and their waiting connections
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    let defaults = LockClient::from_env()?;
    let client = LockClient::new(
        cli.host.unwrap_or_else(|| defaults.host().to_string()),
        cli.port.unwrap_or(defaults.port()),
    );

    match cli.command {
        Commands::Run(args) => {
            let code = run::handle(&client, args).await?;
            std::process::exit(code);
        }
        Commands::Status(args) => status::handle(&client, args).await,
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
