// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `turnstile run <resource> -- <program> [args]` - Run a program under a lock

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tokio::process::Command;
use tracing::debug;
use turnstile::LockClient;

#[derive(Args)]
pub struct RunArgs {
    /// Resource to hold while the program runs (empty runs it unlocked)
    pub resource: String,

    /// Kill the program if it runs longer than this, e.g. "90s"
    #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Program and its arguments
    #[arg(last = true, required = true)]
    pub program: Vec<String>,
}

/// Returns the exit code to leave with
pub async fn handle(client: &LockClient, args: RunArgs) -> Result<i32> {
    let (program, program_args) = args
        .program
        .split_first()
        .ok_or_else(|| anyhow!("no program given"))?;

    let status = client
        .with_lock(&args.resource, args.timeout, || async move {
            debug!(program = %program, "spawning");
            Command::new(program)
                .args(program_args)
                .kill_on_drop(true)
                .status()
                .await
        })
        .await?
        .with_context(|| format!("failed to run {}", program))?;

    // Killed by a signal has no code
    Ok(status.code().unwrap_or(1))
}
