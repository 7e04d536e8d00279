// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `turnstile status` - Show every resource with waiting connections

use anyhow::Result;
use clap::Args;
use turnstile::{LockClient, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn handle(client: &LockClient, args: StatusArgs) -> Result<()> {
    let entries = client.status().await?;

    match args.format {
        OutputFormat::Text if entries.is_empty() => println!("No resources held"),
        format => println!("{}", turnstile::output::render_list(&entries, format)?),
    }

    Ok(())
}
