//! # Parse Command
//!
//! File: cli/src/commands/parse.rs
//!
//! ## Overview
//!
//! `lanwatch parse [FILE]` runs the scan-output parser over saved nmap text (or stdin)
//! and prints the devices grouped by vendor as pretty JSON. No scan is performed and no
//! configuration is read.
//!
//! ```bash
//! nmap -sV --script ssh-auth-methods 192.168.1.0/24 > scan.txt
//! lanwatch parse scan.txt
//! lanwatch parse --all < scan.txt     # include hosts reported down
//! ```
//!
use crate::core::error::Result;
use crate::monitor::parser;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Parse saved nmap output into grouped device JSON")]
pub struct ParseArgs {
    /// File with nmap text output. Reads stdin when omitted.
    file: Option<PathBuf>,
    /// Keep devices whose status is not up.
    #[arg(long)]
    all: bool,
}

pub async fn handle_parse(args: ParseArgs) -> Result<()> {
    let raw = match &args.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scan output from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read scan output from stdin")?;
            raw
        }
    };

    let grouped = if args.all {
        parser::group_by_vendor(parser::parse_all(&raw))
    } else {
        parser::parse(&raw)
    };
    info!("Parsed {} vendor group(s)", grouped.len());

    let json = serde_json::to_string_pretty(&grouped).context("Failed to serialize devices")?;
    println!("{}", json);
    Ok(())
}
