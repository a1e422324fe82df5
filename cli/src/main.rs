//! # LanWatch Main Entry Point
//!
//! File: cli/src/main.rs
//!
//! ## Overview
//!
//! Entry point for the `lanwatch` CLI. It handles:
//! - Command-line argument parsing using Clap
//! - Setting up the logging system based on verbosity flags
//! - Routing execution to the command handlers
//!
//! ## Architecture
//!
//! - Each top-level command (`scan`, `sweep`, ...) is a variant of the `Commands` enum
//! - Commands are mapped to handler functions in `commands::*`
//! - All errors propagate to this level, are logged and turned into exit status 1
//!
//! Logs go to stderr. Stdout carries only machine-readable output (JSON lines), so
//! `lanwatch scan 192.168.1.0/24 | jq` works at any verbosity.
//!
//! ## Examples
//!
//! ```bash
//! # Discover devices on the local /24
//! lanwatch scan 192.168.1.0/24
//!
//! # Latency, bandwidth and uptime for two hosts, with info logs
//! lanwatch -v sweep 192.168.1.10 192.168.1.20
//!
//! # Parse saved nmap output
//! nmap -sV 10.0.0.0/24 | lanwatch parse
//! ```
//!
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

mod commands; // Subcommand handlers.
mod common; // Docker, process and progress helpers.
mod core; // Config and errors.
mod monitor; // Scan, probe and history engine.

#[derive(Parser, Debug)]
#[command(
    name = "lanwatch",
    about = "LanWatch: local network discovery and device health monitoring",
    long_about = "Discover devices with nmap, then measure latency, bandwidth and uptime.\n\
                  Tools run on the host or inside a Docker tools container (--sandbox).",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Read configuration from FILE instead of the user/project config files.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Commands {
    Scan(commands::scan::ScanArgs),
    Sweep(commands::sweep::SweepArgs),
    Watch(commands::watch::WatchArgs),
    Parse(commands::parse::ParseArgs),
    Sandbox(commands::sandbox::SandboxArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    let config_path = cli.config.as_deref();
    let command_result = match cli.command {
        Commands::Scan(args) => commands::scan::handle_scan(args, config_path).await,
        Commands::Sweep(args) => commands::sweep::handle_sweep(args, config_path).await,
        Commands::Watch(args) => commands::watch::handle_watch(args, config_path).await,
        Commands::Parse(args) => commands::parse::handle_parse(args).await,
        Commands::Sandbox(args) => commands::sandbox::handle_sandbox(args, config_path).await,
    };

    if let Err(e) = command_result {
        if let Some(kind) = crate::core::error::classify(&e).map(|err| err.kind()) {
            tracing::debug!("Failure kind: {}", kind);
        }
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lanwatch", "parse", "-vv", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
