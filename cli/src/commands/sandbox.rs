//! # Sandbox Command
//!
//! File: cli/src/commands/sandbox.rs
//!
//! ## Overview
//!
//! Manages the long-lived tools container that sandboxed probes run in. The container
//! is created on demand by the first sandboxed probe and kept between invocations; these
//! subcommands inspect, warm up or tear it down.
//!
//! - `status`: container existence, state and image as JSON
//! - `start`: create/restart it and print tool versions
//! - `stop`: remove it (`--keep` only stops it)
//!
use super::load_config;
use crate::common::docker;
use crate::core::error::Result;
use crate::monitor::sandbox::SandboxCommandExecutor;
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::Path;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Inspect or tear down the tools container")]
pub struct SandboxArgs {
    #[command(subcommand)]
    command: SandboxCommand,
}

#[derive(Subcommand, Debug)]
enum SandboxCommand {
    /// Show whether the tools container exists and is running.
    Status,
    /// Make sure the tools container is running and report tool versions.
    Start,
    /// Remove the tools container.
    Stop {
        /// Stop it but keep it for a quick restart.
        #[arg(long)]
        keep: bool,
    },
}

pub async fn handle_sandbox(args: SandboxArgs, config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let name = &cfg.sandbox.container_name;

    match args.command {
        SandboxCommand::Status => {
            let exists = docker::container_exists(name).await?;
            let (running, image) = if exists {
                let details = docker::inspect_container(name).await?;
                let running = details
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                (running, details.config.and_then(|c| c.image))
            } else {
                (false, None)
            };
            let status = json!({
                "container": name,
                "exists": exists,
                "running": running,
                "image": image.unwrap_or_else(|| cfg.sandbox.image.clone()),
                "hostNetwork": cfg.sandbox.host_network,
                "execTimeoutMs": cfg.sandbox.exec_timeout_ms,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        SandboxCommand::Start => {
            let executor = SandboxCommandExecutor::docker(&cfg.sandbox);
            let versions = executor
                .exec(
                    "nmap --version | head -n 1; iperf3 --version | head -n 1; curl --version | head -n 1",
                    executor.default_timeout(),
                )
                .await
                .context("Tools container did not come up")?;
            info!("Sandbox executor status: {:?}", executor.status());
            println!("{}", versions.trim_end());
        }
        SandboxCommand::Stop { keep: true } => {
            docker::stop_container(name, Some(5)).await?;
            println!("Stopped {}", name);
        }
        SandboxCommand::Stop { keep: false } => {
            SandboxCommandExecutor::docker(&cfg.sandbox).shutdown().await?;
            println!("Removed {}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_keep_flag() {
        let args = SandboxArgs::try_parse_from(["sandbox", "stop", "--keep"]).unwrap();
        assert!(matches!(args.command, SandboxCommand::Stop { keep: true }));
        let args = SandboxArgs::try_parse_from(["sandbox", "stop"]).unwrap();
        assert!(matches!(args.command, SandboxCommand::Stop { keep: false }));
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon"]
    async fn test_status_without_container() {
        let args = SandboxArgs::try_parse_from(["sandbox", "status"]).unwrap();
        handle_sandbox(args, None).await.unwrap();
    }
}
