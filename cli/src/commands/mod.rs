//! # LanWatch Command Modules
//!
//! File: cli/src/commands/mod.rs
//!
//! ## Overview
//!
//! Top-level subcommands of the `lanwatch` CLI and the wiring they share:
//!
//! - `scan`: discover devices in a target range
//! - `sweep`: one round of latency/bandwidth/uptime probes
//! - `watch`: repeated sweeps with running uptime percentages
//! - `parse`: turn saved nmap output into grouped device JSON
//! - `sandbox`: inspect or tear down the tools container
//!
//! ## Architecture
//!
//! Each subcommand owns its clap `Args` struct and an async `handle_*` function.
//! `load_config` and `build_engine` here turn configuration plus flags into a
//! ready `ScanOrchestrator`, so handlers stay small.
//!
use crate::core::config::{self, Config};
use crate::core::error::Result;
use crate::monitor::history::HistoryStore;
use crate::monitor::orchestrator::ScanOrchestrator;
use crate::monitor::probes::ProbeSuite;
use crate::monitor::sandbox::SandboxCommandExecutor;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub mod parse;
pub mod sandbox;
pub mod scan;
pub mod sweep;
pub mod watch;

/// Explicit `--config` file, or the user/project config search.
pub(crate) fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => config::load_config_from_file(path),
        None => config::load_config(),
    }
    .context("Failed to load LanWatch configuration")
}

/// Orchestrator plus the sandbox executor it probes through, when sandboxed.
pub(crate) struct Engine {
    pub orchestrator: ScanOrchestrator,
    pub executor: Option<Arc<SandboxCommandExecutor>>,
}

impl Engine {
    /// Logs how much work went through the sandbox executor, if one was used.
    pub fn log_executor_status(&self) {
        if let Some(executor) = &self.executor {
            let status = executor.status();
            debug!(
                "Sandbox executor: state {:?}, {} command(s) executed, {} queued",
                status.state, status.executed, status.queued
            );
        }
    }
}

/// Wires history, probes and scan runners for one invocation.
pub(crate) fn build_engine(cfg: &Config, use_sandbox: bool) -> Result<Engine> {
    debug!("Building engine (sandbox: {})", use_sandbox);
    let executor = use_sandbox.then(|| Arc::new(SandboxCommandExecutor::docker(&cfg.sandbox)));
    let probes = ProbeSuite::from_config(cfg, use_sandbox, executor.clone())?;
    let history = Arc::new(HistoryStore::new(cfg.history.max_items));
    debug!("History keeps {} entries per series", history.max_items());
    let orchestrator = ScanOrchestrator::new(
        history,
        cfg.scan.clone(),
        cfg.sandbox.clone(),
        Arc::new(probes),
    );
    Ok(Engine {
        orchestrator,
        executor,
    })
}
