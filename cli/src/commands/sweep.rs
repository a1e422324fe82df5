//! # Sweep Command
//!
//! File: cli/src/commands/sweep.rs
//!
//! ## Overview
//!
//! `lanwatch sweep <IP>...` measures each IP once: latency first, then (for hosts that
//! answered) bandwidth, SSH uptime and a connectivity check. One `partialUpdate` JSON
//! line is printed per IP as soon as it finishes, then a final `data`/`sweep` line with
//! everything aggregated.
//!
//! SSH credentials come from `--ssh-user`/`--ssh-password`, the `LANWATCH_SSH_USER` /
//! `LANWATCH_SSH_PASSWORD` environment variables, or the `[ssh]` config section.
//!
use super::{build_engine, load_config};
use crate::common::progress::JsonLinesSink;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::monitor::model::SshCredentials;
use crate::monitor::orchestrator::SweepOptions;
use clap::{Args, Parser};
use std::path::Path;
use tracing::info;

/// Probe flags shared by `sweep` and `watch`.
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Run probes inside the tools container (SSH uptime is skipped).
    #[arg(long)]
    pub sandbox: bool,
    /// IPs probed at the same time. Output order always follows the argument order.
    #[arg(short = 'j', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: u16,
    /// SSH user for the uptime probe.
    #[arg(long, env = "LANWATCH_SSH_USER")]
    pub ssh_user: Option<String>,
    /// SSH password for the uptime probe (passed to sshpass via its environment).
    #[arg(long, env = "LANWATCH_SSH_PASSWORD", hide_env_values = true)]
    pub ssh_password: Option<String>,
}

impl ProbeArgs {
    /// Sweep options; credentials are only overridden when a flag or env var was given.
    pub fn sweep_options(&self, cfg: &Config) -> SweepOptions {
        let credentials = (self.ssh_user.is_some() || self.ssh_password.is_some()).then(|| {
            SshCredentials {
                username: self
                    .ssh_user
                    .clone()
                    .unwrap_or_else(|| cfg.ssh.username.clone()),
                password: self
                    .ssh_password
                    .clone()
                    .or_else(|| cfg.ssh.password.clone()),
            }
        });
        SweepOptions {
            concurrency: usize::from(self.concurrency),
            credentials,
        }
    }

    pub fn use_sandbox(&self, cfg: &Config) -> bool {
        self.sandbox || cfg.probes.use_sandbox
    }
}

#[derive(Parser, Debug)]
#[command(about = "Measure latency, bandwidth and uptime for one or more IPs")]
pub struct SweepArgs {
    /// IP addresses to probe.
    #[arg(required = true, num_args = 1..)]
    ips: Vec<String>,
    #[command(flatten)]
    probe: ProbeArgs,
}

pub async fn handle_sweep(args: SweepArgs, config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let engine = build_engine(&cfg, args.probe.use_sandbox(&cfg))?;
    let opts = args.probe.sweep_options(&cfg);
    let sink = JsonLinesSink::new(std::io::stdout(), false);

    let summary = engine
        .orchestrator
        .performance_sweep(&args.ips, &opts, &sink)
        .await;
    info!(
        "Sweep complete: {} of {} IP(s) measured",
        summary.latency.len(),
        args.ips.len()
    );
    engine.log_executor_status();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_args(user: Option<&str>, password: Option<&str>) -> ProbeArgs {
        ProbeArgs {
            sandbox: false,
            concurrency: 2,
            ssh_user: user.map(str::to_string),
            ssh_password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_credentials_fall_back_to_config() {
        let mut cfg = Config::default();
        cfg.ssh.username = "admin".into();
        cfg.ssh.password = Some("from-config".into());

        assert!(probe_args(None, None).sweep_options(&cfg).credentials.is_none());

        let creds = probe_args(None, Some("secret"))
            .sweep_options(&cfg)
            .credentials
            .unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.as_deref(), Some("secret"));

        let creds = probe_args(Some("pi"), None)
            .sweep_options(&cfg)
            .credentials
            .unwrap();
        assert_eq!(creds.username, "pi");
        assert_eq!(creds.password.as_deref(), Some("from-config"));
    }

    #[test]
    fn test_concurrency_and_sandbox_flags() {
        let mut cfg = Config::default();
        let args = probe_args(None, None);
        assert_eq!(args.sweep_options(&cfg).concurrency, 2);
        assert!(!args.use_sandbox(&cfg));
        cfg.probes.use_sandbox = true;
        assert!(args.use_sandbox(&cfg));
    }
}
