//! # LanWatch Configuration System
//!
//! File: cli/src/core/config.rs
//!
//! ## Overview
//!
//! This module loads, merges, expands and validates the LanWatch configuration. Every
//! section has complete defaults, so running without any config file is supported.
//!
//! ## Architecture
//!
//! Configuration sources (later sources win, merged key by key):
//! 1. Default values defined in the code
//! 2. User-specific `config.toml` in the platform config dir (e.g. `~/.config/lanwatch/`)
//! 3. Project-specific `.lanwatch.toml` in the current directory or an ancestor
//!    (the search stops at a directory containing `.git`)
//!
//! An explicit `--config <FILE>` replaces steps 2 and 3.
//!
//! Sections:
//! - `[sandbox]`: tools container image/name, networking and exec timeout
//! - `[scan]`: nmap binary, timing template, retry/host-timeout caps, overall scan timeout
//! - `[probes]`: sandbox mode flag, ping counts, bandwidth endpoint and fallback URL
//! - `[ssh]`: default credentials for the remote uptime probe
//! - `[history]`: retention per (ip, metric) series
//!
//! ## Examples
//!
//! ```toml
//! [probes]
//! use_sandbox = true
//! bandwidth_host = "iperf.example.net"
//!
//! [ssh]
//! username = "monitor"
//! ```
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Represents the main configuration structure, loaded from TOML files.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// The long-lived tools container that runs probe commands and one-shot scans.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SandboxConfig {
    /// Image providing nmap, ping, iperf3 and curl.
    pub image: String,
    /// Name of the persistent container.
    pub container_name: String,
    /// Run with `network_mode = host` so probes see the LAN directly.
    pub host_network: bool,
    /// Extra capabilities for raw-socket tools (dropped on the reduced retry).
    pub cap_add: Vec<String>,
    /// Command keeping the persistent container alive.
    pub keepalive_command: Vec<String>,
    /// Default budget for a single exec, in milliseconds.
    pub exec_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "lanwatch-tools:latest".to_string(),
            container_name: "lanwatch-tools".to_string(),
            host_network: true,
            cap_add: vec!["NET_RAW".to_string(), "NET_ADMIN".to_string()],
            keepalive_command: vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
            exec_timeout_ms: 30_000,
        }
    }
}

/// Full-range scan settings.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ScanConfig {
    /// Path to the nmap binary used for host scans (can use ~).
    pub nmap_path: String,
    /// Ports scanned when the caller does not pass any (`None` = host discovery only).
    pub default_ports: Option<String>,
    /// nmap timing template, 0..=5.
    pub timing_template: u8,
    pub max_retries: u32,
    /// Per-host timeout passed to `--host-timeout` (nmap time syntax, e.g. "30s").
    pub host_timeout: String,
    /// Budget for the whole scan, in seconds.
    pub timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            default_ports: None,
            timing_template: 4,
            max_retries: 2,
            host_timeout: "30s".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Performance probe settings.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ProbeConfig {
    /// Route probes through the tools container instead of host binaries.
    pub use_sandbox: bool,
    pub host_ping_count: u32,
    pub sandbox_ping_count: u32,
    pub ping_timeout_ms: u64,
    /// Fixed iperf3 endpoint. Host and port only.
    pub bandwidth_host: String,
    pub bandwidth_port: u16,
    pub iperf_duration_secs: u32,
    pub bandwidth_timeout_ms: u64,
    /// Bulk download used by the curl fallback tier.
    pub curl_test_url: String,
    pub curl_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            use_sandbox: false,
            host_ping_count: 3,
            sandbox_ping_count: 5,
            ping_timeout_ms: 15_000,
            bandwidth_host: "iperf.he.net".to_string(),
            bandwidth_port: 5201,
            iperf_duration_secs: 5,
            bandwidth_timeout_ms: 30_000,
            curl_test_url: "http://speedtest.tele2.net/10MB.zip".to_string(),
            curl_timeout_ms: 30_000,
        }
    }
}

/// Defaults for the remote uptime probe.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SshConfig {
    pub username: String,
    /// Password for `sshpass`. When absent, key-based auth is attempted.
    pub password: Option<String>,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: None,
            port: 22,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HistoryConfig {
    /// Entries retained per (ip, metric) series.
    pub max_items: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_items: crate::monitor::history::MAX_HISTORY_ITEMS,
        }
    }
}

const PROJECT_CONFIG_FILENAME: &str = ".lanwatch.toml";

/// Loads configuration from the default locations (user file, then project file).
pub fn load_config() -> Result<Config> {
    let user = load_user_config()?;
    let project = load_project_config()?;
    let merged = merge_values(user, project);
    finish(merged)
}

/// Loads configuration from one explicit file, skipping the default search.
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {}", path.display());
    let value = read_toml_value(path)?;
    finish(Some(value))
}

fn finish(value: Option<toml::Value>) -> Result<Config> {
    let mut config: Config = match value {
        Some(v) => v
            .try_into()
            .map_err(|e| anyhow!(LanwatchError::Config(format!("{}", e))))
            .context("Failed to interpret configuration")?,
        None => Config::default(),
    };
    expand_config_paths(&mut config);
    validate_config(&config).context("Configuration validation failed")?;
    debug!("Final loaded configuration: {:?}", config);
    Ok(config)
}

fn load_user_config() -> Result<Option<toml::Value>> {
    if let Some(proj_dirs) = ProjectDirs::from("com", "LanWatch", "lanwatch") {
        let config_path = proj_dirs.config_dir().join("config.toml");
        if config_path.exists() {
            info!("Loading user configuration from: {}", config_path.display());
            read_toml_value(&config_path).map(Some)
        } else {
            debug!(
                "User configuration file not found at {}",
                config_path.display()
            );
            Ok(None)
        }
    } else {
        warn!("Could not determine user config directory.");
        Ok(None)
    }
}

fn load_project_config() -> Result<Option<toml::Value>> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    match find_project_config_path(&current_dir) {
        Some(path) => {
            info!("Loading project configuration from: {}", path.display());
            read_toml_value(&path).map(Some)
        }
        None => {
            debug!("No project configuration file (.lanwatch.toml) found.");
            Ok(None)
        }
    }
}

fn find_project_config_path(start: &Path) -> Option<PathBuf> {
    let mut path = start;
    loop {
        let project_config = path.join(PROJECT_CONFIG_FILENAME);
        if project_config.is_file() {
            return Some(project_config);
        }
        if path.join(".git").is_dir() {
            debug!(
                "Found .git directory at {}, stopping project config search.",
                path.display()
            );
            return None;
        }
        path = path.parent()?;
    }
}

fn read_toml_value(path: &Path) -> Result<toml::Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML from file: {}", path.display()))
}

/// Deep-merges `overlay` on top of `base`. Tables merge key by key, everything else is replaced.
fn merge_values(base: Option<toml::Value>, overlay: Option<toml::Value>) -> Option<toml::Value> {
    match (base, overlay) {
        (None, o) => o,
        (b, None) => b,
        (Some(toml::Value::Table(mut b)), Some(toml::Value::Table(o))) => {
            for (key, value) in o {
                let merged = match b.remove(&key) {
                    Some(existing) => merge_values(Some(existing), Some(value)),
                    None => Some(value),
                };
                if let Some(v) = merged {
                    b.insert(key, v);
                }
            }
            Some(toml::Value::Table(b))
        }
        (_, o) => o,
    }
}

fn expand_config_paths(config: &mut Config) {
    config.scan.nmap_path = shellexpand::tilde(&config.scan.nmap_path).into_owned();
    debug!("Expanded nmap path: {}", config.scan.nmap_path);
}

fn validate_config(config: &Config) -> Result<()> {
    info!("Validating final configuration...");
    if config.scan.timing_template > 5 {
        return Err(anyhow!(LanwatchError::Config(format!(
            "scan.timing_template must be between 0 and 5, got {}.",
            config.scan.timing_template
        ))));
    }
    if config.history.max_items == 0 {
        return Err(anyhow!(LanwatchError::Config(
            "history.max_items must be at least 1.".to_string()
        )));
    }
    if config.probes.bandwidth_host.trim().is_empty() || config.probes.bandwidth_port == 0 {
        return Err(anyhow!(LanwatchError::Config(
            "probes.bandwidth_host and probes.bandwidth_port must be set.".to_string()
        )));
    }
    if config.probes.host_ping_count == 0 || config.probes.sandbox_ping_count == 0 {
        return Err(anyhow!(LanwatchError::Config(
            "Ping counts must be at least 1.".to_string()
        )));
    }
    if config.sandbox.container_name.trim().is_empty() || config.sandbox.image.trim().is_empty() {
        return Err(anyhow!(LanwatchError::Config(
            "sandbox.image and sandbox.container_name cannot be empty.".to_string()
        )));
    }
    if config.sandbox.keepalive_command.is_empty() {
        warn!("sandbox.keepalive_command is empty; the image default command will be used.");
    }
    if let Some(ports) = &config.scan.default_ports {
        crate::monitor::orchestrator::validate_ports(ports)
            .context("scan.default_ports is invalid")?;
    }
    info!("Configuration validation successful.");
    Ok(())
}
