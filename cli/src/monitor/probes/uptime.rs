//! # Remote Uptime Probe
//!
//! File: cli/src/monitor/probes/uptime.rs
//!
//! ## Overview
//!
//! Logs into a device over SSH, runs `uptime`, and extracts the "up ..." part. Only
//! used in host mode; the tools container has no SSH client configured for it.
//!
//! Steps: TCP connect to the SSH port (cheap reachability check), then one
//! non-interactive `ssh` invocation. Password authentication goes through
//! `sshpass -e`, which reads the password from the `SSHPASS` environment variable so it
//! never appears in the process list. Without a password, `BatchMode` makes ssh fail
//! fast instead of prompting.
//!
//! Every failure is reported as `{available: false, reason}`.
//!
use crate::common::process::run_captured;
use crate::core::config::SshConfig;
use crate::core::error::{LanwatchError, Result};
use crate::monitor::model::{SshCredentials, UptimeResult};
use anyhow::anyhow;
use async_trait::async_trait;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

const SANDBOX_REASON: &str = "not used in sandbox mode";

struct UptimePatterns {
    users: Regex,
    load: Regex,
}

fn patterns() -> &'static UptimePatterns {
    static PATTERNS: OnceLock<UptimePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| UptimePatterns {
        users: Regex::new(r"up\s+(.*?),\s+\d+\s+users?").expect("valid users regex"),
        load: Regex::new(r"up\s+(.*?),\s+load average").expect("valid load regex"),
    })
}

/// The duration part of `uptime` output, e.g. `3 days,  4:02`.
pub fn parse_uptime(output: &str) -> Option<String> {
    let p = patterns();
    p.users
        .captures(output)
        .or_else(|| p.load.captures(output))
        .map(|c| c[1].trim().to_string())
}

/// Usernames go on the ssh command line; anything that could be read as an option is refused.
fn validate_username(username: &str) -> Result<()> {
    let ok = !username.is_empty()
        && !username.starts_with('-')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(anyhow!(LanwatchError::Validation(format!(
            "invalid SSH username '{}'",
            username
        ))))
    }
}

/// Runs one command on a remote host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, ip: IpAddr, creds: &SshCredentials, command: &str) -> Result<String>;
}

/// `RemoteShell` using the system `ssh` client.
pub struct SshShell {
    port: u16,
    connect_timeout_secs: u64,
}

impl SshShell {
    pub fn new(cfg: &SshConfig) -> Self {
        Self {
            port: cfg.port,
            connect_timeout_secs: cfg.connect_timeout_secs,
        }
    }

    fn command(&self, ip: IpAddr, creds: &SshCredentials, remote: &str) -> Command {
        let mut cmd = match &creds.password {
            Some(password) => {
                let mut c = Command::new("sshpass");
                c.arg("-e").arg("ssh").env("SSHPASS", password);
                c
            }
            None => {
                let mut c = Command::new("ssh");
                c.args(["-o", "BatchMode=yes"]);
                c
            }
        };
        cmd.args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", creds.username, ip))
            .arg(remote);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, ip: IpAddr, creds: &SshCredentials, command: &str) -> Result<String> {
        validate_username(&creds.username)?;
        let label = format!("ssh {}@{} {}", creds.username, ip, command);
        let budget = Duration::from_secs(self.connect_timeout_secs + 10);
        let captured = run_captured(&mut self.command(ip, creds, command), &label, budget).await?;
        if !captured.success() {
            return Err(anyhow!(LanwatchError::ExternalCommand {
                cmd: label,
                status: format!("{:?}", captured.code),
                output: captured.output.trim().to_string(),
            }));
        }
        Ok(captured.output)
    }
}

/// Remote uptime over SSH.
pub struct UptimeProbe {
    sandbox: bool,
    port: u16,
    connect_timeout: Duration,
    shell: Arc<dyn RemoteShell>,
}

impl UptimeProbe {
    pub fn new(sandbox: bool, port: u16, connect_timeout: Duration, shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            sandbox,
            port,
            connect_timeout,
            shell,
        }
    }

    pub fn from_config(sandbox: bool, cfg: &SshConfig) -> Self {
        Self::new(
            sandbox,
            cfg.port,
            Duration::from_secs(cfg.connect_timeout_secs),
            Arc::new(SshShell::new(cfg)),
        )
    }

    async fn port_open(&self, ip: IpAddr) -> bool {
        let addr = SocketAddr::new(ip, self.port);
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    pub async fn measure(&self, ip: IpAddr, creds: &SshCredentials) -> UptimeResult {
        if self.sandbox {
            return UptimeResult::unavailable(SANDBOX_REASON);
        }
        if !self.port_open(ip).await {
            return UptimeResult::unavailable(format!("SSH port {} not reachable", self.port));
        }

        let raw = match self.shell.run(ip, creds, "uptime").await {
            Ok(raw) => raw.trim().to_string(),
            Err(e) => {
                debug!("uptime over ssh failed for {}: {:#}", ip, e);
                return UptimeResult::unavailable(format!("{:#}", e));
            }
        };
        match parse_uptime(&raw) {
            Some(uptime) => UptimeResult {
                available: true,
                uptime_string: Some(uptime),
                raw: Some(raw),
                reason: None,
            },
            None => UptimeResult {
                available: false,
                uptime_string: None,
                raw: Some(raw),
                reason: Some("unrecognized uptime output".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    struct FixedShell {
        reply: Result<String>,
        commands: Mutex<Vec<String>>,
    }

    impl FixedShell {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteShell for FixedShell {
        async fn run(&self, _ip: IpAddr, _creds: &SshCredentials, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    fn creds() -> SshCredentials {
        SshCredentials {
            username: "pi".into(),
            password: Some("raspberry".into()),
        }
    }

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_parse_uptime_variants() {
        assert_eq!(
            parse_uptime(" 10:15:01 up 3 days,  4:02,  2 users,  load average: 0.00, 0.01, 0.05")
                .as_deref(),
            Some("3 days,  4:02")
        );
        assert_eq!(
            parse_uptime(" 10:15:01 up 12 min,  1 user,  load average: 0.10, 0.20, 0.30")
                .as_deref(),
            Some("12 min")
        );
        assert_eq!(
            parse_uptime(" 10:15:01 up 5:47,  load average: 0.30, 0.28, 0.25").as_deref(),
            Some("5:47")
        );
        assert_eq!(parse_uptime("garbage"), None);
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("pi").is_ok());
        assert!(validate_username("svc.monitor_1").is_ok());
        assert!(validate_username("-oProxyCommand=x").is_err());
        assert!(validate_username("root;reboot").is_err());
        assert!(validate_username("").is_err());
    }

    #[tokio::test]
    async fn test_sandbox_mode_is_not_used() {
        let shell = Arc::new(FixedShell::ok("up 1 day, 1 user"));
        let probe = UptimeProbe::new(true, 22, Duration::from_millis(200), shell.clone());
        let r = probe.measure(localhost(), &creds()).await;
        assert!(!r.available);
        assert_eq!(r.reason.as_deref(), Some("not used in sandbox mode"));
        assert!(shell.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uptime_over_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let shell = Arc::new(FixedShell::ok(
            " 10:15:01 up 3 days,  4:02,  2 users,  load average: 0.00, 0.01, 0.05\n",
        ));
        let probe = UptimeProbe::new(false, port, Duration::from_secs(1), shell.clone());
        let r = probe.measure(localhost(), &creds()).await;

        assert!(r.available);
        assert_eq!(r.uptime_string.as_deref(), Some("3 days,  4:02"));
        assert!(r.raw.unwrap().starts_with("10:15:01 up"));
        assert_eq!(*shell.commands.lock().unwrap(), vec!["uptime"]);
    }

    #[tokio::test]
    async fn test_closed_port_is_unavailable() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let shell = Arc::new(FixedShell::ok("unused"));
        let probe = UptimeProbe::new(false, port, Duration::from_millis(500), shell.clone());
        let r = probe.measure(localhost(), &creds()).await;
        assert!(!r.available);
        assert!(r.reason.unwrap().contains("not reachable"));
        assert!(shell.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ssh_failure_becomes_reason() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shell = Arc::new(FixedShell {
            reply: Err(anyhow!("Permission denied (publickey,password).")),
            commands: Mutex::new(Vec::new()),
        });
        let probe = UptimeProbe::new(false, port, Duration::from_secs(1), shell);
        let r = probe.measure(localhost(), &creds()).await;
        assert!(!r.available);
        assert!(r.reason.unwrap().contains("Permission denied"));
    }
}
