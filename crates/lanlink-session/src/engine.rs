//! Session Engine
//!
//! The engine forwards traffic between the virtual interface and the SOCKS
//! proxy on the device. It is a black box behind [`SessionEngine`]; the
//! built-in [`ProcessEngine`] runs an external forwarder (tun2socks by
//! default) as a child process.
//!
//! # Argument template
//!
//! Placeholders expanded in every argument:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{iface}` | virtual interface name |
//! | `{target}` | device IP |
//! | `{socks_port}` | SOCKS port |
//! | `{dns_port}` | DNS port |
//! | `{dns}` | `target:dns_port` |
//! | `{proxy}` | `socks5://target:port` |
//! | `{mtu}` | MTU |
//! | `{log_level}` | `debug` or `info` |

use crate::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Engine errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited during startup ({status})")]
    Exited { program: String, status: String },

    #[error("Engine stopped unexpectedly ({0})")]
    Died(String),

    #[error("Engine error: {0}")]
    Other(String),
}

/// Starts forwarding sessions
pub trait SessionEngine: Send + Sync {
    /// Bring up the virtual interface and start forwarding
    fn start(&self, config: &SessionConfig) -> Result<Box<dyn EngineHandle>, EngineError>;
}

/// A running session
pub trait EngineHandle: Send {
    /// Stop forwarding. Safe to call more than once.
    fn stop(&mut self);

    /// Exit status if the engine went away on its own
    fn poll_exit(&mut self) -> Option<String>;
}

/// External forwarder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program to run
    pub program: String,
    /// Argument template
    pub args: Vec<String>,
    /// How long the program must stay up to count as started (ms)
    pub startup_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "tun2socks".to_string(),
            args: [
                "-device",
                "tun://{iface}",
                "-proxy",
                "{proxy}",
                "-mtu",
                "{mtu}",
                "-loglevel",
                "{log_level}",
                "-dns",
                "{dns}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            startup_grace_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Expand the argument template for `config`
    pub fn expand_args(&self, config: &SessionConfig) -> Vec<String> {
        let log_level = if config.debug { "debug" } else { "info" };

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{iface}", &config.tun_name)
                    .replace("{target}", &config.target.to_string())
                    .replace("{socks_port}", &config.socks_port.to_string())
                    .replace("{dns_port}", &config.dns_port.to_string())
                    .replace("{dns}", &config.dns_addr().to_string())
                    .replace("{proxy}", &config.proxy_url())
                    .replace("{mtu}", &config.mtu.to_string())
                    .replace("{log_level}", log_level)
            })
            .collect()
    }

    /// Whether the template hands the DNS port to the forwarder
    pub fn forwards_dns(&self) -> bool {
        self.args
            .iter()
            .any(|arg| arg.contains("{dns}") || arg.contains("{dns_port}"))
    }
}

/// Runs the forwarder as a child process
pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    /// Create a new process engine
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl SessionEngine for ProcessEngine {
    fn start(&self, config: &SessionConfig) -> Result<Box<dyn EngineHandle>, EngineError> {
        let program = self.config.program.clone();
        let args = self.config.expand_args(config);

        if !self.config.forwards_dns() {
            warn!(
                "Engine arguments have no {{dns}} or {{dns_port}}; DNS port {} is not used",
                config.dns_port
            );
        }
        info!("Starting engine: {} {}", program, args.join(" "));

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let mut handle = ProcessHandle {
            program,
            child: Some(child),
        };

        // The forwarder creates the interface itself; give it time to fail
        let grace = Duration::from_millis(self.config.startup_grace_ms);
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = handle.poll_exit() {
                return Err(EngineError::Exited {
                    program: handle.program.clone(),
                    status,
                });
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20).min(grace));
        }

        debug!("Engine {} running", handle.program);
        Ok(Box::new(handle))
    }
}

/// Child process of a [`ProcessEngine`]
pub struct ProcessHandle {
    program: String,
    child: Option<Child>,
}

impl EngineHandle for ProcessHandle {
    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!("Stopping engine {}", self.program);
        if let Err(e) = child.kill() {
            debug!("kill {}: {}", self.program, e);
        }
        if let Err(e) = child.wait() {
            warn!("Failed to reap {}: {}", self.program, e);
        }
    }

    fn poll_exit(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        let status = match child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => return None,
            Err(e) => e.to_string(),
        };

        // Reaped; nothing left to stop
        self.child = None;
        Some(status)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
