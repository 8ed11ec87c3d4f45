//! Route Configuration
//!
//! Attaches addresses to the virtual interface and points routing at it.
//!
//! # Steps
//!
//! 1. IPv4 point-to-point address on the interface
//! 2. IPv6 address on the interface
//! 3. Either the bypass route set (LAN keeps the existing default route) or
//!    the IPv4 split default routes
//! 4. IPv6 split default routes
//!
//! Defaults are taken over with two half-space routes instead of deleting the
//! host's default route. Every route installed here is bound to the virtual
//! interface, so stopping the engine removes all of them and the previous
//! default route is in effect again.
//!
//! Every step is attempted even after an earlier one failed, unless it needs
//! the address a failed step was supposed to assign. Each failure is logged;
//! the caller receives one error naming the last failing command.

use crate::command::{format_command, CommandError, CommandRunner};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Client address of the virtual interface
pub const TUN_ADDR4: &str = "172.19.0.1";

/// Point-to-point peer of the virtual interface
pub const TUN_PEER4: &str = "172.19.0.2";

/// IPv6 address of the virtual interface
pub const TUN_ADDR6: &str = "fdfe:dcba:9876::1";

/// IPv4 default route, as two halves that outrank `0.0.0.0/0`
pub const SPLIT_DEFAULT_ROUTES4: &[&str] = &["0.0.0.0/1", "128.0.0.0/1"];

/// IPv6 default route, as two halves that outrank `::/0`
pub const SPLIT_DEFAULT_ROUTES6: &[&str] = &["::/1", "8000::/1"];

/// Routes installed in bypass-LAN mode.
///
/// Covers the public IPv4 space with 0/8, 10/8, 127/8, 169.254/16,
/// 172.16/12, 192.168/16 and multicast carved out.
pub const BYPASS_PRIVATE_ROUTES: &[&str] = &[
    "1.0.0.0/8",
    "2.0.0.0/7",
    "4.0.0.0/6",
    "8.0.0.0/7",
    "11.0.0.0/8",
    "12.0.0.0/6",
    "16.0.0.0/4",
    "32.0.0.0/3",
    "64.0.0.0/3",
    "96.0.0.0/4",
    "112.0.0.0/5",
    "120.0.0.0/6",
    "124.0.0.0/7",
    "126.0.0.0/8",
    "128.0.0.0/3",
    "160.0.0.0/5",
    "168.0.0.0/8",
    "169.0.0.0/9",
    "169.128.0.0/10",
    "169.192.0.0/11",
    "169.224.0.0/12",
    "169.240.0.0/13",
    "169.248.0.0/14",
    "169.252.0.0/15",
    "169.255.0.0/16",
    "170.0.0.0/7",
    "172.0.0.0/12",
    "172.32.0.0/11",
    "172.64.0.0/10",
    "172.128.0.0/9",
    "173.0.0.0/8",
    "174.0.0.0/7",
    "176.0.0.0/4",
    "192.0.0.0/9",
    "192.128.0.0/11",
    "192.160.0.0/13",
    "192.169.0.0/16",
    "192.170.0.0/15",
    "192.172.0.0/14",
    "192.176.0.0/12",
    "192.192.0.0/10",
    "193.0.0.0/8",
    "194.0.0.0/7",
    "196.0.0.0/6",
    "200.0.0.0/5",
    "208.0.0.0/4",
];

/// Route configuration errors
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("{command}: {reason} ({failures} command(s) failed)")]
    Command {
        /// Last failing command line
        command: String,
        /// Why it failed
        reason: CommandError,
        /// Number of failed commands in the chain
        failures: usize,
    },

    #[error("Route configuration is not supported on {0}")]
    UnsupportedPlatform(String),
}

impl RouteError {
    /// Command line to report, if any
    pub fn command(&self) -> Option<&str> {
        match self {
            RouteError::Command { command, .. } => Some(command.as_str()),
            RouteError::UnsupportedPlatform(_) => None,
        }
    }
}

/// Programs OS routing for the virtual interface
pub trait RouteConfigurator: Send + Sync {
    /// Assign addresses to `iface` and route traffic through it
    fn configure(&self, iface: &str, bypass_lan: bool) -> Result<(), RouteError>;
}

/// Pick the configurator for `os` (as in `std::env::consts::OS`)
pub fn for_os(os: &str, runner: Arc<dyn CommandRunner>) -> Box<dyn RouteConfigurator> {
    match os {
        "macos" => Box::new(DarwinRoutes::new(runner)),
        "linux" => Box::new(LinuxRoutes::new(runner)),
        other => Box::new(UnsupportedRoutes {
            os: other.to_string(),
        }),
    }
}

/// Pick the configurator for the running platform
pub fn for_current_os(runner: Arc<dyn CommandRunner>) -> Box<dyn RouteConfigurator> {
    for_os(std::env::consts::OS, runner)
}

/// Runs commands in order, remembering the last failure
struct CommandChain<'a> {
    runner: &'a dyn CommandRunner,
    last_failure: Option<(String, CommandError)>,
    failures: usize,
}

impl<'a> CommandChain<'a> {
    fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            last_failure: None,
            failures: 0,
        }
    }

    /// Run a step; returns whether it succeeded
    fn attempt(&mut self, argv: &[&str]) -> bool {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let command = format_command(&argv);

        match self.runner.run(&argv) {
            Ok(_) => {
                debug!("ok: {}", command);
                true
            }
            Err(e) => {
                warn!("Route command failed: {}: {}", command, e);
                self.failures += 1;
                self.last_failure = Some((command, e));
                false
            }
        }
    }

    fn finish(self) -> Result<(), RouteError> {
        match self.last_failure {
            None => Ok(()),
            Some((command, reason)) => Err(RouteError::Command {
                command,
                reason,
                failures: self.failures,
            }),
        }
    }
}

/// macOS: `ifconfig` + BSD `route`
pub struct DarwinRoutes {
    runner: Arc<dyn CommandRunner>,
}

impl DarwinRoutes {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl RouteConfigurator for DarwinRoutes {
    fn configure(&self, iface: &str, bypass_lan: bool) -> Result<(), RouteError> {
        let mut chain = CommandChain::new(self.runner.as_ref());

        let v4 = chain.attempt(&[
            "ifconfig",
            iface,
            TUN_ADDR4,
            TUN_PEER4,
            "netmask",
            "255.255.255.252",
            "up",
        ]);
        let v6 = chain.attempt(&["ifconfig", iface, "inet6", TUN_ADDR6, "prefixlen", "126"]);

        if v4 {
            let routes = if bypass_lan {
                BYPASS_PRIVATE_ROUTES
            } else {
                SPLIT_DEFAULT_ROUTES4
            };
            for &route in routes {
                chain.attempt(&["route", "add", "-net", route, "-interface", iface]);
            }
        }

        if v6 {
            for &route in SPLIT_DEFAULT_ROUTES6 {
                chain.attempt(&["route", "add", "-inet6", "-net", route, "-interface", iface]);
            }
        }

        let result = chain.finish();
        if result.is_ok() {
            info!("Routes configured on {} (bypass LAN: {})", iface, bypass_lan);
        }
        result
    }
}

/// Linux: iproute2
pub struct LinuxRoutes {
    runner: Arc<dyn CommandRunner>,
}

impl LinuxRoutes {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl RouteConfigurator for LinuxRoutes {
    fn configure(&self, iface: &str, bypass_lan: bool) -> Result<(), RouteError> {
        let mut chain = CommandChain::new(self.runner.as_ref());
        let addr4 = format!("{}/30", TUN_ADDR4);
        let addr6 = format!("{}/126", TUN_ADDR6);

        let v4 = chain.attempt(&["ip", "addr", "add", addr4.as_str(), "dev", iface]);
        let up = chain.attempt(&["ip", "link", "set", "dev", iface, "up"]);
        let v6 = chain.attempt(&["ip", "-6", "addr", "add", addr6.as_str(), "dev", iface]);

        if v4 && up {
            let routes = if bypass_lan {
                BYPASS_PRIVATE_ROUTES
            } else {
                SPLIT_DEFAULT_ROUTES4
            };
            for &route in routes {
                chain.attempt(&["ip", "route", "replace", route, "dev", iface]);
            }
        }

        if v6 && up {
            for &route in SPLIT_DEFAULT_ROUTES6 {
                chain.attempt(&["ip", "-6", "route", "replace", route, "dev", iface]);
            }
        }

        let result = chain.finish();
        if result.is_ok() {
            info!("Routes configured on {} (bypass LAN: {})", iface, bypass_lan);
        }
        result
    }
}

/// Platforms without a route implementation
pub struct UnsupportedRoutes {
    os: String,
}

impl RouteConfigurator for UnsupportedRoutes {
    fn configure(&self, _iface: &str, _bypass_lan: bool) -> Result<(), RouteError> {
        Err(RouteError::UnsupportedPlatform(self.os.clone()))
    }
}
