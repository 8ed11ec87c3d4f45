//! Session Configuration
//!
//! Merges operator overrides onto the configuration a device advertised.
//!
//! Port overrides use "non-default wins": a flag still at its documented
//! default is treated as not given. Boolean overrides can only switch a
//! feature on, never off.

use lanlink_discovery::CandidateDevice;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Default remote SOCKS port
pub const DEFAULT_SOCKS_PORT: u16 = 2080;

/// Default remote DNS port
pub const DEFAULT_DNS_PORT: u16 = 6450;

/// Default virtual interface MTU
pub const DEFAULT_MTU: u32 = 1500;

/// Default virtual interface name for the running platform
pub fn default_tun_name() -> &'static str {
    tun_name_for(std::env::consts::OS)
}

/// Default virtual interface name for `os` (as in `std::env::consts::OS`)
pub fn tun_name_for(os: &str) -> &'static str {
    match os {
        "macos" => "utun9",
        _ => "tun0",
    }
}

/// Operator-supplied values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// SOCKS port (`DEFAULT_SOCKS_PORT` = not given)
    pub socks_port: u16,
    /// DNS port (`DEFAULT_DNS_PORT` = not given)
    pub dns_port: u16,
    /// Force engine debug logging
    pub debug: bool,
    /// Force LAN bypass routing
    pub bypass_lan: bool,
    /// Virtual interface name
    pub tun_name: String,
    /// Virtual interface MTU
    pub mtu: u32,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            socks_port: DEFAULT_SOCKS_PORT,
            dns_port: DEFAULT_DNS_PORT,
            debug: false,
            bypass_lan: false,
            tun_name: default_tun_name().to_string(),
            mtu: DEFAULT_MTU,
        }
    }
}

/// Final configuration handed to the engine and the route configurator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device running the proxy
    pub target: IpAddr,
    /// SOCKS port on the device
    pub socks_port: u16,
    /// DNS port on the device
    pub dns_port: u16,
    /// Verbose engine logging
    pub debug: bool,
    /// Route only non-LAN ranges through the tunnel
    pub bypass_lan: bool,
    /// Virtual interface name
    pub tun_name: String,
    /// Virtual interface MTU
    pub mtu: u32,
}

impl SessionConfig {
    /// Merge `overrides` onto the selected device's advertised values
    pub fn merge(device: &CandidateDevice, overrides: &Overrides) -> Self {
        let info = &device.info;

        let socks_port = if overrides.socks_port != DEFAULT_SOCKS_PORT {
            overrides.socks_port
        } else {
            info.socks_port
        };

        let dns_port = if overrides.dns_port != DEFAULT_DNS_PORT {
            overrides.dns_port
        } else {
            info.dns_port
        };

        Self {
            target: device.ip(),
            socks_port,
            dns_port,
            debug: info.debug || overrides.debug,
            bypass_lan: info.bypass_lan || overrides.bypass_lan,
            tun_name: overrides.tun_name.clone(),
            mtu: overrides.mtu,
        }
    }

    /// SOCKS proxy URL on the device
    pub fn proxy_url(&self) -> String {
        match self.target {
            IpAddr::V4(ip) => format!("socks5://{}:{}", ip, self.socks_port),
            IpAddr::V6(ip) => format!("socks5://[{}]:{}", ip, self.socks_port),
        }
    }

    /// DNS endpoint on the device
    pub fn dns_addr(&self) -> SocketAddr {
        SocketAddr::new(self.target, self.dns_port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socks_port == 0 || self.dns_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.tun_name.is_empty() {
            return Err(ConfigError::InvalidInterface);
        }
        if self.mtu < 576 {
            return Err(ConfigError::MtuTooLow(self.mtu));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid proxy port")]
    InvalidPort,

    #[error("Virtual interface name is empty")]
    InvalidInterface,

    #[error("MTU {0} too low (minimum 576)")]
    MtuTooLow(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_discovery::{DeviceInfo, PROTOCOL_VERSION};
    use std::net::SocketAddr;

    fn discovered(socks_port: u16, dns_port: u16, debug: bool, bypass_lan: bool) -> CandidateDevice {
        CandidateDevice {
            responder: "192.168.1.2:11451".parse::<SocketAddr>().unwrap(),
            interface: Some("en0".to_string()),
            info: DeviceInfo {
                version: PROTOCOL_VERSION,
                device_name: "Router".to_string(),
                socks_port,
                dns_port,
                debug,
                bypass_lan,
            },
        }
    }

    #[test]
    fn test_non_default_override_wins() {
        let device = discovered(2080, 6450, false, false);
        let overrides = Overrides {
            socks_port: 2080,
            dns_port: 9999,
            debug: true,
            bypass_lan: false,
            ..Overrides::default()
        };

        let config = SessionConfig::merge(&device, &overrides);

        assert_eq!(config.socks_port, 2080);
        assert_eq!(config.dns_port, 9999);
        assert!(config.debug);
        assert!(!config.bypass_lan);
        assert_eq!(config.target, "192.168.1.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_defaults_keep_discovered_values() {
        let device = discovered(1080, 53, false, false);
        let config = SessionConfig::merge(&device, &Overrides::default());

        assert_eq!(config.socks_port, 1080);
        assert_eq!(config.dns_port, 53);
        assert_eq!(config.mtu, DEFAULT_MTU);
    }

    #[test]
    fn test_default_cannot_be_forced() {
        // Asking for the default port is indistinguishable from not asking
        let device = discovered(1080, 53, false, false);
        let overrides = Overrides {
            socks_port: DEFAULT_SOCKS_PORT,
            ..Overrides::default()
        };

        assert_eq!(SessionConfig::merge(&device, &overrides).socks_port, 1080);
    }

    #[test]
    fn test_boolean_overrides_only_enable() {
        let device = discovered(2080, 6450, true, true);
        let config = SessionConfig::merge(&device, &Overrides::default());
        assert!(config.debug);
        assert!(config.bypass_lan);

        let device = discovered(2080, 6450, false, false);
        let overrides = Overrides {
            bypass_lan: true,
            ..Overrides::default()
        };
        let config = SessionConfig::merge(&device, &overrides);
        assert!(!config.debug);
        assert!(config.bypass_lan);
    }

    #[test]
    fn test_manual_target() {
        let device = CandidateDevice::manual("192.168.1.50".parse().unwrap(), 1090, DEFAULT_DNS_PORT);
        let overrides = Overrides {
            socks_port: 1090,
            ..Overrides::default()
        };

        let config = SessionConfig::merge(&device, &overrides);

        assert_eq!(config.target, "192.168.1.50".parse::<IpAddr>().unwrap());
        assert_eq!(config.socks_port, 1090);
        assert_eq!(config.dns_port, DEFAULT_DNS_PORT);
    }

    #[test]
    fn test_proxy_url() {
        let config = SessionConfig::merge(&discovered(1080, 53, false, false), &Overrides::default());
        assert_eq!(config.proxy_url(), "socks5://192.168.1.2:1080");
        assert_eq!(config.dns_addr().to_string(), "192.168.1.2:53");
    }

    #[test]
    fn test_validate() {
        let mut config =
            SessionConfig::merge(&discovered(1080, 53, false, false), &Overrides::default());
        assert!(config.validate().is_ok());

        config.mtu = 100;
        assert!(matches!(config.validate(), Err(ConfigError::MtuTooLow(100))));

        config.mtu = DEFAULT_MTU;
        config.socks_port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_tun_name_per_os() {
        assert_eq!(tun_name_for("macos"), "utun9");
        assert_eq!(tun_name_for("linux"), "tun0");
    }
}
