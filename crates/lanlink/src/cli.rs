//! Command-line surface

use clap::Parser;
use lanlink_session::{default_tun_name, Overrides, DEFAULT_DNS_PORT, DEFAULT_MTU, DEFAULT_SOCKS_PORT};
use std::net::IpAddr;
use std::path::PathBuf;

/// Find a companion device on the LAN and tunnel through its proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "lanlink", version, about)]
pub struct Args {
    /// Enable debug log (override)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bypass LAN route (override)
    #[arg(short = 'b', long = "bypass-lan")]
    pub bypass_lan: bool,

    /// Selected device index, 1-based (skip select)
    #[arg(short = 'd', long = "device", value_name = "INDEX")]
    pub device: Option<usize>,

    /// Remote IP address (skip scan)
    #[arg(short = 'a', long = "address", value_name = "IP")]
    pub address: Option<IpAddr>,

    /// Remote SOCKS port
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_SOCKS_PORT)]
    pub socks: u16,

    /// Remote DNS port
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_DNS_PORT)]
    pub dns: u16,

    /// Virtual interface name
    #[arg(short = 't', long = "tun", value_name = "NAME", default_value_t = default_tun_name().to_string())]
    pub tun: String,

    /// Virtual interface MTU
    #[arg(short = 'm', long, default_value_t = DEFAULT_MTU)]
    pub mtu: u32,

    /// Settings file (.toml or .json)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Give up after this many invalid device selections
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_prompts: Option<u32>,
}

impl Args {
    /// Operator overrides for the session config merge
    pub fn overrides(&self) -> Overrides {
        Overrides {
            socks_port: self.socks,
            dns_port: self.dns,
            debug: self.verbose,
            bypass_lan: self.bypass_lan,
            tun_name: self.tun.clone(),
            mtu: self.mtu,
        }
    }
}
