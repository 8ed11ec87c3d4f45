//! Local interface enumeration
//!
//! Produces one IPv4 binding per interface that can reach a LAN segment.
//! Loopback and link-local (169.254.0.0/16) addresses never qualify.

use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use tracing::debug;

/// An interface and the IPv4 address a scan socket binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBinding {
    /// Interface name (e.g. `en0`, `wlan0`)
    pub name: String,
    /// Local IPv4 address on that interface
    pub addr: Ipv4Addr,
}

impl InterfaceBinding {
    /// Create a new binding
    pub fn new(name: impl Into<String>, addr: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            addr,
        }
    }
}

impl std::fmt::Display for InterfaceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.addr)
    }
}

/// Interface listing errors
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("Failed to list network interfaces: {0}")]
    Listing(#[from] std::io::Error),
}

/// Check whether an address may be used for scanning
pub fn is_usable_address(addr: &Ipv4Addr) -> bool {
    !addr.is_loopback() && !addr.is_link_local()
}

/// List the usable bindings of every system interface.
///
/// Fails only if the system listing itself fails; an interface without a
/// usable address is simply left out.
pub fn list_bindings() -> Result<Vec<InterfaceBinding>, InterfaceError> {
    let interfaces = get_if_addrs::get_if_addrs()?;
    let bindings = select_bindings(interfaces.into_iter().map(|iface| {
        let ip = iface.ip();
        (iface.name, ip)
    }));

    debug!("Usable interfaces: {:?}", bindings);
    Ok(bindings)
}

/// Reduce `(interface, address)` pairs to at most one binding per interface.
///
/// Interfaces keep the order in which they first appear; within an interface
/// the first usable IPv4 address wins.
pub fn select_bindings<I>(addrs: I) -> Vec<InterfaceBinding>
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    let mut bindings: Vec<InterfaceBinding> = Vec::new();

    for (name, ip) in addrs {
        let IpAddr::V4(v4) = ip else {
            continue;
        };
        if !is_usable_address(&v4) {
            continue;
        }
        if bindings.iter().any(|b| b.name == name) {
            continue;
        }
        bindings.push(InterfaceBinding::new(name, v4));
    }

    bindings
}
