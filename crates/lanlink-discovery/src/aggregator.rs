//! Scan result aggregation
//!
//! Fans in the per-interface outcomes and keeps one candidate per responder
//! IP. Replies from the same responder are expected to be identical, so a
//! later reply simply replaces an earlier one.

use crate::codec::{DeviceInfo, PROTOCOL_VERSION};
use crate::scanner::ScanOutcome;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A device that can be connected to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDevice {
    /// Responder address (port 0 when entered manually)
    pub responder: SocketAddr,
    /// Interface the reply arrived on
    pub interface: Option<String>,
    /// Advertised configuration
    pub info: DeviceInfo,
}

impl CandidateDevice {
    /// Build a candidate for an operator-supplied address.
    ///
    /// Discovery is skipped entirely, so the ports come from the operator
    /// and there is no device name.
    pub fn manual(addr: IpAddr, socks_port: u16, dns_port: u16) -> Self {
        Self {
            responder: SocketAddr::new(addr, 0),
            interface: None,
            info: DeviceInfo {
                version: PROTOCOL_VERSION,
                device_name: String::new(),
                socks_port,
                dns_port,
                debug: false,
                bypass_lan: false,
            },
        }
    }

    /// Responder IP
    pub fn ip(&self) -> IpAddr {
        self.responder.ip()
    }

    /// Check whether this candidate came from a discovery reply
    pub fn is_discovered(&self) -> bool {
        self.interface.is_some()
    }
}

impl std::fmt::Display for CandidateDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.info.device_name.is_empty() {
            write!(f, "{}", self.ip())
        } else {
            write!(f, "{} ({})", self.info.device_name, self.ip())
        }
    }
}

/// Receive exactly `expected` outcomes and return the distinct responders.
///
/// Failed outcomes are dropped. Candidates keep the order in which their IP
/// was first seen. Returns early only if every sender is gone.
pub async fn collect(rx: &mut mpsc::Receiver<ScanOutcome>, expected: usize) -> Vec<CandidateDevice> {
    let mut devices: Vec<CandidateDevice> = Vec::new();
    let mut by_ip: HashMap<IpAddr, usize> = HashMap::new();

    for received in 0..expected {
        let Some(outcome) = rx.recv().await else {
            warn!("Scan channel closed after {} of {} results", received, expected);
            break;
        };

        let Some(reply) = outcome.reply else {
            continue;
        };

        let device = CandidateDevice {
            responder: reply.responder,
            interface: Some(outcome.binding.name),
            info: reply.info,
        };

        match by_ip.get(&device.ip()) {
            Some(&index) => devices[index] = device,
            None => {
                by_ip.insert(device.ip(), devices.len());
                devices.push(device);
            }
        }
    }

    for (i, device) in devices.iter().enumerate() {
        info!("Found {}. {}", i + 1, device);
    }

    devices
}
