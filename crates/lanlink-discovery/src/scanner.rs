//! Broadcast Scanner
//!
//! One scan per interface binding:
//!
//! 1. Bind a UDP socket to the interface address (ephemeral port)
//! 2. Broadcast the encoded query to the discovery port
//! 3. Wait for a single reply, bounded by the scan timeout
//! 4. Decode the reply through the codec
//!
//! Scans run as independent tokio tasks and report over a shared mpsc
//! channel. A scan never fails the run: every error collapses into an
//! unsuccessful [`ScanOutcome`].

use crate::aggregator::{collect, CandidateDevice};
use crate::codec::{CodecError, DeviceInfo, DiscoveryCodec, Query, PROTOCOL_VERSION};
use crate::interfaces::InterfaceBinding;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Well-known discovery port
pub const DISCOVERY_PORT: u16 = 11451;

/// Per-interface reply deadline
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest reply we read
const RECV_BUFFER_SIZE: usize = 2048;

/// Where and how long to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Destination of the discovery query
    pub broadcast: SocketAddr,
    /// Reply deadline, measured from the send
    pub timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            broadcast: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            timeout: SCAN_TIMEOUT,
        }
    }
}

/// A decoded reply and who sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReply {
    /// Responder address (IP + source port)
    pub responder: SocketAddr,
    /// Advertised device configuration
    pub info: DeviceInfo,
}

/// Result of one scan attempt on one interface
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Interface the scan ran on
    pub binding: InterfaceBinding,
    /// Reply, if one arrived and decoded
    pub reply: Option<ScanReply>,
}

impl ScanOutcome {
    /// Create a failed outcome
    pub fn failed(binding: InterfaceBinding) -> Self {
        Self {
            binding,
            reply: None,
        }
    }

    /// Create a successful outcome
    pub fn found(binding: InterfaceBinding, responder: SocketAddr, info: DeviceInfo) -> Self {
        Self {
            binding,
            reply: Some(ScanReply { responder, info }),
        }
    }

    /// Check if a device answered
    pub fn is_success(&self) -> bool {
        self.reply.is_some()
    }
}

/// Why a single scan produced nothing
#[derive(Debug, Error)]
enum ScanError {
    #[error("create socket: {0}")]
    Bind(io::Error),

    #[error("send query: {0}")]
    Send(io::Error),

    #[error("read reply: {0}")]
    Receive(io::Error),

    #[error("no reply")]
    Timeout,

    #[error("{0}")]
    Decode(CodecError),
}

/// Scan one interface.
///
/// Timeouts are expected and only logged at debug level; every other
/// failure is logged with the interface name.
pub async fn scan_interface(
    binding: InterfaceBinding,
    query: &[u8],
    codec: &dyn DiscoveryCodec,
    options: &DiscoveryOptions,
) -> ScanOutcome {
    match try_scan(&binding, query, codec, options).await {
        Ok(reply) => {
            debug!("Reply from {} on {}", reply.responder, binding.name);
            if reply.info.version != PROTOCOL_VERSION {
                warn!(
                    "{} speaks discovery protocol v{} (expected v{})",
                    reply.responder, reply.info.version, PROTOCOL_VERSION
                );
            }
            ScanOutcome {
                binding,
                reply: Some(reply),
            }
        }
        Err(ScanError::Timeout) => {
            debug!("No reply on {} within {:?}", binding.name, options.timeout);
            ScanOutcome::failed(binding)
        }
        Err(e) => {
            warn!("Scan on {} failed: {}", binding.name, e);
            ScanOutcome::failed(binding)
        }
    }
}

async fn try_scan(
    binding: &InterfaceBinding,
    query: &[u8],
    codec: &dyn DiscoveryCodec,
    options: &DiscoveryOptions,
) -> Result<ScanReply, ScanError> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(binding.addr), 0))
        .await
        .map_err(ScanError::Bind)?;
    socket.set_broadcast(true).map_err(ScanError::Bind)?;

    socket
        .send_to(query, options.broadcast)
        .await
        .map_err(ScanError::Send)?;

    // Deadline runs from the send; the socket drops with this future if it fires
    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    let (len, responder) =
        match tokio::time::timeout(options.timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => return Err(ScanError::Timeout),
            Ok(Err(e)) => return Err(ScanError::Receive(e)),
            Err(_) => return Err(ScanError::Timeout),
        };

    drop(socket);

    let info = codec
        .decode_response(&buffer[..len])
        .map_err(ScanError::Decode)?;

    Ok(ScanReply { responder, info })
}

/// Fans a discovery query out over interface bindings
pub struct Scanner {
    /// Reply decoder
    codec: Arc<dyn DiscoveryCodec>,
    /// Pre-encoded query payload
    query: Arc<[u8]>,
    /// Destination and deadline
    options: DiscoveryOptions,
}

impl Scanner {
    /// Create a scanner, encoding the query once up front
    pub fn new(
        codec: Arc<dyn DiscoveryCodec>,
        query: &Query,
        options: DiscoveryOptions,
    ) -> Result<Self, CodecError> {
        let query: Arc<[u8]> = codec.encode_query(query)?.into();

        Ok(Self {
            codec,
            query,
            options,
        })
    }

    /// Spawn one scan task per binding.
    ///
    /// All tasks are running before this returns. The receiver yields exactly
    /// one outcome per task; the second value is the number of tasks.
    pub fn spawn(&self, bindings: Vec<InterfaceBinding>) -> (mpsc::Receiver<ScanOutcome>, usize) {
        let expected = bindings.len();
        let (tx, rx) = mpsc::channel(expected.max(1));

        for binding in bindings {
            let tx = tx.clone();
            let codec = self.codec.clone();
            let query = self.query.clone();
            let options = self.options;

            tokio::spawn(async move {
                let outcome = scan_interface(binding, &query, codec.as_ref(), &options).await;
                // Receiver only goes away if the caller gave up on the run
                let _ = tx.send(outcome).await;
            });
        }

        (rx, expected)
    }

    /// Scan every binding and return the de-duplicated responders
    pub async fn discover(&self, bindings: Vec<InterfaceBinding>) -> Vec<CandidateDevice> {
        info!(
            "Scanning {} interface(s) for devices on {}",
            bindings.len(),
            self.options.broadcast
        );

        let (mut rx, expected) = self.spawn(bindings);
        collect(&mut rx, expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use std::time::Instant;

    fn loopback(name: &str) -> InterfaceBinding {
        InterfaceBinding::new(name, Ipv4Addr::LOCALHOST)
    }

    fn device(name: &str, socks_port: u16, dns_port: u16) -> DeviceInfo {
        DeviceInfo {
            version: PROTOCOL_VERSION,
            device_name: name.to_string(),
            socks_port,
            dns_port,
            debug: false,
            bypass_lan: false,
        }
    }

    /// Loopback stand-in for a device: answers every query with `reply`
    async fn spawn_responder(reply: Option<Vec<u8>>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let query: Query = match serde_json::from_slice(&buf[..n]) {
                    Ok(q) => q,
                    Err(_) => continue,
                };
                assert_eq!(query.version, PROTOCOL_VERSION);

                if let Some(reply) = &reply {
                    let _ = socket.send_to(reply, peer).await;
                }
            }
        });

        addr
    }

    fn options(broadcast: SocketAddr, timeout: Duration) -> DiscoveryOptions {
        DiscoveryOptions { broadcast, timeout }
    }

    #[test]
    fn test_default_options() {
        let opts = DiscoveryOptions::default();

        assert_eq!(opts.broadcast, "255.255.255.255:11451".parse().unwrap());
        assert_eq!(opts.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_scan_receives_reply() {
        let reply = serde_json::to_vec(&device("Router", 1080, 53)).unwrap();
        let responder = spawn_responder(Some(reply)).await;
        let query = JsonCodec.encode_query(&Query::new("laptop")).unwrap();

        let outcome = scan_interface(
            loopback("lo"),
            &query,
            &JsonCodec,
            &options(responder, Duration::from_secs(2)),
        )
        .await;

        assert!(outcome.is_success());
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.responder, responder);
        assert_eq!(reply.info, device("Router", 1080, 53));
    }

    #[tokio::test]
    async fn test_scan_timeout_is_failure() {
        let responder = spawn_responder(None).await;
        let query = JsonCodec.encode_query(&Query::new("laptop")).unwrap();

        let start = Instant::now();
        let outcome = scan_interface(
            loopback("lo"),
            &query,
            &JsonCodec,
            &options(responder, Duration::from_millis(200)),
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.binding.name, "lo");
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_scan_decode_failure() {
        let responder = spawn_responder(Some(b"garbage".to_vec())).await;
        let query = JsonCodec.encode_query(&Query::new("laptop")).unwrap();

        let outcome = scan_interface(
            loopback("lo"),
            &query,
            &JsonCodec,
            &options(responder, Duration::from_secs(2)),
        )
        .await;

        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_scan_bind_failure() {
        // Not an address of this host
        let binding = InterfaceBinding::new("bogus", Ipv4Addr::new(203, 0, 113, 77));
        let query = JsonCodec.encode_query(&Query::new("laptop")).unwrap();

        let outcome = scan_interface(
            binding,
            &query,
            &JsonCodec,
            &options("127.0.0.1:9".parse().unwrap(), Duration::from_millis(200)),
        )
        .await;

        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_discover_deduplicates_responder() {
        let reply = serde_json::to_vec(&device("Router", 1080, 53)).unwrap();
        let responder = spawn_responder(Some(reply)).await;

        let scanner = Scanner::new(
            Arc::new(JsonCodec),
            &Query::new("laptop"),
            options(responder, Duration::from_secs(2)),
        )
        .unwrap();

        let devices = scanner
            .discover(vec![loopback("lo-a"), loopback("lo-b"), loopback("lo-c")])
            .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(devices[0].info.device_name, "Router");
    }

    #[tokio::test]
    async fn test_discover_partial_failure() {
        let reply = serde_json::to_vec(&device("Router", 1080, 53)).unwrap();
        let responder = spawn_responder(Some(reply)).await;

        let scanner = Scanner::new(
            Arc::new(JsonCodec),
            &Query::new("laptop"),
            options(responder, Duration::from_millis(500)),
        )
        .unwrap();

        let devices = scanner
            .discover(vec![
                loopback("lo"),
                InterfaceBinding::new("bogus", Ipv4Addr::new(203, 0, 113, 77)),
            ])
            .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].interface.as_deref(), Some("lo"));
    }

    #[tokio::test]
    async fn test_discover_nothing_answers() {
        let responder = spawn_responder(None).await;

        let scanner = Scanner::new(
            Arc::new(JsonCodec),
            &Query::new("laptop"),
            options(responder, Duration::from_millis(200)),
        )
        .unwrap();

        // Scans run in parallel: three timeouts cost one timeout
        let start = Instant::now();
        let devices = scanner
            .discover(vec![loopback("a"), loopback("b"), loopback("c")])
            .await;

        assert!(devices.is_empty());
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_discover_no_bindings() {
        let scanner =
            Scanner::new(Arc::new(JsonCodec), &Query::new("laptop"), DiscoveryOptions::default())
                .unwrap();

        assert!(scanner.discover(Vec::new()).await.is_empty());
    }
}
