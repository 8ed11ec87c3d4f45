//! Discovery payloads
//!
//! The scanner only needs to encode one query and decode replies; the wire
//! layout stays behind [`DiscoveryCodec`]. [`JsonCodec`] is the built-in
//! implementation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discovery protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 1;

/// Discovery query broadcast to the LAN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Protocol version
    pub version: u32,
    /// Name of the querying machine
    pub device_name: String,
}

impl Query {
    /// Create a query for the current protocol version
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            device_name: device_name.into(),
        }
    }
}

/// Configuration advertised by a responding device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Protocol version
    pub version: u32,
    /// Display name (empty for devices that were not discovered)
    #[serde(default)]
    pub device_name: String,
    /// SOCKS proxy port on the device
    pub socks_port: u16,
    /// DNS forwarding port on the device
    pub dns_port: u16,
    /// Device asks for verbose engine logging
    #[serde(default)]
    pub debug: bool,
    /// Device asks to keep LAN traffic off the tunnel
    #[serde(default)]
    pub bypass_lan: bool,
}

/// Codec errors
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Failed to encode query: {0}")]
    Encode(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Encoding seam for discovery messages
pub trait DiscoveryCodec: Send + Sync {
    /// Serialize a query into a datagram payload
    fn encode_query(&self, query: &Query) -> Result<Vec<u8>, CodecError>;

    /// Parse a reply datagram
    fn decode_response(&self, bytes: &[u8]) -> Result<DeviceInfo, CodecError>;
}

/// JSON discovery codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DiscoveryCodec for JsonCodec {
    fn encode_query(&self, query: &Query) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(query).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<DeviceInfo, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
