//! LanLink Discovery
//!
//! Finds companion devices on the local network segment by broadcasting a
//! discovery query on every usable interface at once.
//!
//! # Pipeline
//!
//! ```text
//! interfaces ──▶ one scan task per binding ──▶ mpsc ──▶ aggregator ──▶ selector
//!                 (bind, broadcast, 5s read)            (dedup by IP)   (index / prompt)
//! ```
//!
//! Every dispatched scan reports exactly one [`ScanOutcome`]. A timeout or a
//! transport/decode failure only removes that interface from the result, it
//! never aborts the run.

mod aggregator;
mod codec;
mod interfaces;
mod scanner;
mod selector;

pub use aggregator::{collect, CandidateDevice};
pub use codec::{CodecError, DeviceInfo, DiscoveryCodec, JsonCodec, Query, PROTOCOL_VERSION};
pub use interfaces::{is_usable_address, list_bindings, select_bindings, InterfaceBinding, InterfaceError};
pub use scanner::{
    scan_interface, DiscoveryOptions, ScanOutcome, ScanReply, Scanner, DISCOVERY_PORT,
    SCAN_TIMEOUT,
};
pub use selector::{SelectError, Selector};
