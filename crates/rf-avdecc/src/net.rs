//! L2 transport contract
//!
//! The engine is parameterized over a network interface with exactly
//! three operations. Implementations own the raw socket/PCAP handle
//! and the Ethernet framing (EtherType 0x22F0); the engine only sees
//! AVDECC payload bytes.

use rf_avdecc_pdu::MacAddress;
use thiserror::Error;

/// Send-path failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transient: the frame stays queued and is retried next tick
    #[error("send would block")]
    WouldBlock,

    /// The frame was not sent; it is requeued once and then dropped
    #[error("send failed: {0}")]
    Failed(String),

    /// The transport is gone; the engine departs and halts
    #[error("transport down")]
    Down,
}

/// Raw L2 interface the engine drives
pub trait NetworkInterface {
    /// Queue one frame for transmission to `dest`.
    fn send(&mut self, dest: MacAddress, frame: &[u8]) -> Result<(), SendError>;

    /// Non-blocking receive of the next pending frame.
    fn receive(&mut self) -> Option<Vec<u8>>;

    /// The interface's own MAC address.
    fn local_mac(&self) -> MacAddress;
}
