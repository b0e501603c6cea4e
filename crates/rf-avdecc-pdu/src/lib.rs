//! AVDECC (IEEE 1722.1) PDU codecs
//!
//! Bit-exact encode/decode for the three 1722.1 protocols on the AVTP
//! common control header:
//! - ADP — entity discovery/advertisement (fixed 68-octet frames)
//! - ACMP — stream connection management (fixed 56-octet frames)
//! - AECP/AEM — enumeration and control (variable, ≤ 524 octets)
//!
//! Everything here is pure data: no sockets, no clocks, no state. The
//! engine crate decodes ingress bytes into [`Frame`] values, runs its
//! state machines, and encodes the emissions back to bytes.
//!
//! `decode(encode(frame)) == frame` holds for every well-formed frame,
//! and `encode(decode(bytes)) == bytes` whenever the length fields
//! match the framed body.

pub mod acmp;
pub mod adp;
pub mod aecp;
pub mod capabilities;
pub mod error;
pub mod frame;
pub mod header;
pub mod types;
pub mod wire;

// Re-exports
pub use acmp::{AcmpMessageType, AcmpPdu, AcmpStatus, ACMP_FRAME_LEN};
pub use adp::{AdpMessageType, AdpPdu, ADP_FRAME_LEN};
pub use aecp::{
    AecpMessageType, AecpPdu, AemCommandType, AemStatus, AECP_MAX_CONTROL_DATA, AEM_MAX_PAYLOAD,
};
pub use capabilities::{
    AvbInfoFlags, AvbInterfaceFlags, ClockSourceFlags, ConnectionFlags, ControllerCapabilities,
    EntityCapabilities, JackFlags, ListenerCapabilities, PortFlags, StreamDescriptorFlags,
    StreamInfoFlags, TalkerCapabilities,
};
pub use error::DecodeError;
pub use frame::Frame;
pub use header::{SUBTYPE_ACMP, SUBTYPE_ADP, SUBTYPE_AECP};
pub use types::{
    AssociationId, EntityId, EntityModelId, MacAddress, StreamId, AVDECC_ETHERTYPE,
    AVDECC_MULTICAST_MAC,
};
