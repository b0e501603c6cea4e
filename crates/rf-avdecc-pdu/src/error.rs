//! Codec error type

use thiserror::Error;

/// Frame decode failure
///
/// A failed decode never mutates protocol state; the engine logs the
/// error and drops the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: need {expected} octets, have {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unsupported AVTP version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown AVTP subtype {0:#04x}")]
    UnknownSubtype(u8),

    #[error("unknown message type {message_type:#x} for subtype {subtype:#04x}")]
    UnknownMessageType { subtype: u8, message_type: u8 },

    #[error("control_data_length {control_data_length} disagrees with framed body of {body} octets")]
    LengthMismatch { control_data_length: u16, body: usize },

    #[error("AECP payload of {0} octets exceeds the 524-octet frame cap")]
    PayloadTooLarge(usize),
}
