//! Entity model error type

use rf_avdecc_pdu::DecodeError;
use thiserror::Error;

/// Errors raised by descriptor codecs and the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("descriptor decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("unknown descriptor type {0:#06x}")]
    UnknownDescriptorType(u16),

    #[error("descriptor {descriptor_type:#06x}[{descriptor_index}] not in store")]
    NoSuchDescriptor {
        descriptor_type: u16,
        descriptor_index: u16,
    },

    #[error("serialized descriptor of {0} octets exceeds the 512-octet cap")]
    DescriptorTooLarge(usize),

    #[error("descriptor body length {actual} does not match the {expected}-octet layout")]
    WrongLength { expected: usize, actual: usize },

    #[error("model invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result alias
pub type ModelResult<T> = Result<T, ModelError>;
