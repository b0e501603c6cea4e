//! AVTP common control header
//!
//! Every 1722.1 PDU starts with the same 12 octets: subtype, a packed
//! flag/version/message-type octet, a packed status/length word, and an
//! 8-octet slot that carries the entity id (ADP), stream id (ACMP) or
//! target entity id (AECP). `control_data_length` counts octets after
//! those 12.

use crate::error::DecodeError;
use crate::wire::{ByteReader, ByteWriter};

/// AVTP control subtype for ADP
pub const SUBTYPE_ADP: u8 = 0x7A;
/// AVTP control subtype for AECP
pub const SUBTYPE_AECP: u8 = 0x7B;
/// AVTP control subtype for ACMP
pub const SUBTYPE_ACMP: u8 = 0x7C;

/// Octets occupied by the common control header including the id slot
pub const CONTROL_HEADER_LEN: usize = 12;

/// Decoded common control header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub subtype: u8,
    /// stream_id valid / header specific flag
    pub sv: bool,
    /// 4-bit message type (control_data field)
    pub message_type: u8,
    /// 5-bit status (valid_time for ADP)
    pub status: u8,
    /// 11-bit length of everything after the id slot
    pub control_data_length: u16,
    /// Entity id, stream id or target entity id depending on subtype
    pub id_slot: u64,
}

impl ControlHeader {
    pub fn new(subtype: u8, message_type: u8, status: u8, control_data_length: u16, id_slot: u64) -> Self {
        Self {
            subtype,
            sv: false,
            message_type,
            status,
            control_data_length,
            id_slot,
        }
    }

    /// Parse the first 12 octets. Checks version only; subtype and
    /// message-type interpretation is left to the per-PDU codecs.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let subtype = r.u8()?;
        let packed = r.u8()?;
        let sv = packed & 0x80 != 0;
        let version = (packed >> 4) & 0x07;
        if version != 0 {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let message_type = packed & 0x0F;
        let word = r.u16()?;
        let status = (word >> 11) as u8;
        let control_data_length = word & 0x07FF;
        let id_slot = r.u64()?;
        Ok(Self {
            subtype,
            sv,
            message_type,
            status,
            control_data_length,
            id_slot,
        })
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.subtype);
        let mut packed = self.message_type & 0x0F;
        if self.sv {
            packed |= 0x80;
        }
        w.u8(packed);
        w.u16(((self.status as u16 & 0x1F) << 11) | (self.control_data_length & 0x07FF));
        w.u64(self.id_slot);
    }

    /// Total frame length implied by the header
    pub fn frame_len(&self) -> usize {
        CONTROL_HEADER_LEN + self.control_data_length as usize
    }
}
