//! Top-level frame dispatch
//!
//! One tagged enum instead of a PDU class hierarchy: decode reads the
//! common control header once and hands the body to the per-subtype
//! codec; dispatch downstream is a match.

use crate::acmp::AcmpPdu;
use crate::adp::AdpPdu;
use crate::aecp::AecpPdu;
use crate::error::DecodeError;
use crate::header::{ControlHeader, SUBTYPE_ACMP, SUBTYPE_ADP, SUBTYPE_AECP};
use crate::wire::ByteReader;

/// A decoded AVDECC frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Adp(AdpPdu),
    Acmp(AcmpPdu),
    Aecp(AecpPdu),
}

impl Frame {
    /// Decode an AVDECC frame (EtherType payload, no Ethernet header).
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(buf);
        let header = ControlHeader::decode(&mut r)?;
        match header.subtype {
            SUBTYPE_ADP => Ok(Self::Adp(AdpPdu::decode_body(header, &mut r)?)),
            SUBTYPE_ACMP => Ok(Self::Acmp(AcmpPdu::decode_body(header, &mut r)?)),
            SUBTYPE_AECP => Ok(Self::Aecp(AecpPdu::decode_body(header, &mut r)?)),
            other => Err(DecodeError::UnknownSubtype(other)),
        }
    }

    /// Serialize to wire bytes.
    ///
    /// ADP and ACMP are fixed-size and cannot fail; an oversized AECP
    /// payload is the one encode-time error.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::Adp(pdu) => Ok(pdu.encode()),
            Self::Acmp(pdu) => Ok(pdu.encode()),
            Self::Aecp(pdu) => pdu.encode(),
        }
    }

    pub fn subtype(&self) -> u8 {
        match self {
            Self::Adp(_) => SUBTYPE_ADP,
            Self::Acmp(_) => SUBTYPE_ACMP,
            Self::Aecp(_) => SUBTYPE_AECP,
        }
    }
}

impl From<AdpPdu> for Frame {
    fn from(pdu: AdpPdu) -> Self {
        Self::Adp(pdu)
    }
}

impl From<AcmpPdu> for Frame {
    fn from(pdu: AcmpPdu) -> Self {
        Self::Acmp(pdu)
    }
}

impl From<AecpPdu> for Frame {
    fn from(pdu: AecpPdu) -> Self {
        Self::Aecp(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adp::AdpMessageType;
    use crate::types::EntityId;

    #[test]
    fn test_unknown_subtype_rejected() {
        let mut bytes = AdpPdu::discovery_request(EntityId::UNSPECIFIED).encode();
        bytes[0] = 0x7F;
        assert_eq!(Frame::decode(&bytes), Err(DecodeError::UnknownSubtype(0x7F)));
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(matches!(
            Frame::decode(&[]),
            Err(DecodeError::TooShort { .. })
        ));
    }

    #[test]
    fn test_subtype_accessor() {
        let frame = Frame::Adp(AdpPdu::discovery_request(EntityId::UNSPECIFIED));
        assert_eq!(frame.subtype(), SUBTYPE_ADP);
        match frame {
            Frame::Adp(ref pdu) => {
                assert_eq!(pdu.message_type, AdpMessageType::EntityDiscoveryRequest)
            }
            _ => unreachable!(),
        }
    }
}
