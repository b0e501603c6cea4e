//! AECP (enumeration and control protocol) PDU, AEM message family
//!
//! Variable length: common control header with the target entity id in
//! the id slot, then controller entity id (8), sequence id (2), the
//! packed unsolicited/command-type word (2) and the command-specific
//! payload. `control_data_length` is `12 + payload`, capped at 512, so
//! a frame never exceeds 524 octets.

use crate::error::DecodeError;
use crate::header::{ControlHeader, CONTROL_HEADER_LEN, SUBTYPE_AECP};
use crate::types::EntityId;
use crate::wire::{ByteReader, ByteWriter};

/// Octets of AEM fixed fields counted by control_data_length
pub const AEM_FIXED_CONTROL_DATA: u16 = 12;

/// Largest allowed control_data_length (keeps frames within 524 octets)
pub const AECP_MAX_CONTROL_DATA: u16 = 512;

/// Largest command-specific payload
pub const AEM_MAX_PAYLOAD: usize = (AECP_MAX_CONTROL_DATA - AEM_FIXED_CONTROL_DATA) as usize;

/// AECP message types (4-bit). Only the AEM pair is processed; the
/// address-access, AVC and vendor-unique families decode to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AecpMessageType {
    AemCommand = 0x00,
    AemResponse = 0x01,
}

impl AecpMessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::AemCommand),
            0x01 => Some(Self::AemResponse),
            _ => None,
        }
    }
}

/// AEM status codes (5-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AemStatus {
    Success,
    NotImplemented,
    NoSuchDescriptor,
    EntityLocked,
    EntityAcquired,
    NotAuthenticated,
    AuthenticationDisabled,
    BadArguments,
    NoResources,
    InProgress,
    EntityMisbehaving,
    NotSupported,
    StreamIsRunning,
    /// Reserved code observed on the wire
    Other(u8),
}

impl AemStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Success,
            0x01 => Self::NotImplemented,
            0x02 => Self::NoSuchDescriptor,
            0x03 => Self::EntityLocked,
            0x04 => Self::EntityAcquired,
            0x05 => Self::NotAuthenticated,
            0x06 => Self::AuthenticationDisabled,
            0x07 => Self::BadArguments,
            0x08 => Self::NoResources,
            0x09 => Self::InProgress,
            0x0A => Self::EntityMisbehaving,
            0x0B => Self::NotSupported,
            0x0C => Self::StreamIsRunning,
            other => Self::Other(other & 0x1F),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::NotImplemented => 0x01,
            Self::NoSuchDescriptor => 0x02,
            Self::EntityLocked => 0x03,
            Self::EntityAcquired => 0x04,
            Self::NotAuthenticated => 0x05,
            Self::AuthenticationDisabled => 0x06,
            Self::BadArguments => 0x07,
            Self::NoResources => 0x08,
            Self::InProgress => 0x09,
            Self::EntityMisbehaving => 0x0A,
            Self::NotSupported => 0x0B,
            Self::StreamIsRunning => 0x0C,
            Self::Other(v) => *v & 0x1F,
        }
    }
}

/// 15-bit AEM command type
///
/// Kept as a newtype rather than an enum: unknown values are legal on
/// the wire and answered with NOT_IMPLEMENTED at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AemCommandType(pub u16);

#[rustfmt::skip]
impl AemCommandType {
    pub const ACQUIRE_ENTITY: Self                       = Self(0x0000);
    pub const LOCK_ENTITY: Self                          = Self(0x0001);
    pub const ENTITY_AVAILABLE: Self                     = Self(0x0002);
    pub const CONTROLLER_AVAILABLE: Self                 = Self(0x0003);
    pub const READ_DESCRIPTOR: Self                      = Self(0x0004);
    pub const WRITE_DESCRIPTOR: Self                     = Self(0x0005);
    pub const SET_CONFIGURATION: Self                    = Self(0x0006);
    pub const GET_CONFIGURATION: Self                    = Self(0x0007);
    pub const SET_STREAM_FORMAT: Self                    = Self(0x0008);
    pub const GET_STREAM_FORMAT: Self                    = Self(0x0009);
    pub const SET_VIDEO_FORMAT: Self                     = Self(0x000A);
    pub const GET_VIDEO_FORMAT: Self                     = Self(0x000B);
    pub const SET_SENSOR_FORMAT: Self                    = Self(0x000C);
    pub const GET_SENSOR_FORMAT: Self                    = Self(0x000D);
    pub const SET_STREAM_INFO: Self                      = Self(0x000E);
    pub const GET_STREAM_INFO: Self                      = Self(0x000F);
    pub const SET_NAME: Self                             = Self(0x0010);
    pub const GET_NAME: Self                             = Self(0x0011);
    pub const SET_ASSOCIATION_ID: Self                   = Self(0x0012);
    pub const GET_ASSOCIATION_ID: Self                   = Self(0x0013);
    pub const SET_SAMPLING_RATE: Self                    = Self(0x0014);
    pub const GET_SAMPLING_RATE: Self                    = Self(0x0015);
    pub const SET_CLOCK_SOURCE: Self                     = Self(0x0016);
    pub const GET_CLOCK_SOURCE: Self                     = Self(0x0017);
    pub const SET_CONTROL: Self                          = Self(0x0018);
    pub const GET_CONTROL: Self                          = Self(0x0019);
    pub const INCREMENT_CONTROL: Self                    = Self(0x001A);
    pub const DECREMENT_CONTROL: Self                    = Self(0x001B);
    pub const SET_SIGNAL_SELECTOR: Self                  = Self(0x001C);
    pub const GET_SIGNAL_SELECTOR: Self                  = Self(0x001D);
    pub const SET_MIXER: Self                            = Self(0x001E);
    pub const GET_MIXER: Self                            = Self(0x001F);
    pub const SET_MATRIX: Self                           = Self(0x0020);
    pub const GET_MATRIX: Self                           = Self(0x0021);
    pub const START_STREAMING: Self                      = Self(0x0022);
    pub const STOP_STREAMING: Self                       = Self(0x0023);
    pub const REGISTER_UNSOLICITED_NOTIFICATION: Self    = Self(0x0024);
    pub const DEREGISTER_UNSOLICITED_NOTIFICATION: Self  = Self(0x0025);
    pub const IDENTIFY_NOTIFICATION: Self                = Self(0x0026);
    pub const GET_AVB_INFO: Self                         = Self(0x0027);
    pub const GET_AS_PATH: Self                          = Self(0x0028);
    pub const GET_COUNTERS: Self                         = Self(0x0029);
    pub const REBOOT: Self                               = Self(0x002A);
    pub const GET_AUDIO_MAP: Self                        = Self(0x002B);
    pub const ADD_AUDIO_MAPPINGS: Self                   = Self(0x002C);
    pub const REMOVE_AUDIO_MAPPINGS: Self                = Self(0x002D);
    pub const START_OPERATION: Self                      = Self(0x002E);
    pub const ABORT_OPERATION: Self                      = Self(0x002F);
    pub const OPERATION_STATUS: Self                     = Self(0x0030);
    pub const AUTH_ADD_KEY: Self                         = Self(0x0031);
    pub const AUTH_DELETE_KEY: Self                      = Self(0x0032);
    pub const AUTH_GET_KEY_LIST: Self                    = Self(0x0033);
    pub const AUTH_GET_KEY: Self                         = Self(0x0034);
    pub const AUTH_ADD_KEY_TO_CHAIN: Self                = Self(0x0035);
    pub const AUTH_DELETE_KEY_FROM_CHAIN: Self           = Self(0x0036);
    pub const AUTH_GET_KEYCHAIN_LIST: Self               = Self(0x0037);
    pub const AUTH_GET_IDENTITY: Self                    = Self(0x0038);
    pub const AUTH_ADD_TOKEN: Self                       = Self(0x0039);
    pub const AUTH_DELETE_TOKEN: Self                    = Self(0x003A);
    pub const AUTHENTICATE: Self                         = Self(0x003B);
    pub const DEAUTHENTICATE: Self                       = Self(0x003C);
    pub const ENABLE_TRANSPORT_SECURITY: Self            = Self(0x003D);
    pub const DISABLE_TRANSPORT_SECURITY: Self           = Self(0x003E);
    pub const ENABLE_STREAM_ENCRYPTION: Self             = Self(0x003F);
    pub const DISABLE_STREAM_ENCRYPTION: Self            = Self(0x0040);
    pub const SET_MEMORY_OBJECT_LENGTH: Self             = Self(0x0041);
    pub const GET_MEMORY_OBJECT_LENGTH: Self             = Self(0x0042);
    pub const SET_STREAM_BACKUP: Self                    = Self(0x0043);
    pub const GET_STREAM_BACKUP: Self                    = Self(0x0044);
    pub const GET_DYNAMIC_INFO: Self                     = Self(0x004B);
}

impl AemCommandType {
    pub fn as_u16(&self) -> u16 {
        self.0 & 0x7FFF
    }
}

/// Decoded AECP PDU carrying an AEM command or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AecpPdu {
    pub message_type: AecpMessageType,
    pub status: AemStatus,
    pub target_entity_id: EntityId,
    pub controller_entity_id: EntityId,
    pub sequence_id: u16,
    /// Bit 15 of the command-type word; set on unrequested responses
    pub unsolicited: bool,
    pub command_type: AemCommandType,
    /// Command-specific octets after the command-type word
    pub payload: Vec<u8>,
}

impl AecpPdu {
    pub fn command(
        target_entity_id: EntityId,
        controller_entity_id: EntityId,
        sequence_id: u16,
        command_type: AemCommandType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_type: AecpMessageType::AemCommand,
            status: AemStatus::Success,
            target_entity_id,
            controller_entity_id,
            sequence_id,
            unsolicited: false,
            command_type,
            payload,
        }
    }

    /// The response mirror of a command: same addressing, sequence id
    /// and command type, handler status and payload.
    pub fn response(&self, status: AemStatus, payload: Vec<u8>) -> Self {
        Self {
            message_type: AecpMessageType::AemResponse,
            status,
            target_entity_id: self.target_entity_id,
            controller_entity_id: self.controller_entity_id,
            sequence_id: self.sequence_id,
            unsolicited: false,
            command_type: self.command_type,
            payload,
        }
    }

    pub fn control_data_length(&self) -> u16 {
        AEM_FIXED_CONTROL_DATA + self.payload.len() as u16
    }

    /// Serialize; fails if the payload exceeds the frame cap.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        if self.payload.len() > AEM_MAX_PAYLOAD {
            return Err(DecodeError::PayloadTooLarge(self.payload.len()));
        }
        let cdl = self.control_data_length();
        let mut w = ByteWriter::with_capacity(CONTROL_HEADER_LEN + cdl as usize);
        ControlHeader::new(
            SUBTYPE_AECP,
            self.message_type as u8,
            self.status.as_u8(),
            cdl,
            self.target_entity_id.0,
        )
        .encode(&mut w);

        w.u64(self.controller_entity_id.0);
        w.u16(self.sequence_id);
        let mut word = self.command_type.as_u16();
        if self.unsolicited {
            word |= 0x8000;
        }
        w.u16(word);
        w.bytes(&self.payload);
        Ok(w.into_vec())
    }

    pub(crate) fn decode_body(header: ControlHeader, r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let message_type = AecpMessageType::from_u8(header.message_type).ok_or(
            DecodeError::UnknownMessageType {
                subtype: SUBTYPE_AECP,
                message_type: header.message_type,
            },
        )?;
        let cdl = header.control_data_length;
        if cdl < AEM_FIXED_CONTROL_DATA || cdl > AECP_MAX_CONTROL_DATA {
            return Err(DecodeError::LengthMismatch {
                control_data_length: cdl,
                body: r.remaining(),
            });
        }
        if r.remaining() < cdl as usize {
            return Err(DecodeError::TooShort {
                expected: CONTROL_HEADER_LEN + cdl as usize,
                actual: CONTROL_HEADER_LEN + r.remaining(),
            });
        }

        let controller_entity_id = EntityId(r.u64()?);
        let sequence_id = r.u16()?;
        let word = r.u16()?;
        let payload = r.bytes((cdl - AEM_FIXED_CONTROL_DATA) as usize)?.to_vec();

        Ok(Self {
            message_type,
            status: AemStatus::from_u8(header.status),
            target_entity_id: EntityId(header.id_slot),
            controller_entity_id,
            sequence_id,
            unsolicited: word & 0x8000 != 0,
            command_type: AemCommandType(word & 0x7FFF),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn sample_command(payload: Vec<u8>) -> AecpPdu {
        AecpPdu::command(
            EntityId(0x0001020304050607),
            EntityId(0x1111111111111111),
            9,
            AemCommandType::READ_DESCRIPTOR,
            payload,
        )
    }

    #[test]
    fn test_aecp_minimal_frame_len() {
        // No payload: cdl = 12, total frame = 24 octets.
        let bytes = sample_command(vec![]).encode().unwrap();
        assert_eq!(bytes.len(), 24);
        let cdl = u16::from_be_bytes([bytes[2], bytes[3]]) & 0x07FF;
        assert_eq!(cdl, 12);
    }

    #[test]
    fn test_aecp_total_len_tracks_control_data_length() {
        for payload_len in [0usize, 1, 8, 100, 500] {
            let bytes = sample_command(vec![0xAB; payload_len]).encode().unwrap();
            let cdl = (u16::from_be_bytes([bytes[2], bytes[3]]) & 0x07FF) as usize;
            assert_eq!(bytes.len(), 12 + cdl);
            assert_eq!(cdl, 12 + payload_len);
        }
    }

    #[test]
    fn test_aecp_payload_cap() {
        assert!(sample_command(vec![0; AEM_MAX_PAYLOAD]).encode().is_ok());
        assert!(matches!(
            sample_command(vec![0; AEM_MAX_PAYLOAD + 1]).encode(),
            Err(DecodeError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_aecp_roundtrip() {
        let pdu = sample_command(vec![0, 0, 0, 0, 0, 0, 0, 0]);
        let bytes = pdu.encode().unwrap();
        match Frame::decode(&bytes).unwrap() {
            Frame::Aecp(d) => assert_eq!(d, pdu),
            other => panic!("decoded wrong frame kind: {other:?}"),
        }
        assert_eq!(Frame::decode(&bytes).unwrap().encode().unwrap(), bytes);
    }

    #[test]
    fn test_unsolicited_bit_packing() {
        let mut pdu = sample_command(vec![]);
        pdu.message_type = AecpMessageType::AemResponse;
        pdu.unsolicited = true;
        let bytes = pdu.encode().unwrap();
        let word = u16::from_be_bytes([bytes[22], bytes[23]]);
        assert_eq!(word & 0x8000, 0x8000);
        assert_eq!(word & 0x7FFF, AemCommandType::READ_DESCRIPTOR.0);
        match Frame::decode(&bytes).unwrap() {
            Frame::Aecp(d) => {
                assert!(d.unsolicited);
                assert_eq!(d.command_type, AemCommandType::READ_DESCRIPTOR);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_aecp_response_mirrors_command() {
        let cmd = sample_command(vec![1, 2, 3]);
        let resp = cmd.response(AemStatus::NoSuchDescriptor, vec![9]);
        assert_eq!(resp.message_type, AecpMessageType::AemResponse);
        assert_eq!(resp.sequence_id, cmd.sequence_id);
        assert_eq!(resp.command_type, cmd.command_type);
        assert_eq!(resp.status, AemStatus::NoSuchDescriptor);
    }

    #[test]
    fn test_aecp_non_aem_message_type_rejected() {
        let mut bytes = sample_command(vec![]).encode().unwrap();
        bytes[1] = (bytes[1] & 0xF0) | 0x02; // ADDRESS_ACCESS_COMMAND
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn test_aecp_undersized_cdl_rejected() {
        let mut bytes = sample_command(vec![]).encode().unwrap();
        bytes[3] = 4; // cdl below the AEM fixed fields
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_aem_status_roundtrip() {
        for v in 0..=0x1F {
            assert_eq!(AemStatus::from_u8(v).as_u8(), v);
        }
    }
}
