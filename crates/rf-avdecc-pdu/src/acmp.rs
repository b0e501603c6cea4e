//! ACMP (connection management protocol) PDU
//!
//! 56 octets on the wire: common control header with the stream id in
//! the id slot, then a fixed 44-octet body (42 octets of fields plus 2
//! reserved).

use crate::capabilities::ConnectionFlags;
use crate::error::DecodeError;
use crate::header::{ControlHeader, CONTROL_HEADER_LEN, SUBTYPE_ACMP};
use crate::types::{EntityId, MacAddress, StreamId};
use crate::wire::{ByteReader, ByteWriter};

/// Fixed body length after the control header
pub const ACMP_CONTROL_DATA_LENGTH: u16 = 44;

/// Total serialized ACMP frame length
pub const ACMP_FRAME_LEN: usize = CONTROL_HEADER_LEN + ACMP_CONTROL_DATA_LENGTH as usize;

/// ACMP message types (4-bit). Even values are commands, odd values the
/// matching responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AcmpMessageType {
    ConnectTxCommand = 0x00,
    ConnectTxResponse = 0x01,
    DisconnectTxCommand = 0x02,
    DisconnectTxResponse = 0x03,
    GetTxStateCommand = 0x04,
    GetTxStateResponse = 0x05,
    ConnectRxCommand = 0x06,
    ConnectRxResponse = 0x07,
    DisconnectRxCommand = 0x08,
    DisconnectRxResponse = 0x09,
    GetRxStateCommand = 0x0A,
    GetRxStateResponse = 0x0B,
    GetTxConnectionCommand = 0x0C,
    GetTxConnectionResponse = 0x0D,
}

impl AcmpMessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::ConnectTxCommand,
            0x01 => Self::ConnectTxResponse,
            0x02 => Self::DisconnectTxCommand,
            0x03 => Self::DisconnectTxResponse,
            0x04 => Self::GetTxStateCommand,
            0x05 => Self::GetTxStateResponse,
            0x06 => Self::ConnectRxCommand,
            0x07 => Self::ConnectRxResponse,
            0x08 => Self::DisconnectRxCommand,
            0x09 => Self::DisconnectRxResponse,
            0x0A => Self::GetRxStateCommand,
            0x0B => Self::GetRxStateResponse,
            0x0C => Self::GetTxConnectionCommand,
            0x0D => Self::GetTxConnectionResponse,
            _ => return None,
        })
    }

    pub fn is_command(&self) -> bool {
        (*self as u8) & 1 == 0
    }

    /// The response type paired with a command type
    pub fn response(&self) -> Self {
        match self {
            Self::ConnectTxCommand => Self::ConnectTxResponse,
            Self::DisconnectTxCommand => Self::DisconnectTxResponse,
            Self::GetTxStateCommand => Self::GetTxStateResponse,
            Self::ConnectRxCommand => Self::ConnectRxResponse,
            Self::DisconnectRxCommand => Self::DisconnectRxResponse,
            Self::GetRxStateCommand => Self::GetRxStateResponse,
            Self::GetTxConnectionCommand => Self::GetTxConnectionResponse,
            other => *other,
        }
    }
}

/// ACMP status codes (5-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmpStatus {
    Success,
    ListenerUnknownId,
    TalkerUnknownId,
    TalkerDestMacFail,
    TalkerNoStreamIndex,
    TalkerNoBandwidth,
    TalkerExclusive,
    ListenerTalkerTimeout,
    ListenerExclusive,
    StateUnavailable,
    NotConnected,
    NoSuchConnection,
    CouldNotSendMessage,
    TalkerMisbehaving,
    ListenerMisbehaving,
    ControllerNotAuthorized,
    IncompatibleRequest,
    NotSupported,
    /// Reserved code observed on the wire
    Other(u8),
}

impl AcmpStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Success,
            0x01 => Self::ListenerUnknownId,
            0x02 => Self::TalkerUnknownId,
            0x03 => Self::TalkerDestMacFail,
            0x04 => Self::TalkerNoStreamIndex,
            0x05 => Self::TalkerNoBandwidth,
            0x06 => Self::TalkerExclusive,
            0x07 => Self::ListenerTalkerTimeout,
            0x08 => Self::ListenerExclusive,
            0x09 => Self::StateUnavailable,
            0x0A => Self::NotConnected,
            0x0B => Self::NoSuchConnection,
            0x0C => Self::CouldNotSendMessage,
            0x0D => Self::TalkerMisbehaving,
            0x0E => Self::ListenerMisbehaving,
            0x0F => Self::ControllerNotAuthorized,
            0x10 => Self::IncompatibleRequest,
            0x1F => Self::NotSupported,
            other => Self::Other(other & 0x1F),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::ListenerUnknownId => 0x01,
            Self::TalkerUnknownId => 0x02,
            Self::TalkerDestMacFail => 0x03,
            Self::TalkerNoStreamIndex => 0x04,
            Self::TalkerNoBandwidth => 0x05,
            Self::TalkerExclusive => 0x06,
            Self::ListenerTalkerTimeout => 0x07,
            Self::ListenerExclusive => 0x08,
            Self::StateUnavailable => 0x09,
            Self::NotConnected => 0x0A,
            Self::NoSuchConnection => 0x0B,
            Self::CouldNotSendMessage => 0x0C,
            Self::TalkerMisbehaving => 0x0D,
            Self::ListenerMisbehaving => 0x0E,
            Self::ControllerNotAuthorized => 0x0F,
            Self::IncompatibleRequest => 0x10,
            Self::NotSupported => 0x1F,
            Self::Other(v) => *v & 0x1F,
        }
    }
}

/// Decoded ACMP PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmpPdu {
    pub message_type: AcmpMessageType,
    pub status: AcmpStatus,
    pub stream_id: StreamId,
    pub controller_entity_id: EntityId,
    pub talker_entity_id: EntityId,
    pub listener_entity_id: EntityId,
    pub talker_unique_id: u16,
    pub listener_unique_id: u16,
    pub stream_dest_mac: MacAddress,
    pub connection_count: u16,
    pub sequence_id: u16,
    pub flags: ConnectionFlags,
    pub stream_vlan_id: u16,
}

impl AcmpPdu {
    /// A command PDU with the stream fields zeroed; the responder fills
    /// them in.
    pub fn command(
        message_type: AcmpMessageType,
        controller_entity_id: EntityId,
        talker_entity_id: EntityId,
        talker_unique_id: u16,
        listener_entity_id: EntityId,
        listener_unique_id: u16,
        sequence_id: u16,
    ) -> Self {
        Self {
            message_type,
            status: AcmpStatus::Success,
            stream_id: StreamId::UNSPECIFIED,
            controller_entity_id,
            talker_entity_id,
            listener_entity_id,
            talker_unique_id,
            listener_unique_id,
            stream_dest_mac: MacAddress::ZERO,
            connection_count: 0,
            sequence_id,
            flags: ConnectionFlags::empty(),
            stream_vlan_id: 0,
        }
    }

    /// Turn this PDU into the paired response, keeping addressing and
    /// sequence id.
    pub fn response(&self, status: AcmpStatus) -> Self {
        let mut resp = self.clone();
        resp.message_type = self.message_type.response();
        resp.status = status;
        resp
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(ACMP_FRAME_LEN);
        ControlHeader::new(
            SUBTYPE_ACMP,
            self.message_type as u8,
            self.status.as_u8(),
            ACMP_CONTROL_DATA_LENGTH,
            self.stream_id.0,
        )
        .encode(&mut w);

        w.u64(self.controller_entity_id.0);
        w.u64(self.talker_entity_id.0);
        w.u64(self.listener_entity_id.0);
        w.u16(self.talker_unique_id);
        w.u16(self.listener_unique_id);
        w.mac(self.stream_dest_mac);
        w.u16(self.connection_count);
        w.u16(self.sequence_id);
        w.u16(self.flags.bits());
        w.u16(self.stream_vlan_id);
        w.zeros(2);
        w.into_vec()
    }

    pub(crate) fn decode_body(header: ControlHeader, r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        if header.control_data_length != ACMP_CONTROL_DATA_LENGTH {
            return Err(DecodeError::LengthMismatch {
                control_data_length: header.control_data_length,
                body: r.remaining(),
            });
        }
        if r.remaining() < ACMP_CONTROL_DATA_LENGTH as usize {
            return Err(DecodeError::TooShort {
                expected: ACMP_FRAME_LEN,
                actual: CONTROL_HEADER_LEN + r.remaining(),
            });
        }
        let message_type = AcmpMessageType::from_u8(header.message_type).ok_or(
            DecodeError::UnknownMessageType {
                subtype: SUBTYPE_ACMP,
                message_type: header.message_type,
            },
        )?;

        let controller_entity_id = EntityId(r.u64()?);
        let talker_entity_id = EntityId(r.u64()?);
        let listener_entity_id = EntityId(r.u64()?);
        let talker_unique_id = r.u16()?;
        let listener_unique_id = r.u16()?;
        let stream_dest_mac = r.mac()?;
        let connection_count = r.u16()?;
        let sequence_id = r.u16()?;
        let flags = ConnectionFlags::from_bits_retain(r.u16()?);
        let stream_vlan_id = r.u16()?;
        r.skip(2)?;

        Ok(Self {
            message_type,
            status: AcmpStatus::from_u8(header.status),
            stream_id: StreamId(header.id_slot),
            controller_entity_id,
            talker_entity_id,
            listener_entity_id,
            talker_unique_id,
            listener_unique_id,
            stream_dest_mac,
            connection_count,
            sequence_id,
            flags,
            stream_vlan_id,
        })
    }
}
