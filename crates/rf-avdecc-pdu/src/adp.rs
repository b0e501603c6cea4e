//! ADP (discovery protocol) PDU
//!
//! 68 octets on the wire: the common control header carries the entity
//! id in its id slot, followed by a fixed 56-octet body.

use crate::capabilities::{
    ControllerCapabilities, EntityCapabilities, ListenerCapabilities, TalkerCapabilities,
};
use crate::error::DecodeError;
use crate::header::{ControlHeader, CONTROL_HEADER_LEN, SUBTYPE_ADP};
use crate::types::{AssociationId, EntityId, EntityModelId};
use crate::wire::{ByteReader, ByteWriter};

/// Fixed body length after the control header
pub const ADP_CONTROL_DATA_LENGTH: u16 = 56;

/// Total serialized ADP frame length
pub const ADP_FRAME_LEN: usize = CONTROL_HEADER_LEN + ADP_CONTROL_DATA_LENGTH as usize;

/// ADP message types (4-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdpMessageType {
    EntityAvailable = 0x00,
    EntityDeparting = 0x01,
    EntityDiscoveryRequest = 0x02,
}

impl AdpMessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::EntityAvailable),
            0x01 => Some(Self::EntityDeparting),
            0x02 => Some(Self::EntityDiscoveryRequest),
            _ => None,
        }
    }
}

/// Decoded ADP PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdpPdu {
    pub message_type: AdpMessageType,
    /// Wire units of 2 s, 5 bits (0..=31)
    pub valid_time: u8,
    pub entity_id: EntityId,
    pub entity_model_id: EntityModelId,
    pub entity_capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: TalkerCapabilities,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: ListenerCapabilities,
    pub controller_capabilities: ControllerCapabilities,
    pub available_index: u32,
    pub gptp_grandmaster_id: EntityId,
    pub gptp_domain_number: u8,
    pub current_configuration_index: u16,
    pub identify_control_index: u16,
    pub interface_index: u16,
    pub association_id: AssociationId,
}

impl AdpPdu {
    /// Discovery request for one entity, or all entities when
    /// `target` is unspecified.
    pub fn discovery_request(target: EntityId) -> Self {
        Self {
            message_type: AdpMessageType::EntityDiscoveryRequest,
            valid_time: 0,
            entity_id: target,
            entity_model_id: EntityModelId::UNSPECIFIED,
            entity_capabilities: EntityCapabilities::empty(),
            talker_stream_sources: 0,
            talker_capabilities: TalkerCapabilities::empty(),
            listener_stream_sinks: 0,
            listener_capabilities: ListenerCapabilities::empty(),
            controller_capabilities: ControllerCapabilities::empty(),
            available_index: 0,
            gptp_grandmaster_id: EntityId::UNSPECIFIED,
            gptp_domain_number: 0,
            current_configuration_index: 0,
            identify_control_index: 0,
            interface_index: 0,
            association_id: AssociationId::UNSPECIFIED,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(ADP_FRAME_LEN);
        ControlHeader::new(
            SUBTYPE_ADP,
            self.message_type as u8,
            self.valid_time & 0x1F,
            ADP_CONTROL_DATA_LENGTH,
            self.entity_id.0,
        )
        .encode(&mut w);

        w.u64(self.entity_model_id.0);
        w.u32(self.entity_capabilities.bits());
        w.u16(self.talker_stream_sources);
        w.u16(self.talker_capabilities.bits());
        w.u16(self.listener_stream_sinks);
        w.u16(self.listener_capabilities.bits());
        w.u32(self.controller_capabilities.bits());
        w.u32(self.available_index);
        w.u64(self.gptp_grandmaster_id.0);
        w.u8(self.gptp_domain_number);
        w.zeros(1);
        w.u16(self.current_configuration_index);
        w.u16(self.identify_control_index);
        w.u16(self.interface_index);
        w.u64(self.association_id.0);
        w.zeros(4);
        w.into_vec()
    }

    pub(crate) fn decode_body(header: ControlHeader, r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        if header.control_data_length != ADP_CONTROL_DATA_LENGTH {
            return Err(DecodeError::LengthMismatch {
                control_data_length: header.control_data_length,
                body: r.remaining(),
            });
        }
        if r.remaining() < ADP_CONTROL_DATA_LENGTH as usize {
            return Err(DecodeError::TooShort {
                expected: ADP_FRAME_LEN,
                actual: CONTROL_HEADER_LEN + r.remaining(),
            });
        }
        let message_type = AdpMessageType::from_u8(header.message_type).ok_or(
            DecodeError::UnknownMessageType {
                subtype: SUBTYPE_ADP,
                message_type: header.message_type,
            },
        )?;

        let entity_model_id = EntityModelId(r.u64()?);
        let entity_capabilities = EntityCapabilities::from_bits_retain(r.u32()?);
        let talker_stream_sources = r.u16()?;
        let talker_capabilities = TalkerCapabilities::from_bits_retain(r.u16()?);
        let listener_stream_sinks = r.u16()?;
        let listener_capabilities = ListenerCapabilities::from_bits_retain(r.u16()?);
        let controller_capabilities = ControllerCapabilities::from_bits_retain(r.u32()?);
        let available_index = r.u32()?;
        let gptp_grandmaster_id = EntityId(r.u64()?);
        let gptp_domain_number = r.u8()?;
        r.skip(1)?;
        let current_configuration_index = r.u16()?;
        let identify_control_index = r.u16()?;
        let interface_index = r.u16()?;
        let association_id = AssociationId(r.u64()?);
        r.skip(4)?;

        Ok(Self {
            message_type,
            valid_time: header.status,
            entity_id: EntityId(header.id_slot),
            entity_model_id,
            entity_capabilities,
            talker_stream_sources,
            talker_capabilities,
            listener_stream_sinks,
            listener_capabilities,
            controller_capabilities,
            available_index,
            gptp_grandmaster_id,
            gptp_domain_number,
            current_configuration_index,
            identify_control_index,
            interface_index,
            association_id,
        })
    }
}
