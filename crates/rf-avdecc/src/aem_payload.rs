//! AEM command payload codecs
//!
//! Command-specific octets after the AECP fixed fields, one
//! parse/build pair per implemented command. Parse failures map to
//! BAD_ARGUMENTS at the dispatch layer.

use rf_avdecc_pdu::capabilities::{AvbInfoFlags, StreamInfoFlags};
use rf_avdecc_pdu::types::{EntityId, MacAddress, StreamId};
use rf_avdecc_pdu::wire::{ByteReader, ByteWriter};
use rf_avdecc_pdu::{AemCommandType, DecodeError};

use rf_avdecc_model::AudioMapping;

type ParseResult<T> = Result<T, DecodeError>;

/// READ_DESCRIPTOR command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDescriptorCommand {
    pub configuration_index: u16,
    pub descriptor_type: u16,
    pub descriptor_index: u16,
}

impl ReadDescriptorCommand {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let configuration_index = r.u16()?;
        r.skip(2)?;
        Ok(Self {
            configuration_index,
            descriptor_type: r.u16()?,
            descriptor_index: r.u16()?,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(8);
        w.u16(self.configuration_index);
        w.zeros(2);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.into_vec()
    }
}

/// READ_DESCRIPTOR response: configuration echo then raw descriptor
pub fn read_descriptor_response(configuration_index: u16, descriptor: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(4 + descriptor.len());
    w.u16(configuration_index);
    w.zeros(2);
    w.bytes(descriptor);
    w.into_vec()
}

/// ACQUIRE_ENTITY / LOCK_ENTITY payload (same shape both directions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipPayload {
    pub flags: u32,
    pub owner_id: EntityId,
    pub descriptor_type: u16,
    pub descriptor_index: u16,
}

impl OwnershipPayload {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            flags: r.u32()?,
            owner_id: EntityId(r.u64()?),
            descriptor_type: r.u16()?,
            descriptor_index: r.u16()?,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(16);
        w.u32(self.flags);
        w.u64(self.owner_id.0);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.into_vec()
    }
}

/// SET_CONFIGURATION command / GET_CONFIGURATION response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationPayload {
    pub configuration_index: u16,
}

impl ConfigurationPayload {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        r.skip(2)?;
        Ok(Self {
            configuration_index: r.u16()?,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(4);
        w.zeros(2);
        w.u16(self.configuration_index);
        w.into_vec()
    }
}

/// (descriptor_type, descriptor_index) selector used by GET_* and
/// START/STOP_STREAMING commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSelector {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
}

impl DescriptorSelector {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            descriptor_type: r.u16()?,
            descriptor_index: r.u16()?,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(4);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.into_vec()
    }
}

/// SET_STREAM_FORMAT command and GET/SET_STREAM_FORMAT responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormatPayload {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub stream_format: u64,
}

impl StreamFormatPayload {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            descriptor_type: r.u16()?,
            descriptor_index: r.u16()?,
            stream_format: r.u64()?,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(12);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u64(self.stream_format);
        w.into_vec()
    }
}

/// GET/SET_STREAM_INFO payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfoPayload {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub flags: StreamInfoFlags,
    pub stream_format: u64,
    pub stream_id: StreamId,
    pub msrp_accumulated_latency: u32,
    pub stream_dest_mac: MacAddress,
    pub msrp_failure_code: u8,
    pub msrp_failure_bridge_id: u64,
    pub stream_vlan_id: u16,
}

impl StreamInfoPayload {
    pub const WIRE_LEN: usize = 48;

    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let descriptor_type = r.u16()?;
        let descriptor_index = r.u16()?;
        let flags = StreamInfoFlags::from_bits_retain(r.u32()?);
        let stream_format = r.u64()?;
        let stream_id = StreamId(r.u64()?);
        let msrp_accumulated_latency = r.u32()?;
        let stream_dest_mac = r.mac()?;
        let msrp_failure_code = r.u8()?;
        r.skip(1)?;
        let msrp_failure_bridge_id = r.u64()?;
        let stream_vlan_id = r.u16()?;
        r.skip(2)?;
        Ok(Self {
            descriptor_type,
            descriptor_index,
            flags,
            stream_format,
            stream_id,
            msrp_accumulated_latency,
            stream_dest_mac,
            msrp_failure_code,
            msrp_failure_bridge_id,
            stream_vlan_id,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(Self::WIRE_LEN);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u32(self.flags.bits());
        w.u64(self.stream_format);
        w.u64(self.stream_id.0);
        w.u32(self.msrp_accumulated_latency);
        w.mac(self.stream_dest_mac);
        w.u8(self.msrp_failure_code);
        w.zeros(1);
        w.u64(self.msrp_failure_bridge_id);
        w.u16(self.stream_vlan_id);
        w.zeros(2);
        w.into_vec()
    }
}

/// GET_AVB_INFO response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvbInfoPayload {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub gptp_grandmaster_id: EntityId,
    pub propagation_delay: u32,
    pub gptp_domain_number: u8,
    pub flags: AvbInfoFlags,
    /// (traffic_class, priority, vlan_id) MSRP mappings
    pub msrp_mappings: Vec<(u8, u8, u16)>,
}

impl AvbInfoPayload {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let descriptor_type = r.u16()?;
        let descriptor_index = r.u16()?;
        let gptp_grandmaster_id = EntityId(r.u64()?);
        let propagation_delay = r.u32()?;
        let gptp_domain_number = r.u8()?;
        let flags = AvbInfoFlags::from_bits_retain(r.u8()?);
        let count = r.u16()?;
        let mut msrp_mappings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            msrp_mappings.push((r.u8()?, r.u8()?, r.u16()?));
        }
        Ok(Self {
            descriptor_type,
            descriptor_index,
            gptp_grandmaster_id,
            propagation_delay,
            gptp_domain_number,
            flags,
            msrp_mappings,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(20 + self.msrp_mappings.len() * 4);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u64(self.gptp_grandmaster_id.0);
        w.u32(self.propagation_delay);
        w.u8(self.gptp_domain_number);
        w.u8(self.flags.bits());
        w.u16(self.msrp_mappings.len() as u16);
        for (traffic_class, priority, vlan_id) in &self.msrp_mappings {
            w.u8(*traffic_class);
            w.u8(*priority);
            w.u16(*vlan_id);
        }
        w.into_vec()
    }
}

/// GET_AUDIO_MAP command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAudioMapCommand {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub map_index: u16,
}

impl GetAudioMapCommand {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let descriptor_type = r.u16()?;
        let descriptor_index = r.u16()?;
        let map_index = r.u16()?;
        r.skip(2)?;
        Ok(Self {
            descriptor_type,
            descriptor_index,
            map_index,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(8);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u16(self.map_index);
        w.zeros(2);
        w.into_vec()
    }
}

/// GET_AUDIO_MAP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAudioMapResponse {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub map_index: u16,
    pub number_of_maps: u16,
    pub mappings: Vec<AudioMapping>,
}

impl GetAudioMapResponse {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let descriptor_type = r.u16()?;
        let descriptor_index = r.u16()?;
        let map_index = r.u16()?;
        let number_of_maps = r.u16()?;
        let count = r.u16()?;
        r.skip(2)?;
        let mut mappings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            mappings.push(read_mapping(&mut r)?);
        }
        Ok(Self {
            descriptor_type,
            descriptor_index,
            map_index,
            number_of_maps,
            mappings,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(12 + self.mappings.len() * AudioMapping::WIRE_LEN);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u16(self.map_index);
        w.u16(self.number_of_maps);
        w.u16(self.mappings.len() as u16);
        w.zeros(2);
        for mapping in &self.mappings {
            write_mapping(&mut w, mapping);
        }
        w.into_vec()
    }
}

/// ADD/REMOVE_AUDIO_MAPPINGS payload (both directions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMappingsPayload {
    pub descriptor_type: u16,
    pub descriptor_index: u16,
    pub map_index: u16,
    pub mappings: Vec<AudioMapping>,
}

impl AudioMappingsPayload {
    pub fn parse(payload: &[u8]) -> ParseResult<Self> {
        let mut r = ByteReader::new(payload);
        let descriptor_type = r.u16()?;
        let descriptor_index = r.u16()?;
        let map_index = r.u16()?;
        let count = r.u16()?;
        let mut mappings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            mappings.push(read_mapping(&mut r)?);
        }
        Ok(Self {
            descriptor_type,
            descriptor_index,
            map_index,
            mappings,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(8 + self.mappings.len() * AudioMapping::WIRE_LEN);
        w.u16(self.descriptor_type);
        w.u16(self.descriptor_index);
        w.u16(self.map_index);
        w.u16(self.mappings.len() as u16);
        for mapping in &self.mappings {
            write_mapping(&mut w, mapping);
        }
        w.into_vec()
    }
}

fn read_mapping(r: &mut ByteReader<'_>) -> ParseResult<AudioMapping> {
    Ok(AudioMapping {
        stream_index: r.u16()?,
        stream_channel: r.u16()?,
        cluster_offset: r.u16()?,
        cluster_channel: r.u16()?,
    })
}

fn write_mapping(w: &mut ByteWriter, mapping: &AudioMapping) {
    w.u16(mapping.stream_index);
    w.u16(mapping.stream_channel);
    w.u16(mapping.cluster_offset);
    w.u16(mapping.cluster_channel);
}

/// One sub-query of a GET_DYNAMIC_INFO batch:
/// `[command_type (2), length (2), payload…]` records back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicInfoRecord {
    pub command_type: AemCommandType,
    pub payload: Vec<u8>,
}

/// Parse a packed GET_DYNAMIC_INFO batch.
pub fn parse_dynamic_info(payload: &[u8]) -> ParseResult<Vec<DynamicInfoRecord>> {
    let mut r = ByteReader::new(payload);
    let mut records = Vec::new();
    while r.remaining() > 0 {
        let command_type = AemCommandType(r.u16()? & 0x7FFF);
        let length = r.u16()? as usize;
        let payload = r.bytes(length)?.to_vec();
        records.push(DynamicInfoRecord {
            command_type,
            payload,
        });
    }
    Ok(records)
}

/// Pack GET_DYNAMIC_INFO records.
pub fn build_dynamic_info(records: &[DynamicInfoRecord]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    for record in records {
        w.u16(record.command_type.as_u16());
        w.u16(record.payload.len() as u16);
        w.bytes(&record.payload);
    }
    w.into_vec()
}
