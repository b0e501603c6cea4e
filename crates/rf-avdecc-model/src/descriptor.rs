//! Typed AEM descriptors with bit-exact codecs
//!
//! Every descriptor starts with `descriptor_type (2)` and
//! `descriptor_index (2)` on the wire; the structs below carry the
//! payload fields only, in wire order. Object name strings are fixed
//! 64-octet NUL-padded fields. Variable-length descriptors serialize
//! their offset/count headers exactly as the format dictates and are
//! capped at 512 octets.


use rf_avdecc_pdu::capabilities::{
    AvbInterfaceFlags, ClockSourceFlags, ControllerCapabilities, EntityCapabilities, JackFlags,
    ListenerCapabilities, PortFlags, StreamDescriptorFlags, TalkerCapabilities,
};
use rf_avdecc_pdu::types::{AssociationId, EntityId, EntityModelId, MacAddress, StreamId};
use rf_avdecc_pdu::wire::{ByteReader, ByteWriter};

use crate::error::{ModelError, ModelResult};

/// Serialized size cap for variable-length descriptors
pub const DESCRIPTOR_MAX_LEN: usize = 512;

/// Fixed width of AEM object-name string fields
pub const AEM_STR_LEN: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTOR TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// AEM descriptor type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum DescriptorType {
    Entity = 0x0000,
    Configuration = 0x0001,
    AudioUnit = 0x0002,
    VideoUnit = 0x0003,
    SensorUnit = 0x0004,
    StreamInput = 0x0005,
    StreamOutput = 0x0006,
    JackInput = 0x0007,
    JackOutput = 0x0008,
    AvbInterface = 0x0009,
    ClockSource = 0x000A,
    MemoryObject = 0x000B,
    Locale = 0x000C,
    Strings = 0x000D,
    StreamPortInput = 0x000E,
    StreamPortOutput = 0x000F,
    ExternalPortInput = 0x0010,
    ExternalPortOutput = 0x0011,
    InternalPortInput = 0x0012,
    InternalPortOutput = 0x0013,
    AudioCluster = 0x0014,
    VideoCluster = 0x0015,
    SensorCluster = 0x0016,
    AudioMap = 0x0017,
    VideoMap = 0x0018,
    SensorMap = 0x0019,
    Control = 0x001A,
    SignalSelector = 0x001B,
    Mixer = 0x001C,
    Matrix = 0x001D,
    MatrixSignal = 0x001E,
    SignalSplitter = 0x001F,
    SignalCombiner = 0x0020,
    SignalDemultiplexer = 0x0021,
    SignalMultiplexer = 0x0022,
    SignalTranscoder = 0x0023,
    ClockDomain = 0x0024,
    ControlBlock = 0x0025,
}

impl DescriptorType {
    pub fn from_u16(v: u16) -> Option<Self> {
        if v > 0x0025 {
            return None;
        }
        // Contiguous code space; transmute-free table.
        const TABLE: [DescriptorType; 0x26] = [
            DescriptorType::Entity,
            DescriptorType::Configuration,
            DescriptorType::AudioUnit,
            DescriptorType::VideoUnit,
            DescriptorType::SensorUnit,
            DescriptorType::StreamInput,
            DescriptorType::StreamOutput,
            DescriptorType::JackInput,
            DescriptorType::JackOutput,
            DescriptorType::AvbInterface,
            DescriptorType::ClockSource,
            DescriptorType::MemoryObject,
            DescriptorType::Locale,
            DescriptorType::Strings,
            DescriptorType::StreamPortInput,
            DescriptorType::StreamPortOutput,
            DescriptorType::ExternalPortInput,
            DescriptorType::ExternalPortOutput,
            DescriptorType::InternalPortInput,
            DescriptorType::InternalPortOutput,
            DescriptorType::AudioCluster,
            DescriptorType::VideoCluster,
            DescriptorType::SensorCluster,
            DescriptorType::AudioMap,
            DescriptorType::VideoMap,
            DescriptorType::SensorMap,
            DescriptorType::Control,
            DescriptorType::SignalSelector,
            DescriptorType::Mixer,
            DescriptorType::Matrix,
            DescriptorType::MatrixSignal,
            DescriptorType::SignalSplitter,
            DescriptorType::SignalCombiner,
            DescriptorType::SignalDemultiplexer,
            DescriptorType::SignalMultiplexer,
            DescriptorType::SignalTranscoder,
            DescriptorType::ClockDomain,
            DescriptorType::ControlBlock,
        ];
        Some(TABLE[v as usize])
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRING FIELDS
// ═══════════════════════════════════════════════════════════════════════════════

fn write_str64(w: &mut ByteWriter, s: &str) {
    let mut buf = [0u8; AEM_STR_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(AEM_STR_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.bytes(&buf);
}

fn read_str64(r: &mut ByteReader<'_>) -> ModelResult<String> {
    let raw = r.bytes(AEM_STR_LEN)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(AEM_STR_LEN);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-LAYOUT DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// ENTITY descriptor (exactly one per entity, index 0)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityDescriptor {
    pub entity_id: EntityId,
    pub entity_model_id: EntityModelId,
    pub entity_capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: TalkerCapabilities,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: ListenerCapabilities,
    pub controller_capabilities: ControllerCapabilities,
    pub available_index: u32,
    pub association_id: AssociationId,
    pub entity_name: String,
    pub vendor_name_string: u16,
    pub model_name_string: u16,
    pub firmware_version: String,
    pub group_name: String,
    pub serial_number: String,
    pub configurations_count: u16,
    pub current_configuration: u16,
}

impl EntityDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        w.u64(self.entity_id.0);
        w.u64(self.entity_model_id.0);
        w.u32(self.entity_capabilities.bits());
        w.u16(self.talker_stream_sources);
        w.u16(self.talker_capabilities.bits());
        w.u16(self.listener_stream_sinks);
        w.u16(self.listener_capabilities.bits());
        w.u32(self.controller_capabilities.bits());
        w.u32(self.available_index);
        w.u64(self.association_id.0);
        write_str64(w, &self.entity_name);
        w.u16(self.vendor_name_string);
        w.u16(self.model_name_string);
        write_str64(w, &self.firmware_version);
        write_str64(w, &self.group_name);
        write_str64(w, &self.serial_number);
        w.u16(self.configurations_count);
        w.u16(self.current_configuration);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            entity_id: EntityId(r.u64()?),
            entity_model_id: EntityModelId(r.u64()?),
            entity_capabilities: EntityCapabilities::from_bits_retain(r.u32()?),
            talker_stream_sources: r.u16()?,
            talker_capabilities: TalkerCapabilities::from_bits_retain(r.u16()?),
            listener_stream_sinks: r.u16()?,
            listener_capabilities: ListenerCapabilities::from_bits_retain(r.u16()?),
            controller_capabilities: ControllerCapabilities::from_bits_retain(r.u32()?),
            available_index: r.u32()?,
            association_id: AssociationId(r.u64()?),
            entity_name: read_str64(r)?,
            vendor_name_string: r.u16()?,
            model_name_string: r.u16()?,
            firmware_version: read_str64(r)?,
            group_name: read_str64(r)?,
            serial_number: read_str64(r)?,
            configurations_count: r.u16()?,
            current_configuration: r.u16()?,
        })
    }
}

/// CONFIGURATION descriptor: per-type descriptor counts for one
/// configuration of the entity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    /// (descriptor_type, count) pairs indexing the rest of the store
    pub descriptor_counts: Vec<(u16, u16)>,
}

impl ConfigurationDescriptor {
    /// Offset of the counts array from the start of the descriptor
    const COUNTS_OFFSET: u16 = 74;

    pub fn count_of(&self, descriptor_type: DescriptorType) -> u16 {
        self.descriptor_counts
            .iter()
            .find(|(t, _)| *t == descriptor_type.as_u16())
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.descriptor_counts.len() as u16);
        w.u16(Self::COUNTS_OFFSET);
        for (t, c) in &self.descriptor_counts {
            w.u16(*t);
            w.u16(*c);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let count = r.u16()?;
        let _offset = r.u16()?;
        let mut descriptor_counts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            descriptor_counts.push((r.u16()?, r.u16()?));
        }
        Ok(Self {
            object_name,
            localized_description,
            descriptor_counts,
        })
    }
}

/// AUDIO_UNIT descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioUnitDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub clock_domain_index: u16,
    pub number_of_stream_input_ports: u16,
    pub base_stream_input_port: u16,
    pub number_of_stream_output_ports: u16,
    pub base_stream_output_port: u16,
    pub number_of_external_input_ports: u16,
    pub base_external_input_port: u16,
    pub number_of_external_output_ports: u16,
    pub base_external_output_port: u16,
    pub number_of_internal_input_ports: u16,
    pub base_internal_input_port: u16,
    pub number_of_internal_output_ports: u16,
    pub base_internal_output_port: u16,
    pub number_of_controls: u16,
    pub base_control: u16,
    pub number_of_signal_selectors: u16,
    pub base_signal_selector: u16,
    pub number_of_mixers: u16,
    pub base_mixer: u16,
    pub number_of_matrices: u16,
    pub base_matrix: u16,
    pub number_of_splitters: u16,
    pub base_splitter: u16,
    pub number_of_combiners: u16,
    pub base_combiner: u16,
    pub number_of_demultiplexers: u16,
    pub base_demultiplexer: u16,
    pub number_of_multiplexers: u16,
    pub base_multiplexer: u16,
    pub number_of_transcoders: u16,
    pub base_transcoder: u16,
    pub number_of_control_blocks: u16,
    pub base_control_block: u16,
    pub current_sampling_rate: u32,
    pub sampling_rates: Vec<u32>,
}

impl AudioUnitDescriptor {
    /// type(2) + index(2) + name(64) + desc(2) + clock(2) + 16 pairs(64)
    /// + rate(4) + offset(2) + count(2)
    const RATES_OFFSET: u16 = 144;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.clock_domain_index);
        for (n, b) in [
            (self.number_of_stream_input_ports, self.base_stream_input_port),
            (self.number_of_stream_output_ports, self.base_stream_output_port),
            (self.number_of_external_input_ports, self.base_external_input_port),
            (self.number_of_external_output_ports, self.base_external_output_port),
            (self.number_of_internal_input_ports, self.base_internal_input_port),
            (self.number_of_internal_output_ports, self.base_internal_output_port),
            (self.number_of_controls, self.base_control),
            (self.number_of_signal_selectors, self.base_signal_selector),
            (self.number_of_mixers, self.base_mixer),
            (self.number_of_matrices, self.base_matrix),
            (self.number_of_splitters, self.base_splitter),
            (self.number_of_combiners, self.base_combiner),
            (self.number_of_demultiplexers, self.base_demultiplexer),
            (self.number_of_multiplexers, self.base_multiplexer),
            (self.number_of_transcoders, self.base_transcoder),
            (self.number_of_control_blocks, self.base_control_block),
        ] {
            w.u16(n);
            w.u16(b);
        }
        w.u32(self.current_sampling_rate);
        w.u16(Self::RATES_OFFSET);
        w.u16(self.sampling_rates.len() as u16);
        for rate in &self.sampling_rates {
            w.u32(*rate);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let clock_domain_index = r.u16()?;
        let mut pairs = [(0u16, 0u16); 16];
        for pair in &mut pairs {
            *pair = (r.u16()?, r.u16()?);
        }
        let current_sampling_rate = r.u32()?;
        let _offset = r.u16()?;
        let count = r.u16()?;
        let mut sampling_rates = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sampling_rates.push(r.u32()?);
        }
        Ok(Self {
            object_name,
            localized_description,
            clock_domain_index,
            number_of_stream_input_ports: pairs[0].0,
            base_stream_input_port: pairs[0].1,
            number_of_stream_output_ports: pairs[1].0,
            base_stream_output_port: pairs[1].1,
            number_of_external_input_ports: pairs[2].0,
            base_external_input_port: pairs[2].1,
            number_of_external_output_ports: pairs[3].0,
            base_external_output_port: pairs[3].1,
            number_of_internal_input_ports: pairs[4].0,
            base_internal_input_port: pairs[4].1,
            number_of_internal_output_ports: pairs[5].0,
            base_internal_output_port: pairs[5].1,
            number_of_controls: pairs[6].0,
            base_control: pairs[6].1,
            number_of_signal_selectors: pairs[7].0,
            base_signal_selector: pairs[7].1,
            number_of_mixers: pairs[8].0,
            base_mixer: pairs[8].1,
            number_of_matrices: pairs[9].0,
            base_matrix: pairs[9].1,
            number_of_splitters: pairs[10].0,
            base_splitter: pairs[10].1,
            number_of_combiners: pairs[11].0,
            base_combiner: pairs[11].1,
            number_of_demultiplexers: pairs[12].0,
            base_demultiplexer: pairs[12].1,
            number_of_multiplexers: pairs[13].0,
            base_multiplexer: pairs[13].1,
            number_of_transcoders: pairs[14].0,
            base_transcoder: pairs[14].1,
            number_of_control_blocks: pairs[15].0,
            base_control_block: pairs[15].1,
            current_sampling_rate,
            sampling_rates,
        })
    }
}

/// Backup talker reference carried by stream descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupTalker {
    pub entity_id: EntityId,
    pub unique_id: u16,
}

/// STREAM_INPUT / STREAM_OUTPUT descriptor (shared layout)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub clock_domain_index: u16,
    pub stream_flags: StreamDescriptorFlags,
    pub current_format: u64,
    pub backup_talkers: [BackupTalker; 3],
    pub backedup_talker: BackupTalker,
    pub avb_interface_index: u16,
    pub buffer_length: u32,
    pub formats: Vec<u64>,
}

impl StreamDescriptor {
    const FORMATS_OFFSET: u16 = 132;

    /// Channel width encoded in the current stream format. The model
    /// treats bits 47..32 of the format word as channels-per-frame.
    pub fn format_channel_count(&self) -> u16 {
        ((self.current_format >> 32) & 0xFFFF) as u16
    }

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.clock_domain_index);
        w.u16(self.stream_flags.bits());
        w.u64(self.current_format);
        w.u16(Self::FORMATS_OFFSET);
        w.u16(self.formats.len() as u16);
        for backup in &self.backup_talkers {
            w.u64(backup.entity_id.0);
            w.u16(backup.unique_id);
        }
        w.u64(self.backedup_talker.entity_id.0);
        w.u16(self.backedup_talker.unique_id);
        w.u16(self.avb_interface_index);
        w.u32(self.buffer_length);
        for format in &self.formats {
            w.u64(*format);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let clock_domain_index = r.u16()?;
        let stream_flags = StreamDescriptorFlags::from_bits_retain(r.u16()?);
        let current_format = r.u64()?;
        let _offset = r.u16()?;
        let count = r.u16()?;
        let mut backup_talkers = [BackupTalker::default(); 3];
        for backup in &mut backup_talkers {
            backup.entity_id = EntityId(r.u64()?);
            backup.unique_id = r.u16()?;
        }
        let backedup_talker = BackupTalker {
            entity_id: EntityId(r.u64()?),
            unique_id: r.u16()?,
        };
        let avb_interface_index = r.u16()?;
        let buffer_length = r.u32()?;
        let mut formats = Vec::with_capacity(count as usize);
        for _ in 0..count {
            formats.push(r.u64()?);
        }
        Ok(Self {
            object_name,
            localized_description,
            clock_domain_index,
            stream_flags,
            current_format,
            backup_talkers,
            backedup_talker,
            avb_interface_index,
            buffer_length,
            formats,
        })
    }
}

/// JACK_INPUT / JACK_OUTPUT descriptor (shared layout)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JackDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub jack_flags: JackFlags,
    pub jack_type: u16,
    pub number_of_controls: u16,
    pub base_control: u16,
}

impl JackDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.jack_flags.bits());
        w.u16(self.jack_type);
        w.u16(self.number_of_controls);
        w.u16(self.base_control);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            object_name: read_str64(r)?,
            localized_description: r.u16()?,
            jack_flags: JackFlags::from_bits_retain(r.u16()?),
            jack_type: r.u16()?,
            number_of_controls: r.u16()?,
            base_control: r.u16()?,
        })
    }
}

/// AVB_INTERFACE descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvbInterfaceDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub mac_address: MacAddress,
    pub interface_flags: AvbInterfaceFlags,
    pub clock_identity: EntityId,
    pub priority1: u8,
    pub clock_class: u8,
    pub offset_scaled_log_variance: u16,
    pub clock_accuracy: u8,
    pub priority2: u8,
    pub domain_number: u8,
    pub log_sync_interval: i8,
    pub log_announce_interval: i8,
    pub log_pdelay_interval: i8,
    pub port_number: u16,
}

impl AvbInterfaceDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.mac(self.mac_address);
        w.u16(self.interface_flags.bits());
        w.u64(self.clock_identity.0);
        w.u8(self.priority1);
        w.u8(self.clock_class);
        w.u16(self.offset_scaled_log_variance);
        w.u8(self.clock_accuracy);
        w.u8(self.priority2);
        w.u8(self.domain_number);
        w.u8(self.log_sync_interval as u8);
        w.u8(self.log_announce_interval as u8);
        w.u8(self.log_pdelay_interval as u8);
        w.u16(self.port_number);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            object_name: read_str64(r)?,
            localized_description: r.u16()?,
            mac_address: r.mac()?,
            interface_flags: AvbInterfaceFlags::from_bits_retain(r.u16()?),
            clock_identity: EntityId(r.u64()?),
            priority1: r.u8()?,
            clock_class: r.u8()?,
            offset_scaled_log_variance: r.u16()?,
            clock_accuracy: r.u8()?,
            priority2: r.u8()?,
            domain_number: r.u8()?,
            log_sync_interval: r.u8()? as i8,
            log_announce_interval: r.u8()? as i8,
            log_pdelay_interval: r.u8()? as i8,
            port_number: r.u16()?,
        })
    }
}

/// CLOCK_SOURCE descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockSourceDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub clock_source_flags: ClockSourceFlags,
    pub clock_source_type: u16,
    pub clock_source_identifier: StreamId,
    pub clock_source_location_type: u16,
    pub clock_source_location_index: u16,
}

impl ClockSourceDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.clock_source_flags.bits());
        w.u16(self.clock_source_type);
        w.u64(self.clock_source_identifier.0);
        w.u16(self.clock_source_location_type);
        w.u16(self.clock_source_location_index);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            object_name: read_str64(r)?,
            localized_description: r.u16()?,
            clock_source_flags: ClockSourceFlags::from_bits_retain(r.u16()?),
            clock_source_type: r.u16()?,
            clock_source_identifier: StreamId(r.u64()?),
            clock_source_location_type: r.u16()?,
            clock_source_location_index: r.u16()?,
        })
    }
}

/// CLOCK_DOMAIN descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockDomainDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub clock_source_index: u16,
    pub clock_sources: Vec<u16>,
}

impl ClockDomainDescriptor {
    const SOURCES_OFFSET: u16 = 76;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.clock_source_index);
        w.u16(Self::SOURCES_OFFSET);
        w.u16(self.clock_sources.len() as u16);
        for source in &self.clock_sources {
            w.u16(*source);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let clock_source_index = r.u16()?;
        let _offset = r.u16()?;
        let count = r.u16()?;
        let mut clock_sources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            clock_sources.push(r.u16()?);
        }
        Ok(Self {
            object_name,
            localized_description,
            clock_source_index,
            clock_sources,
        })
    }
}

/// STREAM_PORT_INPUT / STREAM_PORT_OUTPUT descriptor (shared layout)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamPortDescriptor {
    pub clock_domain_index: u16,
    pub port_flags: PortFlags,
    pub number_of_controls: u16,
    pub base_control: u16,
    pub number_of_clusters: u16,
    pub base_cluster: u16,
    pub number_of_maps: u16,
    pub base_map: u16,
}

impl StreamPortDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        w.u16(self.clock_domain_index);
        w.u16(self.port_flags.bits());
        w.u16(self.number_of_controls);
        w.u16(self.base_control);
        w.u16(self.number_of_clusters);
        w.u16(self.base_cluster);
        w.u16(self.number_of_maps);
        w.u16(self.base_map);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            clock_domain_index: r.u16()?,
            port_flags: PortFlags::from_bits_retain(r.u16()?),
            number_of_controls: r.u16()?,
            base_control: r.u16()?,
            number_of_clusters: r.u16()?,
            base_cluster: r.u16()?,
            number_of_maps: r.u16()?,
            base_map: r.u16()?,
        })
    }
}

/// AUDIO_CLUSTER descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioClusterDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub signal_type: u16,
    pub signal_index: u16,
    pub signal_output: u16,
    pub path_latency: u32,
    pub block_latency: u32,
    pub channel_count: u16,
    pub format: u8,
}

impl AudioClusterDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.signal_type);
        w.u16(self.signal_index);
        w.u16(self.signal_output);
        w.u32(self.path_latency);
        w.u32(self.block_latency);
        w.u16(self.channel_count);
        w.u8(self.format);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            object_name: read_str64(r)?,
            localized_description: r.u16()?,
            signal_type: r.u16()?,
            signal_index: r.u16()?,
            signal_output: r.u16()?,
            path_latency: r.u32()?,
            block_latency: r.u32()?,
            channel_count: r.u16()?,
            format: r.u8()?,
        })
    }
}

/// One channel mapping in an AUDIO_MAP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioMapping {
    pub stream_index: u16,
    pub stream_channel: u16,
    pub cluster_offset: u16,
    pub cluster_channel: u16,
}

impl AudioMapping {
    pub const WIRE_LEN: usize = 8;

    pub fn encode(&self, w: &mut ByteWriter) {
        w.u16(self.stream_index);
        w.u16(self.stream_channel);
        w.u16(self.cluster_offset);
        w.u16(self.cluster_channel);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            stream_index: r.u16()?,
            stream_channel: r.u16()?,
            cluster_offset: r.u16()?,
            cluster_channel: r.u16()?,
        })
    }
}

/// AUDIO_MAP descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioMapDescriptor {
    pub mappings: Vec<AudioMapping>,
}

impl AudioMapDescriptor {
    const MAPPINGS_OFFSET: u16 = 8;

    fn encode_body(&self, w: &mut ByteWriter) {
        w.u16(Self::MAPPINGS_OFFSET);
        w.u16(self.mappings.len() as u16);
        for mapping in &self.mappings {
            mapping.encode(w);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let _offset = r.u16()?;
        let count = r.u16()?;
        let mut mappings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            mappings.push(AudioMapping::decode(r)?);
        }
        Ok(Self { mappings })
    }
}

/// CONTROL descriptor. Value details are format-specific and kept raw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub block_latency: u32,
    pub control_latency: u32,
    pub control_domain: u16,
    pub control_value_type: u16,
    pub control_type: u64,
    pub reset_time: u32,
    pub number_of_values: u16,
    pub signal_type: u16,
    pub signal_index: u16,
    pub signal_output: u16,
    pub value_details: Vec<u8>,
}

impl ControlDescriptor {
    const VALUES_OFFSET: u16 = 104;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u32(self.block_latency);
        w.u32(self.control_latency);
        w.u16(self.control_domain);
        w.u16(self.control_value_type);
        w.u64(self.control_type);
        w.u32(self.reset_time);
        w.u16(Self::VALUES_OFFSET);
        w.u16(self.number_of_values);
        w.u16(self.signal_type);
        w.u16(self.signal_index);
        w.u16(self.signal_output);
        w.bytes(&self.value_details);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let block_latency = r.u32()?;
        let control_latency = r.u32()?;
        let control_domain = r.u16()?;
        let control_value_type = r.u16()?;
        let control_type = r.u64()?;
        let reset_time = r.u32()?;
        let _offset = r.u16()?;
        let number_of_values = r.u16()?;
        let signal_type = r.u16()?;
        let signal_index = r.u16()?;
        let signal_output = r.u16()?;
        let value_details = r.bytes(r.remaining())?.to_vec();
        Ok(Self {
            object_name,
            localized_description,
            block_latency,
            control_latency,
            control_domain,
            control_value_type,
            control_type,
            reset_time,
            number_of_values,
            signal_type,
            signal_index,
            signal_output,
            value_details,
        })
    }
}

/// Signal source reference used by selectors, mixers and matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalReference {
    pub signal_type: u16,
    pub signal_index: u16,
    pub signal_output: u16,
}

impl SignalReference {
    fn encode(&self, w: &mut ByteWriter) {
        w.u16(self.signal_type);
        w.u16(self.signal_index);
        w.u16(self.signal_output);
    }

    fn decode(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            signal_type: r.u16()?,
            signal_index: r.u16()?,
            signal_output: r.u16()?,
        })
    }
}

/// SIGNAL_SELECTOR descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalSelectorDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub block_latency: u32,
    pub control_latency: u32,
    pub control_domain: u16,
    pub current_signal: SignalReference,
    pub default_signal: SignalReference,
    pub sources: Vec<SignalReference>,
}

impl SignalSelectorDescriptor {
    const SOURCES_OFFSET: u16 = 96;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u32(self.block_latency);
        w.u32(self.control_latency);
        w.u16(self.control_domain);
        w.u16(Self::SOURCES_OFFSET);
        w.u16(self.sources.len() as u16);
        self.current_signal.encode(w);
        self.default_signal.encode(w);
        for source in &self.sources {
            source.encode(w);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let block_latency = r.u32()?;
        let control_latency = r.u32()?;
        let control_domain = r.u16()?;
        let _offset = r.u16()?;
        let count = r.u16()?;
        let current_signal = SignalReference::decode(r)?;
        let default_signal = SignalReference::decode(r)?;
        let mut sources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sources.push(SignalReference::decode(r)?);
        }
        Ok(Self {
            object_name,
            localized_description,
            block_latency,
            control_latency,
            control_domain,
            current_signal,
            default_signal,
            sources,
        })
    }
}

/// MIXER descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MixerDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub block_latency: u32,
    pub control_latency: u32,
    pub control_domain: u16,
    pub sources: Vec<SignalReference>,
}

impl MixerDescriptor {
    const SOURCES_OFFSET: u16 = 84;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u32(self.block_latency);
        w.u32(self.control_latency);
        w.u16(self.control_domain);
        w.u16(Self::SOURCES_OFFSET);
        w.u16(self.sources.len() as u16);
        for source in &self.sources {
            source.encode(w);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let block_latency = r.u32()?;
        let control_latency = r.u32()?;
        let control_domain = r.u16()?;
        let _offset = r.u16()?;
        let count = r.u16()?;
        let mut sources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sources.push(SignalReference::decode(r)?);
        }
        Ok(Self {
            object_name,
            localized_description,
            block_latency,
            control_latency,
            control_domain,
            sources,
        })
    }
}

/// MATRIX descriptor. Cell value details are kept raw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatrixDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub control_domain: u16,
    pub control_value_type: u16,
    pub width: u16,
    pub height: u16,
    pub number_of_values: u16,
    pub number_of_sources: u16,
    pub base_source: u16,
    pub number_of_destinations: u16,
    pub base_destination: u16,
    pub value_details: Vec<u8>,
}

impl MatrixDescriptor {
    const VALUES_OFFSET: u16 = 88;

    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.control_domain);
        w.u16(self.control_value_type);
        w.u16(self.width);
        w.u16(self.height);
        w.u16(Self::VALUES_OFFSET);
        w.u16(self.number_of_values);
        w.u16(self.number_of_sources);
        w.u16(self.base_source);
        w.u16(self.number_of_destinations);
        w.u16(self.base_destination);
        w.bytes(&self.value_details);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let object_name = read_str64(r)?;
        let localized_description = r.u16()?;
        let control_domain = r.u16()?;
        let control_value_type = r.u16()?;
        let width = r.u16()?;
        let height = r.u16()?;
        let _offset = r.u16()?;
        let number_of_values = r.u16()?;
        let number_of_sources = r.u16()?;
        let base_source = r.u16()?;
        let number_of_destinations = r.u16()?;
        let base_destination = r.u16()?;
        let value_details = r.bytes(r.remaining())?.to_vec();
        Ok(Self {
            object_name,
            localized_description,
            control_domain,
            control_value_type,
            width,
            height,
            number_of_values,
            number_of_sources,
            base_source,
            number_of_destinations,
            base_destination,
            value_details,
        })
    }
}

/// LOCALE descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocaleDescriptor {
    pub locale_identifier: String,
    pub number_of_strings: u16,
    pub base_strings: u16,
}

impl LocaleDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.locale_identifier);
        w.u16(self.number_of_strings);
        w.u16(self.base_strings);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            locale_identifier: read_str64(r)?,
            number_of_strings: r.u16()?,
            base_strings: r.u16()?,
        })
    }
}

/// STRINGS descriptor: seven localized strings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringsDescriptor {
    pub strings: [String; 7],
}

impl StringsDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        for s in &self.strings {
            write_str64(w, s);
        }
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        let mut strings: [String; 7] = Default::default();
        for s in &mut strings {
            *s = read_str64(r)?;
        }
        Ok(Self { strings })
    }
}

/// MEMORY_OBJECT descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryObjectDescriptor {
    pub object_name: String,
    pub localized_description: u16,
    pub memory_object_type: u16,
    pub target_descriptor_type: u16,
    pub target_descriptor_index: u16,
    pub start_address: u64,
    pub maximum_length: u64,
    pub length: u64,
}

impl MemoryObjectDescriptor {
    fn encode_body(&self, w: &mut ByteWriter) {
        write_str64(w, &self.object_name);
        w.u16(self.localized_description);
        w.u16(self.memory_object_type);
        w.u16(self.target_descriptor_type);
        w.u16(self.target_descriptor_index);
        w.u64(self.start_address);
        w.u64(self.maximum_length);
        w.u64(self.length);
    }

    fn decode_body(r: &mut ByteReader<'_>) -> ModelResult<Self> {
        Ok(Self {
            object_name: read_str64(r)?,
            localized_description: r.u16()?,
            memory_object_type: r.u16()?,
            target_descriptor_type: r.u16()?,
            target_descriptor_index: r.u16()?,
            start_address: r.u64()?,
            maximum_length: r.u64()?,
            length: r.u64()?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAGGED DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// A typed descriptor, tagged by where it lives in the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Entity(EntityDescriptor),
    Configuration(ConfigurationDescriptor),
    AudioUnit(AudioUnitDescriptor),
    StreamInput(StreamDescriptor),
    StreamOutput(StreamDescriptor),
    JackInput(JackDescriptor),
    JackOutput(JackDescriptor),
    AvbInterface(AvbInterfaceDescriptor),
    ClockSource(ClockSourceDescriptor),
    ClockDomain(ClockDomainDescriptor),
    StreamPortInput(StreamPortDescriptor),
    StreamPortOutput(StreamPortDescriptor),
    AudioCluster(AudioClusterDescriptor),
    AudioMap(AudioMapDescriptor),
    Control(ControlDescriptor),
    SignalSelector(SignalSelectorDescriptor),
    Mixer(MixerDescriptor),
    Matrix(MatrixDescriptor),
    Locale(LocaleDescriptor),
    Strings(StringsDescriptor),
    MemoryObject(MemoryObjectDescriptor),
}

impl Descriptor {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::Entity(_) => DescriptorType::Entity,
            Self::Configuration(_) => DescriptorType::Configuration,
            Self::AudioUnit(_) => DescriptorType::AudioUnit,
            Self::StreamInput(_) => DescriptorType::StreamInput,
            Self::StreamOutput(_) => DescriptorType::StreamOutput,
            Self::JackInput(_) => DescriptorType::JackInput,
            Self::JackOutput(_) => DescriptorType::JackOutput,
            Self::AvbInterface(_) => DescriptorType::AvbInterface,
            Self::ClockSource(_) => DescriptorType::ClockSource,
            Self::ClockDomain(_) => DescriptorType::ClockDomain,
            Self::StreamPortInput(_) => DescriptorType::StreamPortInput,
            Self::StreamPortOutput(_) => DescriptorType::StreamPortOutput,
            Self::AudioCluster(_) => DescriptorType::AudioCluster,
            Self::AudioMap(_) => DescriptorType::AudioMap,
            Self::Control(_) => DescriptorType::Control,
            Self::SignalSelector(_) => DescriptorType::SignalSelector,
            Self::Mixer(_) => DescriptorType::Mixer,
            Self::Matrix(_) => DescriptorType::Matrix,
            Self::Locale(_) => DescriptorType::Locale,
            Self::Strings(_) => DescriptorType::Strings,
            Self::MemoryObject(_) => DescriptorType::MemoryObject,
        }
    }

    /// Serialize with the leading type/index words.
    pub fn encode(&self, index: u16) -> ModelResult<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(128);
        w.u16(self.descriptor_type().as_u16());
        w.u16(index);
        match self {
            Self::Entity(d) => d.encode_body(&mut w),
            Self::Configuration(d) => d.encode_body(&mut w),
            Self::AudioUnit(d) => d.encode_body(&mut w),
            Self::StreamInput(d) | Self::StreamOutput(d) => d.encode_body(&mut w),
            Self::JackInput(d) | Self::JackOutput(d) => d.encode_body(&mut w),
            Self::AvbInterface(d) => d.encode_body(&mut w),
            Self::ClockSource(d) => d.encode_body(&mut w),
            Self::ClockDomain(d) => d.encode_body(&mut w),
            Self::StreamPortInput(d) | Self::StreamPortOutput(d) => d.encode_body(&mut w),
            Self::AudioCluster(d) => d.encode_body(&mut w),
            Self::AudioMap(d) => d.encode_body(&mut w),
            Self::Control(d) => d.encode_body(&mut w),
            Self::SignalSelector(d) => d.encode_body(&mut w),
            Self::Mixer(d) => d.encode_body(&mut w),
            Self::Matrix(d) => d.encode_body(&mut w),
            Self::Locale(d) => d.encode_body(&mut w),
            Self::Strings(d) => d.encode_body(&mut w),
            Self::MemoryObject(d) => d.encode_body(&mut w),
        }
        if w.len() > DESCRIPTOR_MAX_LEN {
            return Err(ModelError::DescriptorTooLarge(w.len()));
        }
        Ok(w.into_vec())
    }

    /// Parse a serialized descriptor, returning its index alongside.
    pub fn decode(bytes: &[u8]) -> ModelResult<(u16, Self)> {
        let mut r = ByteReader::new(bytes);
        let type_code = r.u16()?;
        let index = r.u16()?;
        let descriptor_type = DescriptorType::from_u16(type_code)
            .ok_or(ModelError::UnknownDescriptorType(type_code))?;
        let descriptor = match descriptor_type {
            DescriptorType::Entity => Self::Entity(EntityDescriptor::decode_body(&mut r)?),
            DescriptorType::Configuration => {
                Self::Configuration(ConfigurationDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::AudioUnit => Self::AudioUnit(AudioUnitDescriptor::decode_body(&mut r)?),
            DescriptorType::StreamInput => {
                Self::StreamInput(StreamDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::StreamOutput => {
                Self::StreamOutput(StreamDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::JackInput => Self::JackInput(JackDescriptor::decode_body(&mut r)?),
            DescriptorType::JackOutput => Self::JackOutput(JackDescriptor::decode_body(&mut r)?),
            DescriptorType::AvbInterface => {
                Self::AvbInterface(AvbInterfaceDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::ClockSource => {
                Self::ClockSource(ClockSourceDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::ClockDomain => {
                Self::ClockDomain(ClockDomainDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::StreamPortInput => {
                Self::StreamPortInput(StreamPortDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::StreamPortOutput => {
                Self::StreamPortOutput(StreamPortDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::AudioCluster => {
                Self::AudioCluster(AudioClusterDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::AudioMap => Self::AudioMap(AudioMapDescriptor::decode_body(&mut r)?),
            DescriptorType::Control => Self::Control(ControlDescriptor::decode_body(&mut r)?),
            DescriptorType::SignalSelector => {
                Self::SignalSelector(SignalSelectorDescriptor::decode_body(&mut r)?)
            }
            DescriptorType::Mixer => Self::Mixer(MixerDescriptor::decode_body(&mut r)?),
            DescriptorType::Matrix => Self::Matrix(MatrixDescriptor::decode_body(&mut r)?),
            DescriptorType::Locale => Self::Locale(LocaleDescriptor::decode_body(&mut r)?),
            DescriptorType::Strings => Self::Strings(StringsDescriptor::decode_body(&mut r)?),
            DescriptorType::MemoryObject => {
                Self::MemoryObject(MemoryObjectDescriptor::decode_body(&mut r)?)
            }
            other => return Err(ModelError::UnknownDescriptorType(other.as_u16())),
        };
        Ok((index, descriptor))
    }
}
