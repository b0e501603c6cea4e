//! Entity model — descriptor store plus dynamic state
//!
//! The model owns everything the AEM engine reads or mutates. Reads on
//! the response path serialize from a consistent snapshot: the ENTITY
//! and stream descriptors are live-patched with the dynamic fields
//! (available_index, current configuration, current format) at encode
//! time, so READ_DESCRIPTOR always reflects what ADP advertises.

use log::warn;

use rf_avdecc_pdu::capabilities::EntityCapabilities;
use rf_avdecc_pdu::types::EntityId;

use crate::descriptor::{
    AudioMapping, ConfigurationDescriptor, Descriptor, DescriptorType, EntityDescriptor,
    DESCRIPTOR_MAX_LEN,
};
use crate::dynamic::{AcquireState, AvbInterfaceRuntime, DynamicState, LockState, StreamRuntime};
use crate::error::{ModelError, ModelResult};
use crate::store::DescriptorStore;

/// Channel width encoded in a stream format word (bits 47..32)
pub fn stream_format_channels(format: u64) -> u16 {
    ((format >> 32) & 0xFFFF) as u16
}

/// A local entity's complete model
#[derive(Debug, Clone)]
pub struct EntityModel {
    store: DescriptorStore,
    pub dynamic: DynamicState,
}

impl EntityModel {
    /// Build a model from a populated store. Validates the store
    /// invariants and derives the dynamic records from the current
    /// configuration.
    pub fn new(store: DescriptorStore) -> ModelResult<Self> {
        validate_store(&store)?;

        let entity = match store.get(DescriptorType::Entity, 0) {
            Some(Descriptor::Entity(e)) => e.clone(),
            _ => {
                return Err(ModelError::InvariantViolation(
                    "missing ENTITY descriptor".into(),
                ))
            }
        };

        let aem = entity
            .entity_capabilities
            .contains(EntityCapabilities::AEM_SUPPORTED);

        let mut dynamic = DynamicState {
            current_configuration: entity.current_configuration,
            available_index: entity.available_index,
            acquire: if aem {
                AcquireState::NotAcquired
            } else {
                AcquireState::NotSupported
            },
            lock: if aem {
                LockState::NotLocked
            } else {
                LockState::NotSupported
            },
            ..Default::default()
        };

        // Seed runtime records from the static descriptors.
        for index in 0..store.count_of(DescriptorType::StreamInput) {
            let mut runtime = StreamRuntime::default();
            if let Some(Descriptor::StreamInput(s)) = store.get(DescriptorType::StreamInput, index)
            {
                runtime.stream_format = s.current_format;
            }
            dynamic.stream_inputs.push(runtime);
        }
        for index in 0..store.count_of(DescriptorType::StreamOutput) {
            let mut runtime = StreamRuntime::default();
            if let Some(Descriptor::StreamOutput(s)) =
                store.get(DescriptorType::StreamOutput, index)
            {
                runtime.stream_format = s.current_format;
            }
            dynamic.stream_outputs.push(runtime);
        }
        for index in 0..store.count_of(DescriptorType::AvbInterface) {
            let mut runtime = AvbInterfaceRuntime::default();
            if let Some(Descriptor::AvbInterface(iface)) =
                store.get(DescriptorType::AvbInterface, index)
            {
                runtime.gptp_grandmaster_id = iface.clock_identity;
                runtime.gptp_domain_number = iface.domain_number;
            }
            dynamic.avb_interfaces.push(runtime);
        }

        Ok(Self { store, dynamic })
    }

    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn entity(&self) -> ModelResult<&EntityDescriptor> {
        match self.store.get(DescriptorType::Entity, 0) {
            Some(Descriptor::Entity(e)) => Ok(e),
            _ => Err(ModelError::NoSuchDescriptor {
                descriptor_type: DescriptorType::Entity.as_u16(),
                descriptor_index: 0,
            }),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity().map(|e| e.entity_id).unwrap_or_default()
    }

    pub fn configuration(&self, index: u16) -> ModelResult<&ConfigurationDescriptor> {
        match self.store.get(DescriptorType::Configuration, index) {
            Some(Descriptor::Configuration(c)) => Ok(c),
            _ => Err(ModelError::NoSuchDescriptor {
                descriptor_type: DescriptorType::Configuration.as_u16(),
                descriptor_index: index,
            }),
        }
    }

    /// (descriptor_type, count) pairs of the current configuration,
    /// in the order the enumeration sweep reads them.
    pub fn configuration_counts(&self) -> ModelResult<Vec<(DescriptorType, u16)>> {
        let config = self.configuration(self.dynamic.current_configuration)?;
        Ok(config
            .descriptor_counts
            .iter()
            .filter_map(|(t, c)| DescriptorType::from_u16(*t).map(|dt| (dt, *c)))
            .collect())
    }

    /// Change the active configuration. Bounds-checked against
    /// configurations_count.
    pub fn set_configuration(&mut self, index: u16) -> ModelResult<()> {
        let count = self.entity()?.configurations_count;
        if index >= count {
            return Err(ModelError::InvariantViolation(format!(
                "configuration {index} out of range ({count} configured)"
            )));
        }
        self.dynamic.current_configuration = index;
        Ok(())
    }

    /// Serialize a descriptor for READ_DESCRIPTOR, patching dynamic
    /// fields in.
    pub fn read_descriptor(
        &self,
        descriptor_type: DescriptorType,
        descriptor_index: u16,
    ) -> ModelResult<Vec<u8>> {
        match self.store.get(descriptor_type, descriptor_index) {
            Some(Descriptor::Entity(e)) => {
                let mut live = e.clone();
                live.available_index = self.dynamic.available_index;
                live.current_configuration = self.dynamic.current_configuration;
                Descriptor::Entity(live).encode(descriptor_index)
            }
            Some(Descriptor::StreamInput(s)) => {
                let mut live = s.clone();
                if let Some(rt) = self.dynamic.stream_inputs.get(descriptor_index as usize) {
                    live.current_format = rt.stream_format;
                }
                Descriptor::StreamInput(live).encode(descriptor_index)
            }
            Some(Descriptor::StreamOutput(s)) => {
                let mut live = s.clone();
                if let Some(rt) = self.dynamic.stream_outputs.get(descriptor_index as usize) {
                    live.current_format = rt.stream_format;
                }
                Descriptor::StreamOutput(live).encode(descriptor_index)
            }
            Some(other) => other.encode(descriptor_index),
            None => Err(ModelError::NoSuchDescriptor {
                descriptor_type: descriptor_type.as_u16(),
                descriptor_index,
            }),
        }
    }

    /// Runtime record of a stream endpoint, by descriptor type
    pub fn stream_runtime(
        &self,
        descriptor_type: DescriptorType,
        index: u16,
    ) -> Option<&StreamRuntime> {
        match descriptor_type {
            DescriptorType::StreamInput => self.dynamic.stream_inputs.get(index as usize),
            DescriptorType::StreamOutput => self.dynamic.stream_outputs.get(index as usize),
            _ => None,
        }
    }

    pub fn stream_runtime_mut(
        &mut self,
        descriptor_type: DescriptorType,
        index: u16,
    ) -> Option<&mut StreamRuntime> {
        match descriptor_type {
            DescriptorType::StreamInput => self.dynamic.stream_inputs.get_mut(index as usize),
            DescriptorType::StreamOutput => self.dynamic.stream_outputs.get_mut(index as usize),
            _ => None,
        }
    }

    /// Change a stream's format. The format must be one of the
    /// descriptor's supported formats when that list is present.
    pub fn set_stream_format(
        &mut self,
        descriptor_type: DescriptorType,
        index: u16,
        format: u64,
    ) -> ModelResult<()> {
        let descriptor = self.store.get_mut(descriptor_type, index).ok_or(
            ModelError::NoSuchDescriptor {
                descriptor_type: descriptor_type.as_u16(),
                descriptor_index: index,
            },
        )?;
        let stream = match descriptor {
            Descriptor::StreamInput(s) | Descriptor::StreamOutput(s) => s,
            _ => {
                return Err(ModelError::InvariantViolation(format!(
                    "descriptor {:#06x}[{index}] is not a stream",
                    descriptor_type.as_u16()
                )))
            }
        };
        if !stream.formats.is_empty() && !stream.formats.contains(&format) {
            return Err(ModelError::InvariantViolation(format!(
                "format {format:#018x} not in the supported set"
            )));
        }
        stream.current_format = format;
        if let Some(rt) = self.stream_runtime_mut(descriptor_type, index) {
            rt.stream_format = format;
        }
        Ok(())
    }

    /// Append mappings to an AUDIO_MAP, re-validating map invariants.
    /// On violation nothing is committed.
    pub fn add_audio_mappings(
        &mut self,
        map_index: u16,
        mappings: &[AudioMapping],
    ) -> ModelResult<()> {
        let current = match self.store.get(DescriptorType::AudioMap, map_index) {
            Some(Descriptor::AudioMap(m)) => m.clone(),
            _ => {
                return Err(ModelError::NoSuchDescriptor {
                    descriptor_type: DescriptorType::AudioMap.as_u16(),
                    descriptor_index: map_index,
                })
            }
        };
        let mut updated = current;
        updated.mappings.extend_from_slice(mappings);

        let encoded_len = 8 + updated.mappings.len() * AudioMapping::WIRE_LEN;
        if encoded_len > DESCRIPTOR_MAX_LEN {
            return Err(ModelError::DescriptorTooLarge(encoded_len));
        }
        for mapping in mappings {
            self.validate_mapping(mapping)?;
        }

        self.store
            .insert(map_index, Descriptor::AudioMap(updated));
        Ok(())
    }

    /// Remove mappings from an AUDIO_MAP. Unknown mappings are
    /// ignored.
    pub fn remove_audio_mappings(
        &mut self,
        map_index: u16,
        mappings: &[AudioMapping],
    ) -> ModelResult<()> {
        let descriptor = self.store.get_mut(DescriptorType::AudioMap, map_index);
        match descriptor {
            Some(Descriptor::AudioMap(map)) => {
                map.mappings.retain(|m| !mappings.contains(m));
                Ok(())
            }
            _ => Err(ModelError::NoSuchDescriptor {
                descriptor_type: DescriptorType::AudioMap.as_u16(),
                descriptor_index: map_index,
            }),
        }
    }

    fn validate_mapping(&self, mapping: &AudioMapping) -> ModelResult<()> {
        let inputs = self.store.count_of(DescriptorType::StreamInput);
        let outputs = self.store.count_of(DescriptorType::StreamOutput);
        if mapping.stream_index >= inputs.max(outputs) {
            return Err(ModelError::InvariantViolation(format!(
                "mapping references stream {} beyond the configured endpoints",
                mapping.stream_index
            )));
        }
        let clusters = self.store.count_of(DescriptorType::AudioCluster);
        if mapping.cluster_offset >= clusters {
            return Err(ModelError::InvariantViolation(format!(
                "mapping references cluster {} of {clusters}",
                mapping.cluster_offset
            )));
        }
        if let Some(Descriptor::AudioCluster(cluster)) = self
            .store
            .get(DescriptorType::AudioCluster, mapping.cluster_offset)
        {
            if mapping.cluster_channel >= cluster.channel_count {
                return Err(ModelError::InvariantViolation(format!(
                    "mapping channel {} beyond cluster width {}",
                    mapping.cluster_channel, cluster.channel_count
                )));
            }
        }
        Ok(())
    }
}

/// Store consistency checks run at model construction
fn validate_store(store: &DescriptorStore) -> ModelResult<()> {
    let entity = match store.get(DescriptorType::Entity, 0) {
        Some(Descriptor::Entity(e)) => e,
        _ => {
            return Err(ModelError::InvariantViolation(
                "exactly one ENTITY descriptor at index 0 is required".into(),
            ))
        }
    };
    if store.count_of(DescriptorType::Entity) != 1 {
        return Err(ModelError::InvariantViolation(
            "more than one ENTITY descriptor".into(),
        ));
    }

    let configurations = store.count_of(DescriptorType::Configuration);
    if entity.configurations_count != configurations {
        return Err(ModelError::InvariantViolation(format!(
            "ENTITY advertises {} configurations, store holds {configurations}",
            entity.configurations_count
        )));
    }
    if configurations == 0 {
        return Err(ModelError::InvariantViolation(
            "at least one CONFIGURATION descriptor is required".into(),
        ));
    }
    if entity.current_configuration >= configurations {
        return Err(ModelError::InvariantViolation(format!(
            "current_configuration {} out of range",
            entity.current_configuration
        )));
    }

    // Every advertised count maps to contiguous descriptors 0..count.
    for config_index in 0..configurations {
        let config = match store.get(DescriptorType::Configuration, config_index) {
            Some(Descriptor::Configuration(c)) => c,
            _ => continue,
        };
        for (type_code, count) in &config.descriptor_counts {
            let Some(descriptor_type) = DescriptorType::from_u16(*type_code) else {
                warn!("configuration {config_index} counts unknown descriptor type {type_code:#06x}");
                continue;
            };
            for index in 0..*count {
                if !store.contains(descriptor_type, index) {
                    return Err(ModelError::InvariantViolation(format!(
                        "configuration {config_index} advertises {count} of type {type_code:#06x} \
                         but index {index} is missing"
                    )));
                }
            }
        }
    }

    // Stream descriptors must reference a real AVB interface, and
    // cluster widths must fit the stream formats they feed.
    let interfaces = store.count_of(DescriptorType::AvbInterface);
    let mut max_stream_width: u16 = 0;
    for descriptor_type in [DescriptorType::StreamInput, DescriptorType::StreamOutput] {
        for index in 0..store.count_of(descriptor_type) {
            if let Some(Descriptor::StreamInput(s) | Descriptor::StreamOutput(s)) =
                store.get(descriptor_type, index)
            {
                if s.avb_interface_index >= interfaces {
                    return Err(ModelError::InvariantViolation(format!(
                        "stream {:#06x}[{index}] references AVB interface {} of {interfaces}",
                        descriptor_type.as_u16(),
                        s.avb_interface_index
                    )));
                }
                max_stream_width = max_stream_width.max(stream_format_channels(s.current_format));
            }
        }
    }
    if max_stream_width > 0 {
        for index in 0..store.count_of(DescriptorType::AudioCluster) {
            if let Some(Descriptor::AudioCluster(cluster)) =
                store.get(DescriptorType::AudioCluster, index)
            {
                if cluster.channel_count > max_stream_width {
                    return Err(ModelError::InvariantViolation(format!(
                        "cluster {index} is {} channels wide, streams carry at most {max_stream_width}",
                        cluster.channel_count
                    )));
                }
            }
        }
    }

    Ok(())
}
