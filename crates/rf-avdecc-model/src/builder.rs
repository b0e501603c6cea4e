//! Entity model builder
//!
//! Assembles a descriptor store configuration by configuration,
//! assigning contiguous per-type indices and filling in the
//! CONFIGURATION descriptor counts and the ENTITY configuration count
//! so the store invariants hold by construction.

use std::collections::HashMap;

use crate::descriptor::{
    ConfigurationDescriptor, Descriptor, DescriptorType, EntityDescriptor,
};
use crate::error::{ModelError, ModelResult};
use crate::model::EntityModel;
use crate::store::DescriptorStore;

/// Builder for [`EntityModel`]
pub struct EntityModelBuilder {
    entity: EntityDescriptor,
    store: DescriptorStore,
    configurations: Vec<ConfigurationDescriptor>,
    next_index: HashMap<DescriptorType, u16>,
}

impl EntityModelBuilder {
    pub fn new(entity: EntityDescriptor) -> Self {
        Self {
            entity,
            store: DescriptorStore::new(),
            configurations: Vec::new(),
            next_index: HashMap::new(),
        }
    }

    /// Open a new configuration; subsequent [`add`](Self::add) calls
    /// count against it.
    pub fn configuration(&mut self, name: &str) -> &mut Self {
        self.configurations.push(ConfigurationDescriptor {
            object_name: name.to_string(),
            localized_description: 0xFFFF,
            descriptor_counts: Vec::new(),
        });
        self
    }

    /// Add a descriptor to the current configuration. Indices are
    /// assigned per type in insertion order.
    pub fn add(&mut self, descriptor: Descriptor) -> &mut Self {
        let descriptor_type = descriptor.descriptor_type();
        let index = self.next_index.entry(descriptor_type).or_insert(0);
        self.store.insert(*index, descriptor);
        *index += 1;

        if let Some(config) = self.configurations.last_mut() {
            let code = descriptor_type.as_u16();
            match config
                .descriptor_counts
                .iter_mut()
                .find(|(t, _)| *t == code)
            {
                Some((_, count)) => *count += 1,
                None => config.descriptor_counts.push((code, 1)),
            }
        }
        self
    }

    /// Finalize: writes the CONFIGURATION descriptors and the ENTITY
    /// descriptor, then validates the assembled store.
    pub fn build(mut self) -> ModelResult<EntityModel> {
        if self.configurations.is_empty() {
            return Err(ModelError::InvariantViolation(
                "a model needs at least one configuration".into(),
            ));
        }
        for (index, config) in self.configurations.iter().enumerate() {
            self.store
                .insert(index as u16, Descriptor::Configuration(config.clone()));
        }
        self.entity.configurations_count = self.configurations.len() as u16;
        if self.entity.current_configuration >= self.entity.configurations_count {
            self.entity.current_configuration = 0;
        }
        self.store.insert(0, Descriptor::Entity(self.entity));
        EntityModel::new(self.store)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::descriptor::{
        AudioClusterDescriptor, AudioMapDescriptor, AudioUnitDescriptor, AvbInterfaceDescriptor,
        ClockDomainDescriptor, ClockSourceDescriptor, JackDescriptor, LocaleDescriptor,
        StreamDescriptor, StreamPortDescriptor, StringsDescriptor,
    };
    use rf_avdecc_pdu::capabilities::{
        EntityCapabilities, ListenerCapabilities, TalkerCapabilities,
    };
    use rf_avdecc_pdu::types::{EntityId, EntityModelId, MacAddress};

    /// A stream format word with the given channel width
    pub(crate) fn aaf_format(channels: u16) -> u64 {
        0x0205_0000_0040_0000 | ((channels as u64) << 32)
    }

    fn stream(name: &str, channels: u16) -> StreamDescriptor {
        StreamDescriptor {
            object_name: name.into(),
            current_format: aaf_format(channels),
            formats: vec![aaf_format(channels), aaf_format(2)],
            avb_interface_index: 0,
            ..Default::default()
        }
    }

    /// Shared fixture: a two-in two-out AVB audio interface
    pub(crate) fn example_model() -> EntityModel {
        let entity = EntityDescriptor {
            entity_id: EntityId(0x0001020304050607),
            entity_model_id: EntityModelId(0x1001020304050607),
            entity_capabilities: EntityCapabilities::AEM_SUPPORTED
                | EntityCapabilities::CLASS_A_SUPPORTED
                | EntityCapabilities::GPTP_SUPPORTED,
            talker_stream_sources: 2,
            talker_capabilities: TalkerCapabilities::IMPLEMENTED
                | TalkerCapabilities::AUDIO_SOURCE,
            listener_stream_sinks: 2,
            listener_capabilities: ListenerCapabilities::IMPLEMENTED
                | ListenerCapabilities::AUDIO_SINK,
            entity_name: "Stage Box 16".into(),
            firmware_version: "1.4.2".into(),
            serial_number: "RF-000123".into(),
            ..Default::default()
        };

        let mut builder = EntityModelBuilder::new(entity);
        builder
            .configuration("Default")
            .add(Descriptor::AudioUnit(AudioUnitDescriptor {
                object_name: "Audio Unit".into(),
                number_of_stream_input_ports: 1,
                number_of_stream_output_ports: 1,
                current_sampling_rate: 48_000,
                sampling_rates: vec![44_100, 48_000, 96_000],
                ..Default::default()
            }))
            .add(Descriptor::StreamInput(stream("Input 0", 8)))
            .add(Descriptor::StreamInput(stream("Input 1", 8)))
            .add(Descriptor::StreamOutput(stream("Output 0", 8)))
            .add(Descriptor::StreamOutput(stream("Output 1", 8)))
            .add(Descriptor::AvbInterface(AvbInterfaceDescriptor {
                object_name: "eth0".into(),
                mac_address: MacAddress([0x00, 0x22, 0x97, 0x00, 0x00, 0x01]),
                clock_identity: EntityId(0x00229700FFFE0001),
                ..Default::default()
            }))
            .add(Descriptor::ClockSource(ClockSourceDescriptor {
                object_name: "Internal".into(),
                ..Default::default()
            }))
            .add(Descriptor::ClockDomain(ClockDomainDescriptor {
                object_name: "Domain 0".into(),
                clock_sources: vec![0],
                ..Default::default()
            }))
            .add(Descriptor::StreamPortInput(StreamPortDescriptor {
                number_of_clusters: 1,
                number_of_maps: 1,
                ..Default::default()
            }))
            .add(Descriptor::StreamPortOutput(StreamPortDescriptor {
                ..Default::default()
            }))
            .add(Descriptor::AudioCluster(AudioClusterDescriptor {
                object_name: "Main".into(),
                channel_count: 8,
                format: 0x40,
                ..Default::default()
            }))
            .add(Descriptor::AudioMap(AudioMapDescriptor::default()))
            .add(Descriptor::JackInput(JackDescriptor {
                object_name: "XLR In".into(),
                ..Default::default()
            }))
            .add(Descriptor::JackOutput(JackDescriptor {
                object_name: "XLR Out".into(),
                ..Default::default()
            }))
            .add(Descriptor::Locale(LocaleDescriptor {
                locale_identifier: "en-US".into(),
                number_of_strings: 1,
                base_strings: 0,
            }))
            .add(Descriptor::Strings(StringsDescriptor::default()));
        builder.build().expect("example model must validate")
    }

    #[test]
    fn test_builder_assigns_contiguous_indices() {
        let model = example_model();
        assert!(model.store().contains(DescriptorType::StreamInput, 0));
        assert!(model.store().contains(DescriptorType::StreamInput, 1));
        assert!(!model.store().contains(DescriptorType::StreamInput, 2));
    }

    #[test]
    fn test_builder_fills_configuration_counts() {
        let model = example_model();
        let counts = model.configuration_counts().unwrap();
        let streams = counts
            .iter()
            .find(|(t, _)| *t == DescriptorType::StreamInput)
            .map(|(_, c)| *c);
        assert_eq!(streams, Some(2));
        assert_eq!(model.entity().unwrap().configurations_count, 1);
    }

    #[test]
    fn test_builder_requires_a_configuration() {
        let builder = EntityModelBuilder::new(EntityDescriptor::default());
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_builder_seeds_runtime_records() {
        let model = example_model();
        assert_eq!(model.dynamic.stream_inputs.len(), 2);
        assert_eq!(model.dynamic.stream_outputs.len(), 2);
        assert_eq!(model.dynamic.avb_interfaces.len(), 1);
        assert_eq!(
            model.dynamic.stream_inputs[0].stream_format,
            aaf_format(8)
        );
        assert_eq!(
            model.dynamic.avb_interfaces[0].gptp_grandmaster_id,
            EntityId(0x00229700FFFE0001)
        );
    }
}
