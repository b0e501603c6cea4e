//! Descriptor store
//!
//! Typed descriptors keyed by (type, index). Single-writer: all
//! mutations happen on the engine thread, through the AEM engine or
//! the boot-time model build.

use std::collections::HashMap;

use crate::descriptor::{Descriptor, DescriptorType};
use crate::error::{ModelError, ModelResult};

/// Per-type, per-index descriptor table
#[derive(Debug, Clone, Default)]
pub struct DescriptorStore {
    entries: HashMap<(DescriptorType, u16), Descriptor>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u16, descriptor: Descriptor) {
        self.entries
            .insert((descriptor.descriptor_type(), index), descriptor);
    }

    pub fn get(&self, descriptor_type: DescriptorType, index: u16) -> Option<&Descriptor> {
        self.entries.get(&(descriptor_type, index))
    }

    pub fn get_mut(
        &mut self,
        descriptor_type: DescriptorType,
        index: u16,
    ) -> Option<&mut Descriptor> {
        self.entries.get_mut(&(descriptor_type, index))
    }

    pub fn contains(&self, descriptor_type: DescriptorType, index: u16) -> bool {
        self.entries.contains_key(&(descriptor_type, index))
    }

    /// Serialized descriptor bytes, exactly as READ_DESCRIPTOR returns
    /// them.
    pub fn get_raw(&self, descriptor_type: DescriptorType, index: u16) -> ModelResult<Vec<u8>> {
        self.get(descriptor_type, index)
            .ok_or(ModelError::NoSuchDescriptor {
                descriptor_type: descriptor_type.as_u16(),
                descriptor_index: index,
            })?
            .encode(index)
    }

    /// Decode, validate and store serialized descriptor bytes.
    pub fn put_raw(&mut self, bytes: &[u8]) -> ModelResult<()> {
        if bytes.len() > crate::descriptor::DESCRIPTOR_MAX_LEN {
            return Err(ModelError::DescriptorTooLarge(bytes.len()));
        }
        let (index, descriptor) = Descriptor::decode(bytes)?;
        self.insert(index, descriptor);
        Ok(())
    }

    /// Number of stored descriptors of one type
    pub fn count_of(&self, descriptor_type: DescriptorType) -> u16 {
        self.entries
            .keys()
            .filter(|(t, _)| *t == descriptor_type)
            .count() as u16
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(DescriptorType, u16), &Descriptor)> + '_ {
        self.entries.iter()
    }
}
