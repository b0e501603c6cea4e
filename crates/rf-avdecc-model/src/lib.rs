//! AVDECC entity model
//!
//! The AEM side of the stack: typed descriptors with bit-exact codecs,
//! the per-entity descriptor store, and the dynamic state an entity
//! mutates at runtime (acquire/lock ownership, stream runtime records,
//! AVB interface info, available_index).
//!
//! The engine crate is the single writer; reads on the response path
//! serialize from a consistent snapshot with dynamic fields patched in.

pub mod builder;
pub mod descriptor;
pub mod dynamic;
pub mod error;
pub mod model;
pub mod store;

// Re-exports
pub use builder::EntityModelBuilder;
pub use descriptor::{
    AudioClusterDescriptor, AudioMapDescriptor, AudioMapping, AudioUnitDescriptor,
    AvbInterfaceDescriptor, BackupTalker, ClockDomainDescriptor, ClockSourceDescriptor,
    ConfigurationDescriptor, ControlDescriptor, Descriptor, DescriptorType, EntityDescriptor,
    JackDescriptor, LocaleDescriptor, MatrixDescriptor, MemoryObjectDescriptor, MixerDescriptor,
    SignalReference, SignalSelectorDescriptor, StreamDescriptor, StreamPortDescriptor,
    StringsDescriptor, DESCRIPTOR_MAX_LEN,
};
pub use dynamic::{AcquireState, AvbInterfaceRuntime, DynamicState, LockState, StreamRuntime};
pub use error::{ModelError, ModelResult};
pub use model::{stream_format_channels, EntityModel};
pub use store::DescriptorStore;
