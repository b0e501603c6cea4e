//! Dynamic (per-boot) entity state
//!
//! Everything an entity mutates at runtime lives here, next to but
//! separate from the static descriptor store: acquisition/lock
//! ownership, per-stream runtime records, per-interface AVB info and
//! the advertised available_index.

use std::time::Instant;

use rf_avdecc_pdu::capabilities::{AvbInfoFlags, StreamInfoFlags};
use rf_avdecc_pdu::types::{EntityId, MacAddress, StreamId};

/// Controller ownership of the entity (ACQUIRE_ENTITY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireState {
    /// Entity does not implement AEM acquisition
    NotSupported,
    #[default]
    NotAcquired,
    Acquired {
        controller: EntityId,
        persistent: bool,
    },
}

impl AcquireState {
    pub fn owner(&self) -> Option<EntityId> {
        match self {
            Self::Acquired { controller, .. } => Some(*controller),
            _ => None,
        }
    }
}

/// Time-bounded exclusive hold on the entity (LOCK_ENTITY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    NotSupported,
    #[default]
    NotLocked,
    Locked {
        controller: EntityId,
        expires_at: Instant,
    },
}

impl LockState {
    pub fn holder(&self) -> Option<EntityId> {
        match self {
            Self::Locked { controller, .. } => Some(*controller),
            _ => None,
        }
    }
}

/// Runtime record for one stream input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamRuntime {
    pub flags: StreamInfoFlags,
    pub stream_format: u64,
    pub stream_id: StreamId,
    pub msrp_accumulated_latency: u32,
    pub stream_dest_mac: MacAddress,
    pub msrp_failure_code: u8,
    pub msrp_failure_bridge_id: u64,
    pub stream_vlan_id: u16,
    pub streaming_active: bool,
}

/// Runtime record for one AVB interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvbInterfaceRuntime {
    pub gptp_grandmaster_id: EntityId,
    pub propagation_delay: u32,
    pub gptp_domain_number: u8,
    pub flags: AvbInfoFlags,
}

/// All mutable state of a local entity
#[derive(Debug, Clone, Default)]
pub struct DynamicState {
    pub current_configuration: u16,
    /// Monotonically non-decreasing within a boot session
    pub available_index: u32,
    pub acquire: AcquireState,
    pub lock: LockState,
    pub stream_inputs: Vec<StreamRuntime>,
    pub stream_outputs: Vec<StreamRuntime>,
    pub avb_interfaces: Vec<AvbInterfaceRuntime>,
}

impl DynamicState {
    /// Increment available_index by exactly one. Called once per
    /// observable state change, never by periodic readvertisement.
    pub fn bump_available_index(&mut self) {
        self.available_index = self.available_index.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_owner() {
        let state = AcquireState::Acquired {
            controller: EntityId(0x11),
            persistent: false,
        };
        assert_eq!(state.owner(), Some(EntityId(0x11)));
        assert_eq!(AcquireState::NotAcquired.owner(), None);
    }

    #[test]
    fn test_bump_available_index() {
        let mut dynamic = DynamicState {
            available_index: 5,
            ..Default::default()
        };
        dynamic.bump_available_index();
        assert_eq!(dynamic.available_index, 6);
    }
}
