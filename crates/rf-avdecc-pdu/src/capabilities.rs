//! Capability and flag words
//!
//! Bit positions follow the IEEE 1722.1 wire layouts. The words travel
//! as big-endian integers; all masks below are values of the decoded
//! integer, not octet positions.

use bitflags::bitflags;

bitflags! {
    /// ADP / ENTITY descriptor entity_capabilities (32 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityCapabilities: u32 {
        const EFU_MODE                          = 1 << 0;
        const ADDRESS_ACCESS_SUPPORTED          = 1 << 1;
        const GATEWAY_ENTITY                    = 1 << 2;
        const AEM_SUPPORTED                     = 1 << 3;
        const LEGACY_AVC                        = 1 << 4;
        const ASSOCIATION_ID_SUPPORTED          = 1 << 5;
        const ASSOCIATION_ID_VALID              = 1 << 6;
        const VENDOR_UNIQUE_SUPPORTED           = 1 << 7;
        const CLASS_A_SUPPORTED                 = 1 << 8;
        const CLASS_B_SUPPORTED                 = 1 << 9;
        const GPTP_SUPPORTED                    = 1 << 10;
        const AEM_AUTHENTICATION_SUPPORTED      = 1 << 11;
        const AEM_AUTHENTICATION_REQUIRED       = 1 << 12;
        const AEM_PERSISTENT_ACQUIRE_SUPPORTED  = 1 << 13;
        const AEM_IDENTIFY_CONTROL_INDEX_VALID  = 1 << 14;
        const AEM_INTERFACE_INDEX_VALID         = 1 << 15;
        const GENERAL_CONTROLLER_IGNORE         = 1 << 16;
        const ENTITY_NOT_READY                  = 1 << 17;
    }
}

bitflags! {
    /// ADP / ENTITY descriptor talker_capabilities (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TalkerCapabilities: u16 {
        const IMPLEMENTED        = 0x0001;
        const OTHER_SOURCE       = 0x0200;
        const CONTROL_SOURCE     = 0x0400;
        const MEDIA_CLOCK_SOURCE = 0x0800;
        const SMPTE_SOURCE       = 0x1000;
        const MIDI_SOURCE        = 0x2000;
        const AUDIO_SOURCE       = 0x4000;
        const VIDEO_SOURCE       = 0x8000;
    }
}

bitflags! {
    /// ADP / ENTITY descriptor listener_capabilities (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ListenerCapabilities: u16 {
        const IMPLEMENTED      = 0x0001;
        const OTHER_SINK       = 0x0200;
        const CONTROL_SINK     = 0x0400;
        const MEDIA_CLOCK_SINK = 0x0800;
        const SMPTE_SINK       = 0x1000;
        const MIDI_SINK        = 0x2000;
        const AUDIO_SINK       = 0x4000;
        const VIDEO_SINK       = 0x8000;
    }
}

bitflags! {
    /// ADP / ENTITY descriptor controller_capabilities (32 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControllerCapabilities: u32 {
        const IMPLEMENTED = 1 << 0;
    }
}

bitflags! {
    /// ACMP flags word (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConnectionFlags: u16 {
        const CLASS_B            = 0x0001;
        const FAST_CONNECT       = 0x0002;
        const SAVED_STATE        = 0x0004;
        const STREAMING_WAIT     = 0x0008;
        const SUPPORTS_ENCRYPTED = 0x0010;
        const ENCRYPTED_PDU      = 0x0020;
        const TALKER_FAILED      = 0x0040;
    }
}

bitflags! {
    /// GET/SET_STREAM_INFO flags word (32 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamInfoFlags: u32 {
        const CLASS_B              = 0x0000_0001;
        const FAST_CONNECT         = 0x0000_0002;
        const SAVED_STATE          = 0x0000_0004;
        const STREAMING_WAIT       = 0x0000_0008;
        const SUPPORTS_ENCRYPTED   = 0x0000_0010;
        const ENCRYPTED_PDU        = 0x0000_0020;
        const TALKER_FAILED        = 0x0000_0040;
        const STREAM_VLAN_ID_VALID = 0x0200_0000;
        const CONNECTED            = 0x0400_0000;
        const MSRP_FAILURE_VALID   = 0x0800_0000;
        const STREAM_DEST_MAC_VALID = 0x1000_0000;
        const MSRP_ACC_LAT_VALID   = 0x2000_0000;
        const STREAM_ID_VALID      = 0x4000_0000;
        const STREAM_FORMAT_VALID  = 0x8000_0000;
    }
}

bitflags! {
    /// GET_AVB_INFO flags octet
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AvbInfoFlags: u8 {
        const AS_CAPABLE   = 0x01;
        const GPTP_ENABLED = 0x02;
        const SRP_ENABLED  = 0x04;
    }
}

bitflags! {
    /// STREAM_INPUT/OUTPUT descriptor stream_flags (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamDescriptorFlags: u16 {
        const CLOCK_SYNC_SOURCE          = 0x0001;
        const CLASS_A                    = 0x0002;
        const CLASS_B                    = 0x0004;
        const SUPPORTS_ENCRYPTED         = 0x0008;
        const PRIMARY_BACKUP_SUPPORTED   = 0x0010;
        const PRIMARY_BACKUP_VALID       = 0x0020;
        const SECONDARY_BACKUP_SUPPORTED = 0x0040;
        const SECONDARY_BACKUP_VALID     = 0x0080;
        const TERTIARY_BACKUP_SUPPORTED  = 0x0100;
        const TERTIARY_BACKUP_VALID      = 0x0200;
    }
}

bitflags! {
    /// JACK_INPUT/OUTPUT descriptor jack_flags (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JackFlags: u16 {
        const CLIP_PROTECT = 0x0001;
        const CAPTIVE      = 0x0002;
    }
}

bitflags! {
    /// AVB_INTERFACE descriptor interface_flags (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AvbInterfaceFlags: u16 {
        const GPTP_GRANDMASTER_SUPPORTED = 0x0001;
        const GPTP_SUPPORTED             = 0x0002;
        const SRP_SUPPORTED              = 0x0004;
    }
}

bitflags! {
    /// STREAM_PORT descriptor port_flags (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortFlags: u16 {
        const CLOCK_SYNC_SOURCE       = 0x0001;
        const ASYNC_SAMPLE_RATE_CONV  = 0x0002;
        const SYNC_SAMPLE_RATE_CONV   = 0x0004;
    }
}

bitflags! {
    /// CLOCK_SOURCE descriptor clock_source_flags (16 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClockSourceFlags: u16 {
        const STREAM_ID = 0x0001;
        const LOCAL_ID  = 0x0002;
    }
}

/// ACQUIRE_ENTITY flags word (32 bits)
pub mod acquire_flags {
    pub const PERSISTENT: u32 = 0x0000_0001;
    pub const RELEASE: u32 = 0x8000_0000;
}

/// LOCK_ENTITY flags word (32 bits)
pub mod lock_flags {
    pub const UNLOCK: u32 = 0x0000_0001;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_capabilities_bits() {
        assert_eq!(EntityCapabilities::AEM_SUPPORTED.bits(), 0x0000_0008);
        assert_eq!(EntityCapabilities::GPTP_SUPPORTED.bits(), 0x0000_0400);
        assert_eq!(
            EntityCapabilities::AEM_PERSISTENT_ACQUIRE_SUPPORTED.bits(),
            0x0000_2000
        );
    }

    #[test]
    fn test_talker_capabilities_implemented_is_lsb() {
        assert_eq!(TalkerCapabilities::IMPLEMENTED.bits(), 0x0001);
        assert_eq!(TalkerCapabilities::AUDIO_SOURCE.bits(), 0x4000);
    }

    #[test]
    fn test_unknown_bits_survive_roundtrip() {
        // Reserved bits set by a newer peer must not be stripped.
        let caps = EntityCapabilities::from_bits_retain(0xF000_0000 | 0x8);
        assert_eq!(caps.bits(), 0xF000_0008);
        assert!(caps.contains(EntityCapabilities::AEM_SUPPORTED));
    }
}
