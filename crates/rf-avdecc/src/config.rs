//! Engine configuration
//!
//! Defaults follow the protocol timing constants; everything is
//! overridable for test rigs and unusual network conditions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and capacity knobs for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period between ENTITY_AVAILABLE advertisements (ms)
    pub advertise_interval_ms: u64,

    /// Advertised validity window in seconds; halved on the wire
    pub valid_time_secs: u32,

    /// Period between ENTITY_DISCOVERY_REQUEST emissions (ms)
    pub discovery_interval_ms: u64,

    /// ACMP controller command timeout (ms)
    pub acmp_timeout_ms: u64,

    /// ACMP retries after the first attempt
    pub acmp_retries: u8,

    /// AECP controller command timeout (ms)
    pub aecp_timeout_ms: u64,

    /// AECP retries after the first attempt
    pub aecp_retries: u8,

    /// LOCK_ENTITY expiry with no locker activity (ms)
    pub lock_timeout_ms: u64,

    /// Scheduler tick period (ms)
    pub tick_interval_ms: u64,

    /// Bounded send queue depth
    pub send_queue_capacity: usize,

    /// Bounded inflight table depth per protocol
    pub inflight_capacity: usize,

    /// VLAN id assigned to newly connected streams
    pub stream_vlan_id: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            advertise_interval_ms: 2_000,
            valid_time_secs: 62,
            discovery_interval_ms: 2_000,
            acmp_timeout_ms: 500,
            acmp_retries: 1,
            aecp_timeout_ms: 250,
            aecp_retries: 2,
            lock_timeout_ms: 60_000,
            tick_interval_ms: 10,
            send_queue_capacity: 128,
            inflight_capacity: 256,
            stream_vlan_id: 2,
        }
    }
}

impl EngineConfig {
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn acmp_timeout(&self) -> Duration {
        Duration::from_millis(self.acmp_timeout_ms)
    }

    pub fn aecp_timeout(&self) -> Duration {
        Duration::from_millis(self.aecp_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Wire encoding of the validity window: ceil(seconds / 2),
    /// clamped to the 5-bit field (1..=31).
    pub fn wire_valid_time(&self) -> u8 {
        (self.valid_time_secs.div_ceil(2)).clamp(1, 31) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.advertise_interval(), Duration::from_secs(2));
        assert_eq!(config.acmp_timeout(), Duration::from_millis(500));
        assert_eq!(config.aecp_timeout(), Duration::from_millis(250));
        assert_eq!(config.acmp_retries, 1);
        assert_eq!(config.aecp_retries, 2);
        assert_eq!(config.wire_valid_time(), 31);
    }

    #[test]
    fn test_wire_valid_time_rounds_up_and_clamps() {
        let mut config = EngineConfig {
            valid_time_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.wire_valid_time(), 3);
        config.valid_time_secs = 1;
        assert_eq!(config.wire_valid_time(), 1);
        config.valid_time_secs = 0;
        assert_eq!(config.wire_valid_time(), 1);
        config.valid_time_secs = 600;
        assert_eq!(config.wire_valid_time(), 31);
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = r#"{
            "advertise_interval_ms": 1000,
            "valid_time_secs": 10,
            "discovery_interval_ms": 2000,
            "acmp_timeout_ms": 200,
            "acmp_retries": 2,
            "aecp_timeout_ms": 100,
            "aecp_retries": 1,
            "lock_timeout_ms": 30000,
            "tick_interval_ms": 5,
            "send_queue_capacity": 64,
            "inflight_capacity": 128,
            "stream_vlan_id": 2
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.advertise_interval_ms, 1000);
        assert_eq!(config.wire_valid_time(), 5);
    }
}
