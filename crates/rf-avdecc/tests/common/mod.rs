//! Shared test rig: an in-memory multicast bus, entity model
//! fixtures, and tick-pumping helpers driving several engines on one
//! manual clock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use rf_avdecc::{Engine, EngineConfig, ManualClock, NetworkInterface, SendError};
use rf_avdecc_model::{
    AudioClusterDescriptor, AudioMapDescriptor, AvbInterfaceDescriptor, ClockDomainDescriptor,
    ClockSourceDescriptor, Descriptor, EntityDescriptor, EntityModel, EntityModelBuilder,
    StreamDescriptor,
};
use rf_avdecc_pdu::capabilities::{
    ControllerCapabilities, EntityCapabilities, ListenerCapabilities, TalkerCapabilities,
};
use rf_avdecc_pdu::{EntityId, EntityModelId, MacAddress};

pub type TestEngine = Engine<BusEndpoint, ManualClock>;

// ═══════════════════════════════════════════════════════════════════════════════
// LOOPBACK BUS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct BusInner {
    queues: Vec<VecDeque<Vec<u8>>>,
}

/// Multicast segment: every frame reaches every endpoint but the
/// sender.
#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<Mutex<BusInner>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, mac: [u8; 6]) -> BusEndpoint {
        let mut inner = self.inner.lock();
        inner.queues.push(VecDeque::new());
        BusEndpoint {
            inner: Arc::clone(&self.inner),
            index: inner.queues.len() - 1,
            mac: MacAddress(mac),
        }
    }
}

pub struct BusEndpoint {
    inner: Arc<Mutex<BusInner>>,
    index: usize,
    mac: MacAddress,
}

impl NetworkInterface for BusEndpoint {
    fn send(&mut self, _dest: MacAddress, frame: &[u8]) -> Result<(), SendError> {
        let mut inner = self.inner.lock();
        for (i, queue) in inner.queues.iter_mut().enumerate() {
            if i != self.index {
                queue.push_back(frame.to_vec());
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.inner.lock().queues[self.index].pop_front()
    }

    fn local_mac(&self) -> MacAddress {
        self.mac
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODEL FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// A stream format word carrying the given channel width
pub fn stream_format(channels: u16) -> u64 {
    0x0205_0000_0040_0000 | (u64::from(channels) << 32)
}

fn stream(name: &str) -> StreamDescriptor {
    StreamDescriptor {
        object_name: name.into(),
        current_format: stream_format(8),
        formats: vec![stream_format(8), stream_format(2)],
        avb_interface_index: 0,
        ..Default::default()
    }
}

/// Two-in/two-out AVB audio endpoint with a secondary configuration
pub fn audio_entity(entity_id: u64) -> EntityModel {
    let entity = EntityDescriptor {
        entity_id: EntityId(entity_id),
        entity_model_id: EntityModelId(0x1001_0203_0405_0607),
        entity_capabilities: EntityCapabilities::AEM_SUPPORTED
            | EntityCapabilities::CLASS_A_SUPPORTED
            | EntityCapabilities::GPTP_SUPPORTED,
        talker_stream_sources: 2,
        talker_capabilities: TalkerCapabilities::IMPLEMENTED | TalkerCapabilities::AUDIO_SOURCE,
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
        .configuration("Main")
        .add(Descriptor::StreamInput(stream("Input 0")))
        .add(Descriptor::StreamInput(stream("Input 1")))
        .add(Descriptor::StreamOutput(stream("Output 0")))
        .add(Descriptor::StreamOutput(stream("Output 1")))
        .add(Descriptor::AvbInterface(AvbInterfaceDescriptor {
            object_name: "eth0".into(),
            mac_address: MacAddress([0x00, 0x22, 0x97, 0x00, 0x00, 0x01]),
            clock_identity: EntityId(0x0022_9700_FFFE_0001),
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
        .add(Descriptor::AudioCluster(AudioClusterDescriptor {
            object_name: "Main".into(),
            channel_count: 8,
            format: 0x40,
            ..Default::default()
        }))
        .add(Descriptor::AudioMap(AudioMapDescriptor::default()))
        .configuration("Secondary");
    builder.build().expect("fixture model must validate")
}

/// Controller-only entity: no streams, just the controller capability
pub fn controller_entity(entity_id: u64) -> EntityModel {
    let entity = EntityDescriptor {
        entity_id: EntityId(entity_id),
        entity_model_id: EntityModelId(0x1001_0203_0405_0999),
        entity_capabilities: EntityCapabilities::AEM_SUPPORTED,
        controller_capabilities: ControllerCapabilities::IMPLEMENTED,
        entity_name: "Console".into(),
        ..Default::default()
    };
    let mut builder = EntityModelBuilder::new(entity);
    builder.configuration("Main");
    builder.build().expect("fixture model must validate")
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE RIG
// ═══════════════════════════════════════════════════════════════════════════════

pub fn engine_on(
    bus: &Bus,
    clock: &ManualClock,
    model: EntityModel,
    mac_tail: u8,
) -> (TestEngine, rf_avdecc::Handle) {
    let _ = env_logger::builder().is_test(true).try_init();
    let net = bus.endpoint([0x02, 0x00, 0x00, 0x00, 0x00, mac_tail]);
    Engine::new(model, EngineConfig::default(), net, clock.clone())
}

pub fn engine_with_config(
    bus: &Bus,
    clock: &ManualClock,
    model: EntityModel,
    mac_tail: u8,
    config: EngineConfig,
) -> (TestEngine, rf_avdecc::Handle) {
    let net = bus.endpoint([0x02, 0x00, 0x00, 0x00, 0x00, mac_tail]);
    Engine::new(model, config, net, clock.clone())
}

/// Tick every engine `rounds` times at the current instant.
pub fn pump(engines: &mut [&mut TestEngine], clock: &ManualClock, rounds: usize) {
    for _ in 0..rounds {
        for engine in engines.iter_mut() {
            engine.tick(clock.now()).expect("tick must not fail");
        }
    }
}

/// Advance the clock in tick-sized steps, pumping every engine each
/// step.
pub fn run_for(engines: &mut [&mut TestEngine], clock: &ManualClock, total: Duration) {
    let step = Duration::from_millis(10);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        clock.advance(step);
        elapsed += step;
        for engine in engines.iter_mut() {
            engine.tick(clock.now()).expect("tick must not fail");
        }
    }
}

/// Drain every queued event from a handle.
pub fn drain_events(handle: &rf_avdecc::Handle) -> Vec<rf_avdecc::EngineEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.try_event() {
        events.push(event);
    }
    events
}
