//! End-to-end enumeration: a controller walks a freshly discovered
//! entity through the full pipeline and ends up with its model.

mod common;

use common::*;
use rf_avdecc::{EngineEvent, ManualClock};
use rf_avdecc_model::DescriptorType;
use rf_avdecc_pdu::EntityId;

const DEVICE: u64 = 0x0001_0203_0405_0607;
const CONSOLE: u64 = 0x1111_1111_1111_1111;

#[test]
fn test_full_enumeration_pipeline() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut device, _d) = engine_on(&bus, &clock, audio_entity(DEVICE), 1);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 2);

    device.start(clock.now());
    console.start(clock.now());
    pump(&mut [&mut device, &mut console], &clock, 2);
    assert!(drain_events(&console_handle)
        .contains(&EngineEvent::EntityDiscovered(EntityId(DEVICE))));

    console_handle.enumerate(EntityId(DEVICE)).unwrap();
    // Each pipeline step costs one round trip; the fixture has nine
    // descriptors plus dynamic reads, so give it plenty of rounds.
    pump(&mut [&mut console, &mut device], &clock, 60);

    let events = drain_events(&console_handle);
    assert!(
        events.contains(&EngineEvent::EnumerationCompleted {
            entity: EntityId(DEVICE)
        }),
        "pipeline must finish: {events:?}"
    );

    let model = console_handle.remote_model(EntityId(DEVICE)).unwrap();
    let entity = model.entity.expect("ENTITY descriptor read");
    assert_eq!(entity.entity_id, EntityId(DEVICE));
    assert_eq!(entity.entity_name, "Stage Box 16");

    let configuration = model.configuration.expect("CONFIGURATION descriptor read");
    assert_eq!(
        configuration.count_of(DescriptorType::StreamInput),
        2
    );

    // The sweep read every advertised descriptor.
    let advertised: usize = configuration
        .descriptor_counts
        .iter()
        .map(|(_, count)| *count as usize)
        .sum();
    assert_eq!(model.descriptors.len(), advertised);

    // Dynamic reads covered all four streams and the AVB interface.
    assert_eq!(model.stream_info.len(), 4);
    assert_eq!(model.avb_info.len(), 1);
    assert_eq!(
        model.avb_info[0].gptp_grandmaster_id,
        EntityId(0x0022_9700_FFFE_0001)
    );
}

#[test]
fn test_enumeration_of_absent_entity_fails() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 1);
    console.start(clock.now());

    console_handle.enumerate(EntityId(0xFFFF_0000_0000_0001)).unwrap();
    run_for(
        &mut [&mut console],
        &clock,
        std::time::Duration::from_millis(1_000),
    );

    let events = drain_events(&console_handle);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::EnumerationFailed { entity, .. } if *entity == EntityId(0xFFFF_0000_0000_0001)
    )));
}

#[test]
fn test_concurrent_enumerations() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut device_a, _a) = engine_on(&bus, &clock, audio_entity(DEVICE), 1);
    let (mut device_b, _b) = engine_on(&bus, &clock, audio_entity(0x0001_0203_0405_0999), 2);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 3);

    device_a.start(clock.now());
    device_b.start(clock.now());
    console.start(clock.now());
    pump(&mut [&mut device_a, &mut device_b, &mut console], &clock, 2);
    drain_events(&console_handle);

    console_handle.enumerate(EntityId(DEVICE)).unwrap();
    console_handle
        .enumerate(EntityId(0x0001_0203_0405_0999))
        .unwrap();
    pump(
        &mut [&mut console, &mut device_a, &mut device_b],
        &clock,
        80,
    );

    let events = drain_events(&console_handle);
    for entity in [EntityId(DEVICE), EntityId(0x0001_0203_0405_0999)] {
        assert!(
            events.contains(&EngineEvent::EnumerationCompleted { entity }),
            "both entities must enumerate"
        );
        assert!(console_handle.remote_model(entity).is_some());
    }
}
