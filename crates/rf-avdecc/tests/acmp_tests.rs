//! End-to-end stream connection management: the two-phase connect
//! flow across controller, listener and talker engines, disconnect,
//! state reads and the timeout path.

mod common;

use std::time::Duration;

use common::*;
use rf_avdecc::{AcmpOutcome, EngineEvent, ManualClock};
use rf_avdecc_pdu::{AcmpStatus, EntityId, MacAddress, StreamId};

const TALKER: u64 = 0xAAAA_0000_0000_0001;
const LISTENER: u64 = 0xBBBB_0000_0000_0001;
const CONSOLE: u64 = 0x1111_1111_1111_1111;

fn acmp_completion(events: &[EngineEvent]) -> Option<(u32, AcmpOutcome)> {
    events.iter().find_map(|e| match e {
        EngineEvent::AcmpCompleted { op, outcome } => Some((*op, outcome.clone())),
        _ => None,
    })
}

#[test]
fn test_connect_stream_end_to_end() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut talker, _t) = engine_on(&bus, &clock, audio_entity(TALKER), 1);
    let (mut listener, _l) = engine_on(&bus, &clock, audio_entity(LISTENER), 2);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 3);

    talker.start(clock.now());
    listener.start(clock.now());
    console.start(clock.now());

    let op = console_handle
        .connect_stream(EntityId(TALKER), 0, EntityId(LISTENER), 0)
        .unwrap();
    pump(&mut [&mut console, &mut listener, &mut talker], &clock, 4);

    let events = drain_events(&console_handle);
    let (completed_op, outcome) = acmp_completion(&events).expect("connect must complete");
    assert_eq!(completed_op, op);
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected a response, got {outcome:?}");
    };
    assert_eq!(resp.status, AcmpStatus::Success);
    // Stream addressing derives deterministically from the talker
    // identity (MAAP is out of scope).
    assert_eq!(resp.stream_id, StreamId(0x91E0_F000_AA00_0000));
    assert_eq!(
        resp.stream_dest_mac,
        MacAddress([0x91, 0xE0, 0xF0, 0x00, 0xAA, 0x00])
    );
    assert_eq!(resp.connection_count, 1);

    // Both ends updated their connection tables.
    let stream = talker.acmp().talker_stream(0).unwrap();
    assert_eq!(stream.connections, vec![(EntityId(LISTENER), 0)]);
    let binding = listener.acmp().listener_binding(0).unwrap();
    assert_eq!(binding.talker_entity_id, EntityId(TALKER));
    assert_eq!(binding.stream_id, StreamId(0x91E0_F000_AA00_0000));
}

#[test]
fn test_disconnect_stream_end_to_end() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut talker, _t) = engine_on(&bus, &clock, audio_entity(TALKER), 1);
    let (mut listener, _l) = engine_on(&bus, &clock, audio_entity(LISTENER), 2);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 3);

    talker.start(clock.now());
    listener.start(clock.now());
    console.start(clock.now());

    console_handle
        .connect_stream(EntityId(TALKER), 0, EntityId(LISTENER), 0)
        .unwrap();
    pump(&mut [&mut console, &mut listener, &mut talker], &clock, 4);
    drain_events(&console_handle);

    let op = console_handle
        .disconnect_stream(EntityId(TALKER), 0, EntityId(LISTENER), 0)
        .unwrap();
    pump(&mut [&mut console, &mut listener, &mut talker], &clock, 4);

    let events = drain_events(&console_handle);
    let (completed_op, outcome) = acmp_completion(&events).expect("disconnect must complete");
    assert_eq!(completed_op, op);
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(resp.status, AcmpStatus::Success);

    assert!(listener.acmp().listener_binding(0).is_none());
    assert!(talker.acmp().talker_stream(0).unwrap().connections.is_empty());
}

#[test]
fn test_connect_to_absent_listener_times_out() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 1);
    console.start(clock.now());

    let op = console_handle
        .connect_stream(EntityId(0xFFFF_0000_0000_0001), 0, EntityId(0xFFFF_0000_0000_0002), 0)
        .unwrap();
    pump(&mut [&mut console], &clock, 1);
    assert!(drain_events(&console_handle).is_empty());

    // Default policy: 500 ms timeout, one retry. Nothing before the
    // second deadline, the synthetic failure right after it.
    run_for(&mut [&mut console], &clock, Duration::from_millis(990));
    assert!(acmp_completion(&drain_events(&console_handle)).is_none());

    run_for(&mut [&mut console], &clock, Duration::from_millis(20));
    let events = drain_events(&console_handle);
    let (completed_op, outcome) = acmp_completion(&events).expect("timeout must complete the op");
    assert_eq!(completed_op, op);
    assert_eq!(outcome, AcmpOutcome::TimedOut { attempts: 2 });
}

#[test]
fn test_listener_reports_talker_timeout() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    // Listener present, talker absent: the listener relays and then
    // reports LISTENER_TALKER_TIMEOUT upstream. The relay budget is
    // kept below the controller's so the verdict arrives before the
    // controller gives up on its own.
    let listener_config = rf_avdecc::EngineConfig {
        acmp_timeout_ms: 200,
        ..Default::default()
    };
    let (mut listener, _l) =
        engine_with_config(&bus, &clock, audio_entity(LISTENER), 1, listener_config);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 2);

    listener.start(clock.now());
    console.start(clock.now());

    console_handle
        .connect_stream(EntityId(0xFFFF_0000_0000_0001), 0, EntityId(LISTENER), 0)
        .unwrap();
    run_for(&mut [&mut console, &mut listener], &clock, Duration::from_millis(1_100));

    let events = drain_events(&console_handle);
    let (_, outcome) = acmp_completion(&events).expect("listener must answer");
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected LISTENER_TALKER_TIMEOUT response, got {outcome:?}");
    };
    assert_eq!(resp.status, AcmpStatus::ListenerTalkerTimeout);
    assert!(listener.acmp().listener_binding(0).is_none());
}

#[test]
fn test_second_listener_joins_same_stream() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut talker, _t) = engine_on(&bus, &clock, audio_entity(TALKER), 1);
    let (mut listener_a, _a) = engine_on(&bus, &clock, audio_entity(LISTENER), 2);
    let (mut listener_b, _b) = engine_on(&bus, &clock, audio_entity(0xBBBB_0000_0000_0002), 3);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 4);

    talker.start(clock.now());
    listener_a.start(clock.now());
    listener_b.start(clock.now());
    console.start(clock.now());

    console_handle
        .connect_stream(EntityId(TALKER), 0, EntityId(LISTENER), 0)
        .unwrap();
    pump(
        &mut [&mut console, &mut listener_a, &mut listener_b, &mut talker],
        &clock,
        4,
    );
    drain_events(&console_handle);

    console_handle
        .connect_stream(EntityId(TALKER), 0, EntityId(0xBBBB_0000_0000_0002), 0)
        .unwrap();
    pump(
        &mut [&mut console, &mut listener_a, &mut listener_b, &mut talker],
        &clock,
        4,
    );

    let events = drain_events(&console_handle);
    let (_, outcome) = acmp_completion(&events).expect("second connect must complete");
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected response");
    };
    assert_eq!(resp.status, AcmpStatus::Success);
    assert_eq!(resp.connection_count, 2);
    assert_eq!(talker.acmp().talker_stream(0).unwrap().connections.len(), 2);
}

#[test]
fn test_get_tx_and_rx_state() {
    let bus = Bus::new();
    let clock = ManualClock::new();
    let (mut talker, _t) = engine_on(&bus, &clock, audio_entity(TALKER), 1);
    let (mut listener, _l) = engine_on(&bus, &clock, audio_entity(LISTENER), 2);
    let (mut console, console_handle) = engine_on(&bus, &clock, controller_entity(CONSOLE), 3);

    talker.start(clock.now());
    listener.start(clock.now());
    console.start(clock.now());

    console_handle
        .connect_stream(EntityId(TALKER), 0, EntityId(LISTENER), 0)
        .unwrap();
    pump(&mut [&mut console, &mut listener, &mut talker], &clock, 4);
    drain_events(&console_handle);

    console_handle.get_tx_state(EntityId(TALKER), 0).unwrap();
    pump(&mut [&mut console, &mut talker], &clock, 3);
    let events = drain_events(&console_handle);
    let (_, outcome) = acmp_completion(&events).expect("GET_TX_STATE must complete");
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected response");
    };
    assert_eq!(resp.status, AcmpStatus::Success);
    assert_eq!(resp.connection_count, 1);
    assert_eq!(resp.stream_id, StreamId(0x91E0_F000_AA00_0000));

    console_handle.get_rx_state(EntityId(LISTENER), 0).unwrap();
    pump(&mut [&mut console, &mut listener], &clock, 3);
    let events = drain_events(&console_handle);
    let (_, outcome) = acmp_completion(&events).expect("GET_RX_STATE must complete");
    let AcmpOutcome::Response(resp) = outcome else {
        panic!("expected response");
    };
    assert_eq!(resp.status, AcmpStatus::Success);
    assert_eq!(resp.talker_entity_id, EntityId(TALKER));
    assert_eq!(resp.connection_count, 1);
}
