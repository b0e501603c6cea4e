//! The AVDECC engine
//!
//! One cooperatively scheduled thread owns every protocol state
//! machine, the entity model, the inflight tables and the send queue.
//! Applications talk to it through [`Handle`]: commands go in over a
//! bounded channel, completions and discovery events come back on the
//! event channel, and read-mostly views (discovery table, enumerated
//! models) are mirrored behind a lock for non-blocking access.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  App thread(s)                Engine thread                   │
//! │  ┌────────────┐   commands   ┌──────────────────────────┐    │
//! │  │  Handle    │─────────────▶│ tick: rx → ADP → inflight │    │
//! │  │ connect()  │              │  → locks → cmds → flush   │    │
//! │  │ read(),…   │◀─────────────│                          │    │
//! │  └────────────┘   events     └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::RwLock;

use rf_avdecc_model::{DescriptorType, EntityModel};
use rf_avdecc_pdu::{
    AdpMessageType, AdpPdu, AecpMessageType, AemCommandType, EntityId, Frame,
    AVDECC_MULTICAST_MAC,
};

use crate::acmp::{AcmpEngine, AcmpOutcome, OpId};
use crate::adp::{Advertiser, Discovery, DiscoveryEvent};
use crate::aecp::{AecpEngine, AemCompletion, AemIngress, AemOutcome};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::enumeration::{EnumerationDriver, EnumerationUpdate, RemoteEntityModel};
use crate::error::{EngineError, EngineResult};
use crate::net::NetworkInterface;
use crate::sendq::{FrameClass, SendQueue};

/// Commands posted by the application
#[derive(Debug, Clone)]
pub enum EngineCommand {
    ConnectStream {
        op: OpId,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
    },
    DisconnectStream {
        op: OpId,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
    },
    GetTxState {
        op: OpId,
        talker: EntityId,
        talker_unique_id: u16,
    },
    GetRxState {
        op: OpId,
        listener: EntityId,
        listener_unique_id: u16,
    },
    GetTxConnection {
        op: OpId,
        talker: EntityId,
        talker_unique_id: u16,
        connection_index: u16,
    },
    SendAemCommand {
        op: OpId,
        target: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
    },
    StartEnumeration {
        entity: EntityId,
    },
    Discover {
        target: EntityId,
    },
    Stop,
}

/// Completions and notifications delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    EntityDiscovered(EntityId),
    EntityUpdated(EntityId),
    EntityRediscovered(EntityId),
    EntityDeparted(EntityId),
    EntityTimedOut(EntityId),
    AcmpCompleted {
        op: OpId,
        outcome: AcmpOutcome,
    },
    AemCompleted {
        op: OpId,
        from: EntityId,
        outcome: AemOutcome,
    },
    UnsolicitedNotification {
        from: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
    },
    EnumerationCompleted {
        entity: EntityId,
    },
    EnumerationFailed {
        entity: EntityId,
        reason: String,
    },
    CommandFailed {
        op: OpId,
        error: EngineError,
    },
}

/// Read-side mirrors shared with the handle
#[derive(Debug, Default)]
struct SharedState {
    discovered: RwLock<HashMap<EntityId, AdpPdu>>,
    enumerated: RwLock<HashMap<EntityId, RemoteEntityModel>>,
}

/// Thread-safe application handle
#[derive(Clone)]
pub struct Handle {
    commands: Sender<EngineCommand>,
    events: Receiver<EngineEvent>,
    shared: Arc<SharedState>,
    next_op: Arc<AtomicU32>,
}

impl Handle {
    fn post(&self, command: EngineCommand) -> EngineResult<()> {
        self.commands
            .try_send(command)
            .map_err(|_| EngineError::Stopped)
    }

    fn next_op(&self) -> OpId {
        self.next_op.fetch_add(1, Ordering::Relaxed)
    }

    pub fn connect_stream(
        &self,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
    ) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::ConnectStream {
            op,
            talker,
            talker_unique_id,
            listener,
            listener_unique_id,
        })?;
        Ok(op)
    }

    pub fn disconnect_stream(
        &self,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
    ) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::DisconnectStream {
            op,
            talker,
            talker_unique_id,
            listener,
            listener_unique_id,
        })?;
        Ok(op)
    }

    pub fn get_tx_state(&self, talker: EntityId, talker_unique_id: u16) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::GetTxState {
            op,
            talker,
            talker_unique_id,
        })?;
        Ok(op)
    }

    pub fn get_rx_state(&self, listener: EntityId, listener_unique_id: u16) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::GetRxState {
            op,
            listener,
            listener_unique_id,
        })?;
        Ok(op)
    }

    pub fn get_tx_connection(
        &self,
        talker: EntityId,
        talker_unique_id: u16,
        connection_index: u16,
    ) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::GetTxConnection {
            op,
            talker,
            talker_unique_id,
            connection_index,
        })?;
        Ok(op)
    }

    pub fn send_aem_command(
        &self,
        target: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
    ) -> EngineResult<OpId> {
        let op = self.next_op();
        self.post(EngineCommand::SendAemCommand {
            op,
            target,
            command_type,
            payload,
        })?;
        Ok(op)
    }

    /// Kick off the enumeration pipeline for a discovered entity.
    pub fn enumerate(&self, entity: EntityId) -> EngineResult<()> {
        self.post(EngineCommand::StartEnumeration { entity })
    }

    /// Fire an immediate discovery request (global when `target` is
    /// unspecified).
    pub fn discover(&self, target: EntityId) -> EngineResult<()> {
        self.post(EngineCommand::Discover { target })
    }

    /// One-shot shutdown: the engine departs and halts.
    pub fn stop(&self) -> EngineResult<()> {
        self.post(EngineCommand::Stop)
    }

    pub fn try_event(&self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Snapshot of the current discovery table.
    pub fn discovered_entities(&self) -> Vec<AdpPdu> {
        self.shared.discovered.read().values().cloned().collect()
    }

    pub fn discovered_entity(&self, entity: EntityId) -> Option<AdpPdu> {
        self.shared.discovered.read().get(&entity).cloned()
    }

    /// Enumerated model of a remote entity, if the pipeline finished
    /// (or partially, after a failure).
    pub fn remote_model(&self, entity: EntityId) -> Option<RemoteEntityModel> {
        self.shared.enumerated.read().get(&entity).cloned()
    }
}

/// The engine proper; owns all protocol state
pub struct Engine<N: NetworkInterface, C: Clock> {
    net: N,
    clock: C,
    config: EngineConfig,
    model: EntityModel,
    local_entity_id: EntityId,
    advertiser: Advertiser,
    discovery: Discovery,
    acmp: AcmpEngine,
    aecp: AecpEngine,
    enumeration: EnumerationDriver,
    send_queue: SendQueue,
    commands: Receiver<EngineCommand>,
    events: Sender<EngineEvent>,
    shared: Arc<SharedState>,
    running: bool,
}

impl<N: NetworkInterface, C: Clock> Engine<N, C> {
    pub fn new(model: EntityModel, config: EngineConfig, net: N, clock: C) -> (Self, Handle) {
        let local_entity_id = model.entity_id();
        let now = clock.now();

        let (command_tx, command_rx) = bounded(1024);
        let (event_tx, event_rx) = unbounded();
        let shared = Arc::new(SharedState::default());

        let stream_outputs = model.store().count_of(DescriptorType::StreamOutput) as usize;
        let stream_inputs = model.store().count_of(DescriptorType::StreamInput) as usize;

        let engine = Self {
            net,
            advertiser: Advertiser::new(config.advertise_interval()),
            discovery: Discovery::new(config.discovery_interval(), now),
            acmp: AcmpEngine::new(local_entity_id, stream_outputs, stream_inputs, &config),
            aecp: AecpEngine::new(local_entity_id, &config),
            enumeration: EnumerationDriver::new(),
            send_queue: SendQueue::new(config.send_queue_capacity),
            commands: command_rx,
            events: event_tx,
            shared: Arc::clone(&shared),
            model,
            local_entity_id,
            config,
            clock,
            running: false,
        };
        let handle = Handle {
            commands: command_tx,
            events: event_rx,
            shared,
            next_op: Arc::new(AtomicU32::new(1)),
        };
        (engine, handle)
    }

    pub fn local_entity_id(&self) -> EntityId {
        self.local_entity_id
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    pub fn acmp(&self) -> &AcmpEngine {
        &self.acmp
    }

    /// Direct access for test rigs; production mutations arrive as AEM
    /// commands.
    pub fn acmp_mut(&mut self) -> &mut AcmpEngine {
        &mut self.acmp
    }

    /// Begin advertising and discovery.
    pub fn start(&mut self, now: Instant) {
        info!("engine {} starting", self.local_entity_id);
        self.running = true;
        if self.advertiser.start(now) {
            self.emit_available();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Blocking run loop at the configured tick period.
    pub fn run(&mut self) -> EngineResult<()> {
        self.start(self.clock.now());
        let interval = self.config.tick_interval();
        while self.running {
            let tick_start = self.clock.now();
            if let Err(err) = self.tick(tick_start) {
                error!("engine halting: {err}");
                self.depart();
                let _ = self.send_queue.flush(&mut self.net);
                self.running = false;
                return Err(err);
            }
            let elapsed = self.clock.now().saturating_duration_since(tick_start);
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        Ok(())
    }

    /// One scheduler pass: frames → ADP timers → inflight timeouts →
    /// lock expiry → application commands → flush.
    pub fn tick(&mut self, now: Instant) -> EngineResult<()> {
        while let Some(bytes) = self.net.receive() {
            match Frame::decode(&bytes) {
                Ok(frame) => self.dispatch(frame, now),
                Err(err) => debug!("dropping malformed frame: {err}"),
            }
        }

        if self.advertiser.tick(now) {
            self.emit_available();
        }
        let (discover, timeouts) = self.discovery.tick(now);
        if discover {
            self.emit_discovery_request(EntityId::UNSPECIFIED);
        }
        for event in timeouts {
            self.on_discovery_event(event, now);
        }

        let mut out = Vec::new();
        let acmp_failures = self.acmp.expire(now, &mut out);
        self.queue_emissions(out);
        for (op, outcome) in acmp_failures {
            self.emit_event(EngineEvent::AcmpCompleted { op, outcome });
        }

        let mut out = Vec::new();
        let aem_failures = self.aecp.expire(now, &mut out);
        self.queue_emissions(out);
        for (completion, target, outcome) in aem_failures {
            self.route_aem_completion(completion, target, outcome, now);
        }

        self.aecp.tick(&mut self.model, now);

        while let Ok(command) = self.commands.try_recv() {
            self.handle_app_command(command, now);
        }

        self.send_queue.flush(&mut self.net)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INGRESS
    // ═══════════════════════════════════════════════════════════════════════════

    fn dispatch(&mut self, frame: Frame, now: Instant) {
        match frame {
            Frame::Adp(pdu) => self.dispatch_adp(pdu, now),
            Frame::Acmp(pdu) => {
                let mut out = Vec::new();
                let completions = self.acmp.handle_frame(pdu, now, &mut out);
                self.queue_emissions(out);
                for (op, outcome) in completions {
                    self.emit_event(EngineEvent::AcmpCompleted { op, outcome });
                }
            }
            Frame::Aecp(pdu) => match pdu.message_type {
                AecpMessageType::AemCommand => {
                    let mut out = Vec::new();
                    let changed = self.aecp.handle_command(&pdu, &mut self.model, now, &mut out);
                    self.queue_emissions(out);
                    if changed {
                        self.observable_change(now);
                    }
                }
                AecpMessageType::AemResponse => match self.aecp.handle_response(pdu) {
                    AemIngress::Completed(completion, from, outcome) => {
                        self.route_aem_completion(completion, from, outcome, now);
                    }
                    AemIngress::Unsolicited {
                        from,
                        command_type,
                        payload,
                    } => {
                        self.emit_event(EngineEvent::UnsolicitedNotification {
                            from,
                            command_type,
                            payload,
                        });
                    }
                    AemIngress::Dropped => {}
                },
            },
        }
    }

    fn dispatch_adp(&mut self, pdu: AdpPdu, now: Instant) {
        match pdu.message_type {
            AdpMessageType::EntityAvailable => {
                if pdu.entity_id == self.local_entity_id {
                    return;
                }
                if let Some(event) = self.discovery.handle_available(pdu, now) {
                    self.on_discovery_event(event, now);
                }
            }
            AdpMessageType::EntityDeparting => {
                if let Some(event) = self.discovery.handle_departing(pdu.entity_id) {
                    self.on_discovery_event(event, now);
                }
            }
            AdpMessageType::EntityDiscoveryRequest => {
                let addressed = pdu.entity_id.is_unspecified()
                    || pdu.entity_id == self.local_entity_id;
                if addressed && self.advertiser.advertise_now(now) {
                    self.emit_available();
                }
            }
        }
    }

    fn on_discovery_event(&mut self, event: DiscoveryEvent, now: Instant) {
        let entity_id = event.entity_id();
        match &event {
            DiscoveryEvent::Discovered(_) | DiscoveryEvent::Updated(_) => {
                if let Some(remote) = self.discovery.get(entity_id) {
                    self.shared
                        .discovered
                        .write()
                        .insert(entity_id, remote.adp.clone());
                }
            }
            DiscoveryEvent::Rediscovered(_) => {
                if let Some(remote) = self.discovery.get(entity_id) {
                    self.shared
                        .discovered
                        .write()
                        .insert(entity_id, remote.adp.clone());
                }
                // The entity rebooted: everything cached about it is
                // stale. Entities we had enumerated are walked again.
                self.enumeration.forget(entity_id);
                let was_enumerated = self.shared.enumerated.write().remove(&entity_id).is_some();
                if was_enumerated {
                    let request = self.enumeration.start(entity_id);
                    self.apply_enumeration_update(
                        entity_id,
                        EnumerationUpdate::Request(request),
                        now,
                    );
                }
            }
            DiscoveryEvent::Departed(_) | DiscoveryEvent::TimedOut(_) => {
                self.shared.discovered.write().remove(&entity_id);
                if self.aecp.on_controller_gone(entity_id, &mut self.model) {
                    self.observable_change(now);
                }
            }
        }
        let event = match event {
            DiscoveryEvent::Discovered(id) => EngineEvent::EntityDiscovered(id),
            DiscoveryEvent::Updated(id) => EngineEvent::EntityUpdated(id),
            DiscoveryEvent::Rediscovered(id) => EngineEvent::EntityRediscovered(id),
            DiscoveryEvent::Departed(id) => EngineEvent::EntityDeparted(id),
            DiscoveryEvent::TimedOut(id) => EngineEvent::EntityTimedOut(id),
        };
        self.emit_event(event);
    }

    fn route_aem_completion(
        &mut self,
        completion: AemCompletion,
        from: EntityId,
        outcome: AemOutcome,
        now: Instant,
    ) {
        match completion {
            AemCompletion::App { op } => {
                self.emit_event(EngineEvent::AemCompleted { op, from, outcome });
            }
            AemCompletion::Enumeration { entity } => {
                let update = self.enumeration.on_result(entity, &outcome);
                self.apply_enumeration_update(entity, update, now);
            }
        }
    }

    fn apply_enumeration_update(
        &mut self,
        entity: EntityId,
        update: EnumerationUpdate,
        now: Instant,
    ) {
        match update {
            EnumerationUpdate::Request(request) => {
                let mut out = Vec::new();
                let sent = self.aecp.send_command(
                    request.target,
                    request.command_type,
                    request.payload,
                    AemCompletion::Enumeration { entity },
                    now,
                    &mut out,
                );
                self.queue_emissions(out);
                if let Err(err) = sent {
                    warn!("enumeration of {entity} stalled: {err}");
                    self.emit_event(EngineEvent::EnumerationFailed {
                        entity,
                        reason: err.to_string(),
                    });
                }
            }
            EnumerationUpdate::Completed(entity) => {
                self.store_remote_model(entity);
                self.emit_event(EngineEvent::EnumerationCompleted { entity });
            }
            EnumerationUpdate::Failed(entity, reason) => {
                // Keep the partial model; callers can inspect how far
                // it got.
                self.store_remote_model(entity);
                self.emit_event(EngineEvent::EnumerationFailed { entity, reason });
            }
            EnumerationUpdate::Idle => {}
        }
    }

    fn store_remote_model(&mut self, entity: EntityId) {
        if let Some(model) = self.enumeration.model(entity) {
            self.shared
                .enumerated
                .write()
                .insert(entity, model.clone());
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // APPLICATION COMMANDS
    // ═══════════════════════════════════════════════════════════════════════════

    fn handle_app_command(&mut self, command: EngineCommand, now: Instant) {
        let mut out = Vec::new();
        let result: Result<(), (OpId, EngineError)> = match command {
            EngineCommand::ConnectStream {
                op,
                talker,
                talker_unique_id,
                listener,
                listener_unique_id,
            } => self
                .acmp
                .connect_stream(
                    talker,
                    talker_unique_id,
                    listener,
                    listener_unique_id,
                    op,
                    now,
                    &mut out,
                )
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::DisconnectStream {
                op,
                talker,
                talker_unique_id,
                listener,
                listener_unique_id,
            } => self
                .acmp
                .disconnect_stream(
                    talker,
                    talker_unique_id,
                    listener,
                    listener_unique_id,
                    op,
                    now,
                    &mut out,
                )
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::GetTxState {
                op,
                talker,
                talker_unique_id,
            } => self
                .acmp
                .get_tx_state(talker, talker_unique_id, op, now, &mut out)
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::GetRxState {
                op,
                listener,
                listener_unique_id,
            } => self
                .acmp
                .get_rx_state(listener, listener_unique_id, op, now, &mut out)
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::GetTxConnection {
                op,
                talker,
                talker_unique_id,
                connection_index,
            } => self
                .acmp
                .get_tx_connection(talker, talker_unique_id, connection_index, op, now, &mut out)
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::SendAemCommand {
                op,
                target,
                command_type,
                payload,
            } => self
                .aecp
                .send_command(
                    target,
                    command_type,
                    payload,
                    AemCompletion::App { op },
                    now,
                    &mut out,
                )
                .map(|_| ())
                .map_err(|e| (op, e)),
            EngineCommand::StartEnumeration { entity } => {
                let request = self.enumeration.start(entity);
                self.apply_enumeration_update(entity, EnumerationUpdate::Request(request), now);
                Ok(())
            }
            EngineCommand::Discover { target } => {
                self.emit_discovery_request(target);
                Ok(())
            }
            EngineCommand::Stop => {
                info!("engine {} stopping", self.local_entity_id);
                self.depart();
                self.running = false;
                Ok(())
            }
        };
        self.queue_emissions(out);
        if let Err((op, error)) = result {
            warn!("application command {op} failed: {error}");
            self.emit_event(EngineEvent::CommandFailed { op, error });
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EGRESS
    // ═══════════════════════════════════════════════════════════════════════════

    fn queue_emissions(&mut self, out: Vec<(FrameClass, Vec<u8>)>) {
        for (class, bytes) in out {
            self.send_queue.push(AVDECC_MULTICAST_MAC, bytes, class);
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn build_available(&self) -> Option<AdpPdu> {
        let entity = match self.model.entity() {
            Ok(entity) => entity,
            Err(err) => {
                error!("entity model lost its ENTITY descriptor: {err}");
                return None;
            }
        };
        let gptp = self.model.dynamic.avb_interfaces.first();
        Some(AdpPdu {
            message_type: AdpMessageType::EntityAvailable,
            valid_time: self.config.wire_valid_time(),
            entity_id: entity.entity_id,
            entity_model_id: entity.entity_model_id,
            entity_capabilities: entity.entity_capabilities,
            talker_stream_sources: entity.talker_stream_sources,
            talker_capabilities: entity.talker_capabilities,
            listener_stream_sinks: entity.listener_stream_sinks,
            listener_capabilities: entity.listener_capabilities,
            controller_capabilities: entity.controller_capabilities,
            available_index: self.model.dynamic.available_index,
            gptp_grandmaster_id: gptp.map(|g| g.gptp_grandmaster_id).unwrap_or_default(),
            gptp_domain_number: gptp.map(|g| g.gptp_domain_number).unwrap_or(0),
            current_configuration_index: self.model.dynamic.current_configuration,
            identify_control_index: 0,
            interface_index: 0,
            association_id: entity.association_id,
        })
    }

    fn emit_available(&mut self) {
        if let Some(pdu) = self.build_available() {
            self.send_queue
                .push(AVDECC_MULTICAST_MAC, pdu.encode(), FrameClass::Advertise);
        }
    }

    fn emit_discovery_request(&mut self, target: EntityId) {
        let pdu = AdpPdu::discovery_request(target);
        self.send_queue
            .push(AVDECC_MULTICAST_MAC, pdu.encode(), FrameClass::Command);
    }

    fn depart(&mut self) {
        if !self.advertiser.stop() {
            return;
        }
        if let Some(mut pdu) = self.build_available() {
            pdu.message_type = AdpMessageType::EntityDeparting;
            pdu.valid_time = 0;
            // Shutdown notice must survive queue pressure.
            self.send_queue
                .push(AVDECC_MULTICAST_MAC, pdu.encode(), FrameClass::Response);
        }
    }

    /// Observable state changed: advance available_index once and
    /// re-advertise immediately.
    fn observable_change(&mut self, now: Instant) {
        self.model.dynamic.bump_available_index();
        if self.advertiser.advertise_now(now) {
            self.emit_available();
        }
    }
}
