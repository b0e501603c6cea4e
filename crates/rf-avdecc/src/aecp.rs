//! AECP/AEM engine
//!
//! Responder side: the command dispatcher over the entity model, with
//! acquire/lock gating, argument validation, unsolicited-notification
//! fan-out and the ownership lifecycle. Controller side: inflight
//! command tracking with retry, completion and unsolicited routing.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use rf_avdecc_pdu::capabilities::{acquire_flags, lock_flags, StreamInfoFlags};
use rf_avdecc_pdu::{AecpPdu, AemCommandType, AemStatus, EntityId};

use rf_avdecc_model::{AcquireState, DescriptorType, EntityModel, LockState, ModelError};

use crate::acmp::OpId;
use crate::aem_payload::{
    build_dynamic_info, parse_dynamic_info, read_descriptor_response, AudioMappingsPayload,
    AvbInfoPayload, ConfigurationPayload, DescriptorSelector, DynamicInfoRecord,
    GetAudioMapCommand, GetAudioMapResponse, OwnershipPayload, ReadDescriptorCommand,
    StreamFormatPayload, StreamInfoPayload,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::inflight::InflightTable;
use crate::sendq::FrameClass;

/// Who asked for an inflight AEM command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AemCompletion {
    /// Application request, completion delivered on the event queue
    App { op: OpId },
    /// Step of the enumeration pipeline for one remote entity
    Enumeration { entity: EntityId },
}

/// Outcome of a controller-side AEM command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AemOutcome {
    Response {
        status: AemStatus,
        command_type: AemCommandType,
        payload: Vec<u8>,
    },
    TimedOut {
        attempts: u8,
    },
}

/// Routed ingress AEM response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AemIngress {
    /// Completion of one of our inflight commands
    Completed(AemCompletion, EntityId, AemOutcome),
    /// Unsolicited notification from a remote responder
    Unsolicited {
        from: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
    },
    /// Duplicate or stray; dropped
    Dropped,
}

pub type AecpEmissions = Vec<(FrameClass, Vec<u8>)>;

/// The AECP engine for one local entity
#[derive(Debug)]
pub struct AecpEngine {
    local_entity_id: EntityId,
    subscribers: Vec<EntityId>,
    inflight: InflightTable<AemCompletion>,
    unsolicited_sequence: u16,
    timeout: Duration,
    retries: u8,
    lock_timeout: Duration,
}

impl AecpEngine {
    pub fn new(local_entity_id: EntityId, config: &EngineConfig) -> Self {
        Self {
            local_entity_id,
            subscribers: Vec::new(),
            inflight: InflightTable::new(config.inflight_capacity),
            unsolicited_sequence: 0,
            timeout: config.aecp_timeout(),
            retries: config.aecp_retries,
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn subscribers(&self) -> &[EntityId] {
        &self.subscribers
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RESPONDER SIDE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Process an ingress AEM_COMMAND against the local model.
    /// Returns whether observable state changed (the caller bumps
    /// available_index and re-advertises).
    pub fn handle_command(
        &mut self,
        pdu: &AecpPdu,
        model: &mut EntityModel,
        now: Instant,
        out: &mut AecpEmissions,
    ) -> bool {
        if pdu.target_entity_id != self.local_entity_id {
            // Promiscuous-mode traffic for someone else.
            return false;
        }

        self.expire_lock(model, now);

        let controller = pdu.controller_entity_id;
        let (status, payload, changed) = if self.gated(pdu, model) {
            let status = match model.dynamic.acquire.owner() {
                Some(owner) if owner != controller => AemStatus::EntityAcquired,
                _ => AemStatus::EntityLocked,
            };
            debug!(
                "rejecting {:?} from {controller}: entity owned elsewhere",
                pdu.command_type
            );
            (status, pdu.payload.clone(), false)
        } else {
            self.execute(pdu, model, now)
        };

        let response = pdu.response(status, payload);
        if let Ok(bytes) = response.encode() {
            out.push((FrameClass::Response, bytes));
        } else {
            warn!("AEM response payload oversized, dropping");
        }

        // Successful activity from the lock holder keeps the lock
        // alive.
        if status == AemStatus::Success {
            if let LockState::Locked {
                controller: holder, ..
            } = model.dynamic.lock
            {
                if holder == controller {
                    model.dynamic.lock = LockState::Locked {
                        controller: holder,
                        expires_at: now + self.lock_timeout,
                    };
                }
            }
        }

        if changed {
            self.notify_subscribers(&response, controller, out);
        }
        changed
    }

    /// True when the command mutates state owned by another
    /// controller.
    fn gated(&self, pdu: &AecpPdu, model: &EntityModel) -> bool {
        if !is_mutating(pdu.command_type) {
            return false;
        }
        let controller = pdu.controller_entity_id;
        if let Some(owner) = model.dynamic.acquire.owner() {
            if owner != controller {
                return true;
            }
        }
        if let Some(holder) = model.dynamic.lock.holder() {
            if holder != controller {
                return true;
            }
        }
        false
    }

    fn expire_lock(&self, model: &mut EntityModel, now: Instant) {
        if let LockState::Locked { expires_at, controller } = model.dynamic.lock {
            if now >= expires_at {
                info!("lock by {controller} expired");
                model.dynamic.lock = LockState::NotLocked;
            }
        }
    }

    /// Periodic lock-expiry sweep from the scheduler.
    pub fn tick(&mut self, model: &mut EntityModel, now: Instant) {
        self.expire_lock(model, now);
    }

    /// The acquiring/locking controller disappeared from the network:
    /// release its holds and subscription. Returns whether state
    /// changed.
    pub fn on_controller_gone(&mut self, controller: EntityId, model: &mut EntityModel) -> bool {
        let mut changed = false;
        if model.dynamic.acquire.owner() == Some(controller) {
            info!("releasing acquisition: owner {controller} departed");
            model.dynamic.acquire = AcquireState::NotAcquired;
            changed = true;
        }
        if model.dynamic.lock.holder() == Some(controller) {
            model.dynamic.lock = LockState::NotLocked;
            changed = true;
        }
        self.subscribers.retain(|s| *s != controller);
        changed
    }

    fn notify_subscribers(
        &mut self,
        response: &AecpPdu,
        requester: EntityId,
        out: &mut AecpEmissions,
    ) {
        for subscriber in self.subscribers.clone() {
            if subscriber == requester {
                continue;
            }
            let mut notification = response.clone();
            notification.unsolicited = true;
            notification.controller_entity_id = subscriber;
            notification.sequence_id = self.unsolicited_sequence;
            self.unsolicited_sequence = self.unsolicited_sequence.wrapping_add(1);
            match notification.encode() {
                Ok(bytes) => out.push((FrameClass::Command, bytes)),
                Err(err) => warn!("unsolicited notification encode failed: {err}"),
            }
        }
    }

    fn execute(
        &mut self,
        pdu: &AecpPdu,
        model: &mut EntityModel,
        now: Instant,
    ) -> (AemStatus, Vec<u8>, bool) {
        let controller = pdu.controller_entity_id;
        let payload = pdu.payload.as_slice();
        match pdu.command_type {
            AemCommandType::ACQUIRE_ENTITY => self.acquire_entity(controller, payload, model),
            AemCommandType::LOCK_ENTITY => self.lock_entity(controller, payload, model, now),
            AemCommandType::ENTITY_AVAILABLE | AemCommandType::CONTROLLER_AVAILABLE => {
                (AemStatus::Success, Vec::new(), false)
            }
            AemCommandType::READ_DESCRIPTOR => read_descriptor(payload, model),
            AemCommandType::SET_CONFIGURATION => set_configuration(payload, model),
            AemCommandType::GET_CONFIGURATION => get_configuration(model),
            AemCommandType::SET_STREAM_FORMAT => set_stream_format(payload, model),
            AemCommandType::GET_STREAM_FORMAT => get_stream_format(payload, model),
            AemCommandType::SET_STREAM_INFO => set_stream_info(payload, model),
            AemCommandType::GET_STREAM_INFO => get_stream_info(payload, model),
            AemCommandType::START_STREAMING => set_streaming(payload, model, true),
            AemCommandType::STOP_STREAMING => set_streaming(payload, model, false),
            AemCommandType::GET_AVB_INFO => get_avb_info(payload, model),
            AemCommandType::GET_AUDIO_MAP => get_audio_map(payload, model),
            AemCommandType::ADD_AUDIO_MAPPINGS => audio_mappings(payload, model, true),
            AemCommandType::REMOVE_AUDIO_MAPPINGS => audio_mappings(payload, model, false),
            AemCommandType::REGISTER_UNSOLICITED_NOTIFICATION => {
                if !self.subscribers.contains(&controller) {
                    self.subscribers.push(controller);
                    info!("{controller} registered for unsolicited notifications");
                }
                (AemStatus::Success, Vec::new(), false)
            }
            AemCommandType::DEREGISTER_UNSOLICITED_NOTIFICATION => {
                self.subscribers.retain(|s| *s != controller);
                (AemStatus::Success, Vec::new(), false)
            }
            AemCommandType::GET_DYNAMIC_INFO => self.get_dynamic_info(payload, model),
            other => {
                debug!("unimplemented AEM command {other:?}");
                (AemStatus::NotImplemented, pdu.payload.clone(), false)
            }
        }
    }

    fn acquire_entity(
        &mut self,
        controller: EntityId,
        payload: &[u8],
        model: &mut EntityModel,
    ) -> (AemStatus, Vec<u8>, bool) {
        let Ok(request) = OwnershipPayload::parse(payload) else {
            return (AemStatus::BadArguments, payload.to_vec(), false);
        };
        if request.descriptor_type != DescriptorType::Entity.as_u16()
            || request.descriptor_index != 0
        {
            return (AemStatus::NotSupported, payload.to_vec(), false);
        }
        if model.dynamic.acquire == AcquireState::NotSupported {
            return (AemStatus::NotSupported, payload.to_vec(), false);
        }

        let respond = |owner: EntityId, status: AemStatus, changed: bool| {
            let body = OwnershipPayload {
                flags: request.flags,
                owner_id: owner,
                descriptor_type: request.descriptor_type,
                descriptor_index: request.descriptor_index,
            };
            (status, body.build(), changed)
        };

        let release = request.flags & acquire_flags::RELEASE != 0;
        let persistent = request.flags & acquire_flags::PERSISTENT != 0;

        match model.dynamic.acquire.owner() {
            Some(owner) if owner != controller => {
                // Someone else holds it, either direction.
                respond(owner, AemStatus::EntityAcquired, false)
            }
            Some(_) if release => {
                model.dynamic.acquire = AcquireState::NotAcquired;
                info!("{controller} released the entity");
                respond(EntityId::UNSPECIFIED, AemStatus::Success, true)
            }
            None if release => respond(EntityId::UNSPECIFIED, AemStatus::Success, false),
            _ => {
                let was = model.dynamic.acquire;
                model.dynamic.acquire = AcquireState::Acquired {
                    controller,
                    persistent,
                };
                info!("{controller} acquired the entity (persistent={persistent})");
                respond(
                    controller,
                    AemStatus::Success,
                    was != model.dynamic.acquire,
                )
            }
        }
    }

    fn lock_entity(
        &mut self,
        controller: EntityId,
        payload: &[u8],
        model: &mut EntityModel,
        now: Instant,
    ) -> (AemStatus, Vec<u8>, bool) {
        let Ok(request) = OwnershipPayload::parse(payload) else {
            return (AemStatus::BadArguments, payload.to_vec(), false);
        };
        if request.descriptor_type != DescriptorType::Entity.as_u16()
            || request.descriptor_index != 0
        {
            return (AemStatus::NotSupported, payload.to_vec(), false);
        }
        if model.dynamic.lock == LockState::NotSupported {
            return (AemStatus::NotSupported, payload.to_vec(), false);
        }

        let respond = |holder: EntityId, status: AemStatus, changed: bool| {
            let body = OwnershipPayload {
                flags: request.flags,
                owner_id: holder,
                descriptor_type: request.descriptor_type,
                descriptor_index: request.descriptor_index,
            };
            (status, body.build(), changed)
        };

        let unlock = request.flags & lock_flags::UNLOCK != 0;

        match model.dynamic.lock.holder() {
            Some(holder) if holder != controller => {
                respond(holder, AemStatus::EntityLocked, false)
            }
            Some(_) if unlock => {
                model.dynamic.lock = LockState::NotLocked;
                info!("{controller} unlocked the entity");
                respond(EntityId::UNSPECIFIED, AemStatus::Success, true)
            }
            None if unlock => respond(EntityId::UNSPECIFIED, AemStatus::Success, false),
            previous => {
                model.dynamic.lock = LockState::Locked {
                    controller,
                    expires_at: now + self.lock_timeout,
                };
                respond(controller, AemStatus::Success, previous.is_none())
            }
        }
    }

    fn get_dynamic_info(
        &mut self,
        payload: &[u8],
        model: &mut EntityModel,
    ) -> (AemStatus, Vec<u8>, bool) {
        let Ok(records) = parse_dynamic_info(payload) else {
            return (AemStatus::BadArguments, payload.to_vec(), false);
        };
        let mut responses = Vec::with_capacity(records.len());
        for record in &records {
            let (status, body) = match record.command_type {
                AemCommandType::GET_CONFIGURATION => {
                    let (status, body, _) = get_configuration(model);
                    (status, body)
                }
                AemCommandType::GET_STREAM_FORMAT => {
                    let (status, body, _) = get_stream_format(&record.payload, model);
                    (status, body)
                }
                AemCommandType::GET_STREAM_INFO => {
                    let (status, body, _) = get_stream_info(&record.payload, model);
                    (status, body)
                }
                AemCommandType::GET_AVB_INFO => {
                    let (status, body, _) = get_avb_info(&record.payload, model);
                    (status, body)
                }
                other => {
                    debug!("GET_DYNAMIC_INFO sub-query {other:?} unsupported");
                    return (AemStatus::NotSupported, payload.to_vec(), false);
                }
            };
            if status != AemStatus::Success {
                return (status, payload.to_vec(), false);
            }
            responses.push(DynamicInfoRecord {
                command_type: record.command_type,
                payload: body,
            });
        }
        (AemStatus::Success, build_dynamic_info(&responses), false)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTROLLER SIDE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Send an AEM command; the completion fires on response or after
    /// the retry budget.
    pub fn send_command(
        &mut self,
        target: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
        completion: AemCompletion,
        now: Instant,
        out: &mut AecpEmissions,
    ) -> EngineResult<u16> {
        let sequence_id = self.inflight.next_sequence_id();
        let pdu = AecpPdu::command(
            target,
            self.local_entity_id,
            sequence_id,
            command_type,
            payload,
        );
        let bytes = pdu.encode()?;
        if !self.inflight.insert(
            sequence_id,
            target,
            bytes.clone(),
            now,
            self.timeout,
            self.retries,
            completion,
        ) {
            return Err(EngineError::InflightFull);
        }
        out.push((FrameClass::Command, bytes));
        Ok(sequence_id)
    }

    /// Route an ingress AEM_RESPONSE.
    pub fn handle_response(&mut self, pdu: AecpPdu) -> AemIngress {
        // Responses (solicited or not) are addressed to one
        // controller; multicast copies for others are not ours.
        if pdu.controller_entity_id != self.local_entity_id {
            return AemIngress::Dropped;
        }
        if pdu.unsolicited {
            return AemIngress::Unsolicited {
                from: pdu.target_entity_id,
                command_type: pdu.command_type,
                payload: pdu.payload,
            };
        }
        match self
            .inflight
            .complete(pdu.sequence_id, |e| e.target == pdu.target_entity_id)
        {
            Some(entry) => AemIngress::Completed(
                entry.tag,
                pdu.target_entity_id,
                AemOutcome::Response {
                    status: pdu.status,
                    command_type: pdu.command_type,
                    payload: pdu.payload,
                },
            ),
            None => {
                debug!("dropping stray AEM response seq={}", pdu.sequence_id);
                AemIngress::Dropped
            }
        }
    }

    /// Inflight expiry sweep.
    pub fn expire(
        &mut self,
        now: Instant,
        out: &mut AecpEmissions,
    ) -> Vec<(AemCompletion, EntityId, AemOutcome)> {
        let swept = self.inflight.expire(now);
        for bytes in swept.resend {
            out.push((FrameClass::Command, bytes));
        }
        swept
            .failed
            .into_iter()
            .map(|entry| {
                debug!(
                    "AEM command seq={} to {} timed out after {} attempts",
                    entry.sequence_id, entry.target, entry.attempts
                );
                (
                    entry.tag,
                    entry.target,
                    AemOutcome::TimedOut {
                        attempts: entry.attempts,
                    },
                )
            })
            .collect()
    }
}

/// Commands that mutate entity state and are therefore subject to the
/// acquire/lock gate.
fn is_mutating(command_type: AemCommandType) -> bool {
    matches!(
        command_type,
        AemCommandType::WRITE_DESCRIPTOR
            | AemCommandType::SET_CONFIGURATION
            | AemCommandType::SET_STREAM_FORMAT
            | AemCommandType::SET_VIDEO_FORMAT
            | AemCommandType::SET_SENSOR_FORMAT
            | AemCommandType::SET_STREAM_INFO
            | AemCommandType::SET_NAME
            | AemCommandType::SET_ASSOCIATION_ID
            | AemCommandType::SET_SAMPLING_RATE
            | AemCommandType::SET_CLOCK_SOURCE
            | AemCommandType::SET_CONTROL
            | AemCommandType::INCREMENT_CONTROL
            | AemCommandType::DECREMENT_CONTROL
            | AemCommandType::SET_SIGNAL_SELECTOR
            | AemCommandType::SET_MIXER
            | AemCommandType::SET_MATRIX
            | AemCommandType::START_STREAMING
            | AemCommandType::STOP_STREAMING
            | AemCommandType::ADD_AUDIO_MAPPINGS
            | AemCommandType::REMOVE_AUDIO_MAPPINGS
            | AemCommandType::REBOOT
            | AemCommandType::SET_MEMORY_OBJECT_LENGTH
            | AemCommandType::SET_STREAM_BACKUP
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// READ/WRITE HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn model_error_status(err: &ModelError) -> AemStatus {
    match err {
        ModelError::NoSuchDescriptor { .. } | ModelError::UnknownDescriptorType(_) => {
            AemStatus::NoSuchDescriptor
        }
        ModelError::DescriptorTooLarge(_) => AemStatus::NoResources,
        ModelError::InvariantViolation(_) => AemStatus::BadArguments,
        _ => AemStatus::EntityMisbehaving,
    }
}

fn read_descriptor(payload: &[u8], model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = ReadDescriptorCommand::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let Some(descriptor_type) = DescriptorType::from_u16(request.descriptor_type) else {
        return (AemStatus::NoSuchDescriptor, payload.to_vec(), false);
    };
    match model.read_descriptor(descriptor_type, request.descriptor_index) {
        Ok(raw) => (
            AemStatus::Success,
            read_descriptor_response(request.configuration_index, &raw),
            false,
        ),
        Err(err) => (model_error_status(&err), payload.to_vec(), false),
    }
}

fn set_configuration(payload: &[u8], model: &mut EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = ConfigurationPayload::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let count = model.entity().map(|e| e.configurations_count).unwrap_or(0);
    if request.configuration_index >= count {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    }
    let changed = model.dynamic.current_configuration != request.configuration_index;
    match model.set_configuration(request.configuration_index) {
        Ok(()) => (
            AemStatus::Success,
            ConfigurationPayload {
                configuration_index: request.configuration_index,
            }
            .build(),
            changed,
        ),
        Err(err) => (model_error_status(&err), payload.to_vec(), false),
    }
}

fn get_configuration(model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    (
        AemStatus::Success,
        ConfigurationPayload {
            configuration_index: model.dynamic.current_configuration,
        }
        .build(),
        false,
    )
}

fn stream_selector(
    payload: &[u8],
    model: &EntityModel,
) -> Result<(DescriptorType, u16), (AemStatus, Vec<u8>, bool)> {
    let request = DescriptorSelector::parse(payload)
        .map_err(|_| (AemStatus::BadArguments, payload.to_vec(), false))?;
    let descriptor_type = match DescriptorType::from_u16(request.descriptor_type) {
        Some(t @ (DescriptorType::StreamInput | DescriptorType::StreamOutput)) => t,
        _ => return Err((AemStatus::BadArguments, payload.to_vec(), false)),
    };
    if model
        .stream_runtime(descriptor_type, request.descriptor_index)
        .is_none()
    {
        return Err((AemStatus::NoSuchDescriptor, payload.to_vec(), false));
    }
    Ok((descriptor_type, request.descriptor_index))
}

fn set_stream_format(payload: &[u8], model: &mut EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = StreamFormatPayload::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let (descriptor_type, index) =
        match stream_selector(&payload[..4.min(payload.len())], model) {
            Ok(sel) => sel,
            Err(reject) => return reject,
        };
    let running = model
        .stream_runtime(descriptor_type, index)
        .map(|rt| rt.streaming_active)
        .unwrap_or(false);
    if running {
        return (AemStatus::StreamIsRunning, payload.to_vec(), false);
    }
    match model.set_stream_format(descriptor_type, index, request.stream_format) {
        Ok(()) => (AemStatus::Success, request.build(), true),
        Err(err) => (model_error_status(&err), payload.to_vec(), false),
    }
}

fn get_stream_format(payload: &[u8], model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let (descriptor_type, index) = match stream_selector(payload, model) {
        Ok(sel) => sel,
        Err(reject) => return reject,
    };
    let format = model
        .stream_runtime(descriptor_type, index)
        .map(|rt| rt.stream_format)
        .unwrap_or(0);
    (
        AemStatus::Success,
        StreamFormatPayload {
            descriptor_type: descriptor_type.as_u16(),
            descriptor_index: index,
            stream_format: format,
        }
        .build(),
        false,
    )
}

fn set_stream_info(payload: &[u8], model: &mut EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = StreamInfoPayload::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let (descriptor_type, index) =
        match stream_selector(&payload[..4.min(payload.len())], model) {
            Ok(sel) => sel,
            Err(reject) => return reject,
        };
    let Some(rt) = model.stream_runtime_mut(descriptor_type, index) else {
        return (AemStatus::NoSuchDescriptor, payload.to_vec(), false);
    };

    let mut changed = false;
    if request.flags.contains(StreamInfoFlags::STREAM_ID_VALID) {
        changed |= rt.stream_id != request.stream_id;
        rt.stream_id = request.stream_id;
    }
    if request.flags.contains(StreamInfoFlags::STREAM_DEST_MAC_VALID) {
        changed |= rt.stream_dest_mac != request.stream_dest_mac;
        rt.stream_dest_mac = request.stream_dest_mac;
    }
    if request.flags.contains(StreamInfoFlags::STREAM_VLAN_ID_VALID) {
        changed |= rt.stream_vlan_id != request.stream_vlan_id;
        rt.stream_vlan_id = request.stream_vlan_id;
    }
    if request.flags.contains(StreamInfoFlags::MSRP_ACC_LAT_VALID) {
        changed |= rt.msrp_accumulated_latency != request.msrp_accumulated_latency;
        rt.msrp_accumulated_latency = request.msrp_accumulated_latency;
    }

    let (status, body, _) = get_stream_info(&payload[..4.min(payload.len())], model);
    (status, body, changed)
}

fn get_stream_info(payload: &[u8], model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let (descriptor_type, index) = match stream_selector(payload, model) {
        Ok(sel) => sel,
        Err(reject) => return reject,
    };
    let Some(rt) = model.stream_runtime(descriptor_type, index) else {
        return (AemStatus::NoSuchDescriptor, payload.to_vec(), false);
    };

    let mut flags = rt.flags | StreamInfoFlags::STREAM_FORMAT_VALID;
    if !rt.stream_id.is_unspecified() {
        flags |= StreamInfoFlags::STREAM_ID_VALID | StreamInfoFlags::CONNECTED;
    }
    if rt.stream_dest_mac != rf_avdecc_pdu::MacAddress::ZERO {
        flags |= StreamInfoFlags::STREAM_DEST_MAC_VALID;
    }
    if rt.stream_vlan_id != 0 {
        flags |= StreamInfoFlags::STREAM_VLAN_ID_VALID;
    }

    (
        AemStatus::Success,
        StreamInfoPayload {
            descriptor_type: descriptor_type.as_u16(),
            descriptor_index: index,
            flags,
            stream_format: rt.stream_format,
            stream_id: rt.stream_id,
            msrp_accumulated_latency: rt.msrp_accumulated_latency,
            stream_dest_mac: rt.stream_dest_mac,
            msrp_failure_code: rt.msrp_failure_code,
            msrp_failure_bridge_id: rt.msrp_failure_bridge_id,
            stream_vlan_id: rt.stream_vlan_id,
        }
        .build(),
        false,
    )
}

fn set_streaming(
    payload: &[u8],
    model: &mut EntityModel,
    active: bool,
) -> (AemStatus, Vec<u8>, bool) {
    let (descriptor_type, index) = match stream_selector(payload, model) {
        Ok(sel) => sel,
        Err(reject) => return reject,
    };
    let Some(rt) = model.stream_runtime_mut(descriptor_type, index) else {
        return (AemStatus::NoSuchDescriptor, payload.to_vec(), false);
    };
    let changed = rt.streaming_active != active;
    rt.streaming_active = active;
    (
        AemStatus::Success,
        DescriptorSelector {
            descriptor_type: descriptor_type.as_u16(),
            descriptor_index: index,
        }
        .build(),
        changed,
    )
}

fn get_avb_info(payload: &[u8], model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = DescriptorSelector::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    if request.descriptor_type != DescriptorType::AvbInterface.as_u16() {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    }
    let Some(rt) = model
        .dynamic
        .avb_interfaces
        .get(request.descriptor_index as usize)
    else {
        return (AemStatus::NoSuchDescriptor, payload.to_vec(), false);
    };
    (
        AemStatus::Success,
        AvbInfoPayload {
            descriptor_type: request.descriptor_type,
            descriptor_index: request.descriptor_index,
            gptp_grandmaster_id: rt.gptp_grandmaster_id,
            propagation_delay: rt.propagation_delay,
            gptp_domain_number: rt.gptp_domain_number,
            flags: rt.flags,
            msrp_mappings: Vec::new(),
        }
        .build(),
        false,
    )
}

fn get_audio_map(payload: &[u8], model: &EntityModel) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = GetAudioMapCommand::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let number_of_maps = model.store().count_of(DescriptorType::AudioMap);
    match model.store().get(DescriptorType::AudioMap, request.map_index) {
        Some(rf_avdecc_model::Descriptor::AudioMap(map)) => (
            AemStatus::Success,
            GetAudioMapResponse {
                descriptor_type: request.descriptor_type,
                descriptor_index: request.descriptor_index,
                map_index: request.map_index,
                number_of_maps,
                mappings: map.mappings.clone(),
            }
            .build(),
            false,
        ),
        _ => (AemStatus::NoSuchDescriptor, payload.to_vec(), false),
    }
}

fn audio_mappings(
    payload: &[u8],
    model: &mut EntityModel,
    add: bool,
) -> (AemStatus, Vec<u8>, bool) {
    let Ok(request) = AudioMappingsPayload::parse(payload) else {
        return (AemStatus::BadArguments, payload.to_vec(), false);
    };
    let result = if add {
        model.add_audio_mappings(request.map_index, &request.mappings)
    } else {
        model.remove_audio_mappings(request.map_index, &request.mappings)
    };
    match result {
        Ok(()) => (AemStatus::Success, request.build(), true),
        Err(err) => {
            warn!("audio map mutation rejected: {err}");
            (model_error_status(&err), payload.to_vec(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_avdecc_model::{
        AudioClusterDescriptor, AudioMapDescriptor, AvbInterfaceDescriptor, Descriptor,
        EntityDescriptor, EntityModelBuilder, StreamDescriptor,
    };
    use rf_avdecc_pdu::capabilities::EntityCapabilities;

    const LOCAL: EntityId = EntityId(0x0001_0203_0405_0607);
    const C1: EntityId = EntityId(0x1111_1111_1111_1111);
    const C2: EntityId = EntityId(0x2222_2222_2222_2222);

    fn model() -> EntityModel {
        let entity = EntityDescriptor {
            entity_id: LOCAL,
            entity_capabilities: EntityCapabilities::AEM_SUPPORTED,
            ..Default::default()
        };
        let stream = StreamDescriptor {
            object_name: "Stream".into(),
            current_format: 0x0205_0008_0040_0000,
            formats: vec![0x0205_0008_0040_0000, 0x0205_0002_0040_0000],
            ..Default::default()
        };
        let mut builder = EntityModelBuilder::new(entity);
        builder
            .configuration("Default")
            .add(Descriptor::StreamInput(stream.clone()))
            .add(Descriptor::StreamOutput(stream))
            .add(Descriptor::AvbInterface(AvbInterfaceDescriptor {
                clock_identity: EntityId(0x0022_9700_FFFE_0001),
                ..Default::default()
            }))
            .add(Descriptor::AudioCluster(AudioClusterDescriptor {
                channel_count: 8,
                ..Default::default()
            }))
            .add(Descriptor::AudioMap(AudioMapDescriptor::default()));
        builder.build().unwrap()
    }

    fn engine() -> AecpEngine {
        AecpEngine::new(LOCAL, &EngineConfig::default())
    }

    fn command(controller: EntityId, ct: AemCommandType, payload: Vec<u8>) -> AecpPdu {
        AecpPdu::command(LOCAL, controller, 1, ct, payload)
    }

    fn last_response(out: &AecpEmissions) -> AecpPdu {
        let (_, bytes) = out.last().unwrap();
        match rf_avdecc_pdu::Frame::decode(bytes).unwrap() {
            rf_avdecc_pdu::Frame::Aecp(pdu) => pdu,
            other => panic!("expected AECP, got {other:?}"),
        }
    }

    #[test]
    fn test_acquire_then_conflict_then_release() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        let acquire = OwnershipPayload {
            flags: 0,
            owner_id: EntityId::UNSPECIFIED,
            descriptor_type: 0,
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::ACQUIRE_ENTITY, acquire.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::Success);
        assert_eq!(m.dynamic.acquire.owner(), Some(C1));

        // C2 mutating command is gated.
        let set_cfg = ConfigurationPayload {
            configuration_index: 0,
        };
        aecp.handle_command(
            &command(C2, AemCommandType::SET_CONFIGURATION, set_cfg.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::EntityAcquired);

        // C2 reads still succeed.
        let read = ReadDescriptorCommand {
            configuration_index: 0,
            descriptor_type: 0,
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C2, AemCommandType::READ_DESCRIPTOR, read.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::Success);

        // Release by owner.
        let release = OwnershipPayload {
            flags: acquire_flags::RELEASE,
            ..acquire
        };
        aecp.handle_command(
            &command(C1, AemCommandType::ACQUIRE_ENTITY, release.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::Success);
        assert_eq!(m.dynamic.acquire, AcquireState::NotAcquired);
    }

    #[test]
    fn test_lock_expires_after_inactivity() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        let lock = OwnershipPayload {
            flags: 0,
            owner_id: EntityId::UNSPECIFIED,
            descriptor_type: 0,
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::LOCK_ENTITY, lock.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(m.dynamic.lock.holder(), Some(C1));

        // Just before expiry the lock still gates C2.
        aecp.tick(&mut m, now + Duration::from_secs(59));
        assert_eq!(m.dynamic.lock.holder(), Some(C1));

        aecp.tick(&mut m, now + Duration::from_secs(60));
        assert_eq!(m.dynamic.lock, LockState::NotLocked);
    }

    #[test]
    fn test_lock_refreshed_by_holder_activity() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        let lock = OwnershipPayload {
            flags: 0,
            owner_id: EntityId::UNSPECIFIED,
            descriptor_type: 0,
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::LOCK_ENTITY, lock.build()),
            &mut m,
            now,
            &mut out,
        );

        // Activity at +50 s pushes expiry to +110 s.
        let read = ReadDescriptorCommand {
            configuration_index: 0,
            descriptor_type: 0,
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::READ_DESCRIPTOR, read.build()),
            &mut m,
            now + Duration::from_secs(50),
            &mut out,
        );
        aecp.tick(&mut m, now + Duration::from_secs(100));
        assert_eq!(m.dynamic.lock.holder(), Some(C1));
        aecp.tick(&mut m, now + Duration::from_secs(110));
        assert_eq!(m.dynamic.lock, LockState::NotLocked);
    }

    #[test]
    fn test_read_descriptor_unknown_index() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let read = ReadDescriptorCommand {
            configuration_index: 0,
            descriptor_type: DescriptorType::StreamInput.as_u16(),
            descriptor_index: 42,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::READ_DESCRIPTOR, read.build()),
            &mut m,
            Instant::now(),
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::NoSuchDescriptor);
    }

    #[test]
    fn test_set_stream_format_rejected_while_running() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        let start = DescriptorSelector {
            descriptor_type: DescriptorType::StreamInput.as_u16(),
            descriptor_index: 0,
        };
        let changed = aecp.handle_command(
            &command(C1, AemCommandType::START_STREAMING, start.build()),
            &mut m,
            now,
            &mut out,
        );
        assert!(changed);

        let set = StreamFormatPayload {
            descriptor_type: DescriptorType::StreamInput.as_u16(),
            descriptor_index: 0,
            stream_format: 0x0205_0002_0040_0000,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::SET_STREAM_FORMAT, set.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::StreamIsRunning);
    }

    #[test]
    fn test_unsolicited_notifications_fan_out() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        aecp.handle_command(
            &command(C2, AemCommandType::REGISTER_UNSOLICITED_NOTIFICATION, vec![]),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(aecp.subscribers(), &[C2]);
        out.clear();

        // C1 starts streaming: C2 gets the unsolicited copy.
        let start = DescriptorSelector {
            descriptor_type: DescriptorType::StreamOutput.as_u16(),
            descriptor_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::START_STREAMING, start.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(out.len(), 2);
        let notification = last_response(&out);
        assert!(notification.unsolicited);
        assert_eq!(notification.controller_entity_id, C2);
        assert_eq!(notification.command_type, AemCommandType::START_STREAMING);
    }

    #[test]
    fn test_unknown_command_not_implemented() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        aecp.handle_command(
            &command(C1, AemCommandType::GET_COUNTERS, vec![0, 0, 0, 0]),
            &mut m,
            Instant::now(),
            &mut out,
        );
        let resp = last_response(&out);
        assert_eq!(resp.status, AemStatus::NotImplemented);
        assert_eq!(resp.payload, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_other_targets_ignored() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let mut pdu = command(C1, AemCommandType::ENTITY_AVAILABLE, vec![]);
        pdu.target_entity_id = EntityId(0x9999);
        aecp.handle_command(&pdu, &mut m, Instant::now(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_controller_send_and_complete() {
        let mut aecp = engine();
        let mut out = Vec::new();
        let now = Instant::now();

        let seq = aecp
            .send_command(
                EntityId(0xAA),
                AemCommandType::GET_CONFIGURATION,
                vec![],
                AemCompletion::App { op: 9 },
                now,
                &mut out,
            )
            .unwrap();

        let response = AecpPdu {
            message_type: rf_avdecc_pdu::AecpMessageType::AemResponse,
            status: AemStatus::Success,
            target_entity_id: EntityId(0xAA),
            controller_entity_id: LOCAL,
            sequence_id: seq,
            unsolicited: false,
            command_type: AemCommandType::GET_CONFIGURATION,
            payload: vec![0, 0, 0, 1],
        };
        match aecp.handle_response(response.clone()) {
            AemIngress::Completed(AemCompletion::App { op }, from, outcome) => {
                assert_eq!(op, 9);
                assert_eq!(from, EntityId(0xAA));
                assert!(matches!(outcome, AemOutcome::Response { status: AemStatus::Success, .. }));
            }
            other => panic!("unexpected routing: {other:?}"),
        }
        // Duplicate drops.
        assert_eq!(aecp.handle_response(response), AemIngress::Dropped);
    }

    #[test]
    fn test_audio_map_commands() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();
        let mapping = rf_avdecc_model::AudioMapping {
            stream_index: 0,
            stream_channel: 2,
            cluster_offset: 0,
            cluster_channel: 2,
        };

        let add = AudioMappingsPayload {
            descriptor_type: DescriptorType::StreamPortInput.as_u16(),
            descriptor_index: 0,
            map_index: 0,
            mappings: vec![mapping],
        };
        let changed = aecp.handle_command(
            &command(C1, AemCommandType::ADD_AUDIO_MAPPINGS, add.build()),
            &mut m,
            now,
            &mut out,
        );
        assert!(changed);
        assert_eq!(last_response(&out).status, AemStatus::Success);

        let get = GetAudioMapCommand {
            descriptor_type: DescriptorType::StreamPortInput.as_u16(),
            descriptor_index: 0,
            map_index: 0,
        };
        aecp.handle_command(
            &command(C1, AemCommandType::GET_AUDIO_MAP, get.build()),
            &mut m,
            now,
            &mut out,
        );
        let resp = last_response(&out);
        assert_eq!(resp.status, AemStatus::Success);
        let decoded = crate::aem_payload::GetAudioMapResponse::parse(&resp.payload).unwrap();
        assert_eq!(decoded.mappings, vec![mapping]);

        let remove = AudioMappingsPayload {
            mappings: vec![mapping],
            ..add
        };
        aecp.handle_command(
            &command(C1, AemCommandType::REMOVE_AUDIO_MAPPINGS, remove.build()),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::Success);

        aecp.handle_command(
            &command(C1, AemCommandType::GET_AUDIO_MAP, get.build()),
            &mut m,
            now,
            &mut out,
        );
        let decoded =
            crate::aem_payload::GetAudioMapResponse::parse(&last_response(&out).payload).unwrap();
        assert!(decoded.mappings.is_empty());
    }

    #[test]
    fn test_get_dynamic_info_batch() {
        let mut aecp = engine();
        let mut m = model();
        let mut out = Vec::new();
        let now = Instant::now();

        let batch = build_dynamic_info(&[
            DynamicInfoRecord {
                command_type: AemCommandType::GET_CONFIGURATION,
                payload: vec![],
            },
            DynamicInfoRecord {
                command_type: AemCommandType::GET_AVB_INFO,
                payload: DescriptorSelector {
                    descriptor_type: DescriptorType::AvbInterface.as_u16(),
                    descriptor_index: 0,
                }
                .build(),
            },
        ]);
        aecp.handle_command(
            &command(C1, AemCommandType::GET_DYNAMIC_INFO, batch),
            &mut m,
            now,
            &mut out,
        );
        let resp = last_response(&out);
        assert_eq!(resp.status, AemStatus::Success);
        let records = parse_dynamic_info(&resp.payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].command_type, AemCommandType::GET_CONFIGURATION);
        let avb = crate::aem_payload::AvbInfoPayload::parse(&records[1].payload).unwrap();
        assert_eq!(avb.gptp_grandmaster_id, EntityId(0x0022_9700_FFFE_0001));

        // One unsupported sub-query fails the whole batch.
        let bad = build_dynamic_info(&[DynamicInfoRecord {
            command_type: AemCommandType::GET_COUNTERS,
            payload: vec![],
        }]);
        aecp.handle_command(
            &command(C1, AemCommandType::GET_DYNAMIC_INFO, bad),
            &mut m,
            now,
            &mut out,
        );
        assert_eq!(last_response(&out).status, AemStatus::NotSupported);
    }

    #[test]
    fn test_controller_timeout_after_retries() {
        let config = EngineConfig::default();
        let mut aecp = engine();
        let mut out = Vec::new();
        let start = Instant::now();

        aecp.send_command(
            EntityId(0xAA),
            AemCommandType::ENTITY_AVAILABLE,
            vec![],
            AemCompletion::App { op: 4 },
            start,
            &mut out,
        )
        .unwrap();

        // Two retries, then failure on the third deadline.
        assert!(aecp.expire(start + config.aecp_timeout(), &mut out).is_empty());
        assert!(aecp.expire(start + config.aecp_timeout() * 2, &mut out).is_empty());
        let failed = aecp.expire(start + config.aecp_timeout() * 3, &mut out);
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].2, AemOutcome::TimedOut { attempts: 3 }));
    }
}
