//! ACMP engine
//!
//! Three roles over one PDU family:
//! - controller: connect/disconnect/state reads with inflight retry
//! - talker: owns per-output connection sets and stream addressing
//! - listener: binds inputs, relaying controller commands to the
//!   talker as a nested inflight (two-phase connect)
//!
//! All traffic is multicast; commands not addressed to this entity are
//! ignored rather than rejected, so absent peers time out instead of
//! drawing strays.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use rf_avdecc_pdu::{
    AcmpMessageType, AcmpPdu, AcmpStatus, ConnectionFlags, EntityId, MacAddress, StreamId,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::inflight::InflightTable;
use crate::sendq::FrameClass;

/// Application operation token
pub type OpId = u32;

/// Completion of a controller-side ACMP operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcmpOutcome {
    Response(AcmpPdu),
    TimedOut { attempts: u8 },
}

/// Frames emitted by the ACMP engine within one dispatch
pub type AcmpEmissions = Vec<(FrameClass, Vec<u8>)>;

#[derive(Debug, Clone)]
struct ControllerTag {
    op: OpId,
    expect: AcmpMessageType,
}

/// Per stream-output connection bookkeeping
#[derive(Debug, Clone, Default)]
pub struct TalkerStream {
    pub stream_id: StreamId,
    pub stream_dest_mac: MacAddress,
    pub stream_vlan_id: u16,
    pub flags: ConnectionFlags,
    /// (listener_entity_id, listener_unique_id) pairs
    pub connections: Vec<(EntityId, u16)>,
    /// Accept a single listener only
    pub exclusive: bool,
}

/// Per stream-input binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerBinding {
    pub talker_entity_id: EntityId,
    pub talker_unique_id: u16,
    pub stream_id: StreamId,
    pub stream_dest_mac: MacAddress,
    pub stream_vlan_id: u16,
    pub flags: ConnectionFlags,
}

#[derive(Debug, Clone, Default)]
struct ListenerSink {
    bound: Option<ListenerBinding>,
}

/// The ACMP engine for one local entity
#[derive(Debug)]
pub struct AcmpEngine {
    local_entity_id: EntityId,
    controller_inflight: InflightTable<ControllerTag>,
    /// Listener→talker relays awaiting the talker's response; the tag
    /// is the original controller command to answer.
    relay_inflight: InflightTable<AcmpPdu>,
    talkers: Vec<TalkerStream>,
    listeners: Vec<ListenerSink>,
    timeout: Duration,
    retries: u8,
    stream_vlan_id: u16,
}

impl AcmpEngine {
    pub fn new(
        local_entity_id: EntityId,
        stream_outputs: usize,
        stream_inputs: usize,
        config: &EngineConfig,
    ) -> Self {
        Self {
            local_entity_id,
            controller_inflight: InflightTable::new(config.inflight_capacity),
            relay_inflight: InflightTable::new(config.inflight_capacity),
            talkers: vec![TalkerStream::default(); stream_outputs],
            listeners: vec![ListenerSink::default(); stream_inputs],
            timeout: config.acmp_timeout(),
            retries: config.acmp_retries,
            stream_vlan_id: config.stream_vlan_id,
        }
    }

    /// Mark a stream output as single-listener.
    pub fn set_exclusive(&mut self, output_index: u16, exclusive: bool) {
        if let Some(stream) = self.talkers.get_mut(output_index as usize) {
            stream.exclusive = exclusive;
        }
    }

    pub fn talker_stream(&self, output_index: u16) -> Option<&TalkerStream> {
        self.talkers.get(output_index as usize)
    }

    pub fn listener_binding(&self, input_index: u16) -> Option<&ListenerBinding> {
        self.listeners
            .get(input_index as usize)
            .and_then(|sink| sink.bound.as_ref())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTROLLER SIDE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start a stream connection: CONNECT_RX_COMMAND to the listener.
    #[allow(clippy::too_many_arguments)]
    pub fn connect_stream(
        &mut self,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        self.controller_command(
            AcmpMessageType::ConnectRxCommand,
            talker,
            talker_unique_id,
            listener,
            listener_unique_id,
            listener,
            op,
            now,
            out,
        )
    }

    /// Tear a connection down: DISCONNECT_RX_COMMAND to the listener.
    #[allow(clippy::too_many_arguments)]
    pub fn disconnect_stream(
        &mut self,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        self.controller_command(
            AcmpMessageType::DisconnectRxCommand,
            talker,
            talker_unique_id,
            listener,
            listener_unique_id,
            listener,
            op,
            now,
            out,
        )
    }

    pub fn get_tx_state(
        &mut self,
        talker: EntityId,
        talker_unique_id: u16,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        self.controller_command(
            AcmpMessageType::GetTxStateCommand,
            talker,
            talker_unique_id,
            EntityId::UNSPECIFIED,
            0,
            talker,
            op,
            now,
            out,
        )
    }

    pub fn get_rx_state(
        &mut self,
        listener: EntityId,
        listener_unique_id: u16,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        self.controller_command(
            AcmpMessageType::GetRxStateCommand,
            EntityId::UNSPECIFIED,
            0,
            listener,
            listener_unique_id,
            listener,
            op,
            now,
            out,
        )
    }

    /// Query the nth connection of a talker output.
    #[allow(clippy::too_many_arguments)]
    pub fn get_tx_connection(
        &mut self,
        talker: EntityId,
        talker_unique_id: u16,
        connection_index: u16,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        let mut pdu = AcmpPdu::command(
            AcmpMessageType::GetTxConnectionCommand,
            self.local_entity_id,
            talker,
            talker_unique_id,
            EntityId::UNSPECIFIED,
            0,
            0,
        );
        pdu.connection_count = connection_index;
        self.send_controller_pdu(pdu, talker, op, now, out)
    }

    #[allow(clippy::too_many_arguments)]
    fn controller_command(
        &mut self,
        message_type: AcmpMessageType,
        talker: EntityId,
        talker_unique_id: u16,
        listener: EntityId,
        listener_unique_id: u16,
        target: EntityId,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        let pdu = AcmpPdu::command(
            message_type,
            self.local_entity_id,
            talker,
            talker_unique_id,
            listener,
            listener_unique_id,
            0,
        );
        self.send_controller_pdu(pdu, target, op, now, out)
    }

    fn send_controller_pdu(
        &mut self,
        mut pdu: AcmpPdu,
        target: EntityId,
        op: OpId,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> EngineResult<u16> {
        let sequence_id = self.controller_inflight.next_sequence_id();
        pdu.sequence_id = sequence_id;
        let bytes = pdu.encode();
        let tag = ControllerTag {
            op,
            expect: pdu.message_type.response(),
        };
        if !self.controller_inflight.insert(
            sequence_id,
            target,
            bytes.clone(),
            now,
            self.timeout,
            self.retries,
            tag,
        ) {
            return Err(EngineError::InflightFull);
        }
        out.push((FrameClass::Command, bytes));
        Ok(sequence_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INGRESS DISPATCH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Process one ACMP frame. Returns controller completions.
    pub fn handle_frame(
        &mut self,
        pdu: AcmpPdu,
        now: Instant,
        out: &mut AcmpEmissions,
    ) -> Vec<(OpId, AcmpOutcome)> {
        if pdu.message_type.is_command() {
            self.handle_command(pdu, now, out);
            Vec::new()
        } else {
            self.handle_response(pdu, out)
        }
    }

    fn handle_command(&mut self, pdu: AcmpPdu, now: Instant, out: &mut AcmpEmissions) {
        match pdu.message_type {
            AcmpMessageType::ConnectTxCommand
            | AcmpMessageType::DisconnectTxCommand
            | AcmpMessageType::GetTxStateCommand
            | AcmpMessageType::GetTxConnectionCommand => {
                // Talker role; multicast traffic for other talkers is
                // not ours to answer.
                if pdu.talker_entity_id != self.local_entity_id {
                    return;
                }
                let response = self.talker_command(&pdu);
                out.push((FrameClass::Response, response.encode()));
            }
            AcmpMessageType::ConnectRxCommand
            | AcmpMessageType::DisconnectRxCommand
            | AcmpMessageType::GetRxStateCommand => {
                if pdu.listener_entity_id != self.local_entity_id {
                    return;
                }
                self.listener_command(pdu, now, out);
            }
            _ => {}
        }
    }

    fn handle_response(
        &mut self,
        pdu: AcmpPdu,
        out: &mut AcmpEmissions,
    ) -> Vec<(OpId, AcmpOutcome)> {
        // Controller completions first: our own commands carry our
        // entity id in the controller field.
        if pdu.controller_entity_id == self.local_entity_id {
            let peer = match pdu.message_type {
                AcmpMessageType::ConnectRxResponse
                | AcmpMessageType::DisconnectRxResponse
                | AcmpMessageType::GetRxStateResponse => pdu.listener_entity_id,
                _ => pdu.talker_entity_id,
            };
            if let Some(entry) = self.controller_inflight.complete(pdu.sequence_id, |e| {
                e.target == peer && e.tag.expect == pdu.message_type
            }) {
                return vec![(entry.tag.op, AcmpOutcome::Response(pdu))];
            }
        }

        // Listener relay: the talker answered a command we forwarded.
        if pdu.listener_entity_id == self.local_entity_id {
            match pdu.message_type {
                AcmpMessageType::ConnectTxResponse | AcmpMessageType::DisconnectTxResponse => {
                    self.relay_response(pdu, out);
                }
                _ => {}
            }
        } else {
            debug!("dropping stray ACMP response seq={}", pdu.sequence_id);
        }
        Vec::new()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TALKER ROLE
    // ═══════════════════════════════════════════════════════════════════════════

    fn derived_dest_mac(&self, unique_id: u16) -> MacAddress {
        // MAAP is out of scope; addresses derive deterministically from
        // the talker identity.
        MacAddress([
            0x91,
            0xE0,
            0xF0,
            0x00,
            (self.local_entity_id.0 >> 56) as u8,
            unique_id as u8,
        ])
    }

    fn derived_stream_id(&self, unique_id: u16) -> StreamId {
        let mac = self.derived_dest_mac(unique_id);
        let mut value: u64 = 0;
        for octet in mac.0 {
            value = (value << 8) | u64::from(octet);
        }
        StreamId((value << 16) | u64::from(unique_id))
    }

    fn talker_command(&mut self, pdu: &AcmpPdu) -> AcmpPdu {
        let unique_id = pdu.talker_unique_id;
        let vlan_id = self.stream_vlan_id;
        let stream_id = self.derived_stream_id(unique_id);
        let dest_mac = self.derived_dest_mac(unique_id);

        let Some(stream) = self.talkers.get_mut(unique_id as usize) else {
            return pdu.response(AcmpStatus::TalkerNoStreamIndex);
        };

        match pdu.message_type {
            AcmpMessageType::ConnectTxCommand => {
                let pair = (pdu.listener_entity_id, pdu.listener_unique_id);
                if stream.exclusive
                    && !stream.connections.is_empty()
                    && !stream.connections.contains(&pair)
                {
                    return pdu.response(AcmpStatus::TalkerExclusive);
                }
                if stream.connections.is_empty() {
                    stream.stream_id = stream_id;
                    stream.stream_dest_mac = dest_mac;
                    stream.stream_vlan_id = vlan_id;
                    stream.flags = pdu.flags;
                }
                if !stream.connections.contains(&pair) {
                    stream.connections.push(pair);
                }
                info!(
                    "talker output {unique_id} connected to {}:{} ({} total)",
                    pair.0,
                    pair.1,
                    stream.connections.len()
                );
                let mut resp = pdu.response(AcmpStatus::Success);
                resp.stream_id = stream.stream_id;
                resp.stream_dest_mac = stream.stream_dest_mac;
                resp.stream_vlan_id = stream.stream_vlan_id;
                resp.connection_count = stream.connections.len() as u16;
                resp
            }
            AcmpMessageType::DisconnectTxCommand => {
                let pair = (pdu.listener_entity_id, pdu.listener_unique_id);
                let Some(pos) = stream.connections.iter().position(|c| *c == pair) else {
                    return pdu.response(AcmpStatus::NoSuchConnection);
                };
                stream.connections.remove(pos);
                info!(
                    "talker output {unique_id} disconnected from {}:{} ({} left)",
                    pair.0,
                    pair.1,
                    stream.connections.len()
                );
                let mut resp = pdu.response(AcmpStatus::Success);
                resp.stream_id = stream.stream_id;
                resp.stream_dest_mac = stream.stream_dest_mac;
                resp.stream_vlan_id = stream.stream_vlan_id;
                resp.connection_count = stream.connections.len() as u16;
                resp
            }
            AcmpMessageType::GetTxStateCommand => {
                let mut resp = pdu.response(AcmpStatus::Success);
                resp.stream_id = stream.stream_id;
                resp.stream_dest_mac = stream.stream_dest_mac;
                resp.stream_vlan_id = stream.stream_vlan_id;
                resp.flags = stream.flags;
                resp.connection_count = stream.connections.len() as u16;
                resp
            }
            AcmpMessageType::GetTxConnectionCommand => {
                let index = pdu.connection_count as usize;
                let Some((listener, listener_unique)) = stream.connections.get(index).copied()
                else {
                    return pdu.response(AcmpStatus::NoSuchConnection);
                };
                let mut resp = pdu.response(AcmpStatus::Success);
                resp.listener_entity_id = listener;
                resp.listener_unique_id = listener_unique;
                resp.stream_id = stream.stream_id;
                resp.stream_dest_mac = stream.stream_dest_mac;
                resp.stream_vlan_id = stream.stream_vlan_id;
                resp.flags = stream.flags;
                resp
            }
            _ => pdu.response(AcmpStatus::NotSupported),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LISTENER ROLE
    // ═══════════════════════════════════════════════════════════════════════════

    fn listener_command(&mut self, pdu: AcmpPdu, now: Instant, out: &mut AcmpEmissions) {
        let unique_id = pdu.listener_unique_id as usize;
        if unique_id >= self.listeners.len() {
            out.push((
                FrameClass::Response,
                pdu.response(AcmpStatus::ListenerUnknownId).encode(),
            ));
            return;
        }

        match pdu.message_type {
            AcmpMessageType::ConnectRxCommand => {
                match &self.listeners[unique_id].bound {
                    Some(binding)
                        if binding.talker_entity_id == pdu.talker_entity_id
                            && binding.talker_unique_id == pdu.talker_unique_id =>
                    {
                        // Already bound to this talker; answer from
                        // local state.
                        let mut resp = pdu.response(AcmpStatus::Success);
                        resp.stream_id = binding.stream_id;
                        resp.stream_dest_mac = binding.stream_dest_mac;
                        resp.stream_vlan_id = binding.stream_vlan_id;
                        resp.connection_count = 1;
                        out.push((FrameClass::Response, resp.encode()));
                    }
                    Some(_) => {
                        out.push((
                            FrameClass::Response,
                            pdu.response(AcmpStatus::ListenerExclusive).encode(),
                        ));
                    }
                    None => self.relay_to_talker(pdu, AcmpMessageType::ConnectTxCommand, now, out),
                }
            }
            AcmpMessageType::DisconnectRxCommand => {
                let matches = self.listeners[unique_id].bound.as_ref().is_some_and(|b| {
                    b.talker_entity_id == pdu.talker_entity_id
                        && b.talker_unique_id == pdu.talker_unique_id
                });
                if matches {
                    self.relay_to_talker(pdu, AcmpMessageType::DisconnectTxCommand, now, out);
                } else {
                    out.push((
                        FrameClass::Response,
                        pdu.response(AcmpStatus::NotConnected).encode(),
                    ));
                }
            }
            AcmpMessageType::GetRxStateCommand => {
                let mut resp = pdu.response(AcmpStatus::Success);
                if let Some(binding) = &self.listeners[unique_id].bound {
                    resp.talker_entity_id = binding.talker_entity_id;
                    resp.talker_unique_id = binding.talker_unique_id;
                    resp.stream_id = binding.stream_id;
                    resp.stream_dest_mac = binding.stream_dest_mac;
                    resp.stream_vlan_id = binding.stream_vlan_id;
                    resp.flags = binding.flags;
                    resp.connection_count = 1;
                } else {
                    resp.connection_count = 0;
                }
                out.push((FrameClass::Response, resp.encode()));
            }
            _ => {}
        }
    }

    /// Forward a controller RX command to the talker as the paired TX
    /// command, tracking it as a nested inflight.
    fn relay_to_talker(
        &mut self,
        original: AcmpPdu,
        forward_type: AcmpMessageType,
        now: Instant,
        out: &mut AcmpEmissions,
    ) {
        let sequence_id = self.relay_inflight.next_sequence_id();
        let mut forward = original.clone();
        forward.message_type = forward_type;
        forward.sequence_id = sequence_id;
        let bytes = forward.encode();

        if !self.relay_inflight.insert(
            sequence_id,
            original.talker_entity_id,
            bytes.clone(),
            now,
            self.timeout,
            self.retries,
            original.clone(),
        ) {
            warn!("listener relay table full, failing connect immediately");
            out.push((
                FrameClass::Response,
                original.response(AcmpStatus::StateUnavailable).encode(),
            ));
            return;
        }
        out.push((FrameClass::Command, bytes));
    }

    fn relay_response(&mut self, pdu: AcmpPdu, out: &mut AcmpEmissions) {
        let Some(entry) = self
            .relay_inflight
            .complete(pdu.sequence_id, |e| e.target == pdu.talker_entity_id)
        else {
            debug!("dropping duplicate talker response seq={}", pdu.sequence_id);
            return;
        };
        let original = entry.tag;
        let unique_id = original.listener_unique_id as usize;

        let mut resp = original.response(pdu.status);
        if pdu.status == AcmpStatus::Success {
            match pdu.message_type {
                AcmpMessageType::ConnectTxResponse => {
                    if let Some(sink) = self.listeners.get_mut(unique_id) {
                        sink.bound = Some(ListenerBinding {
                            talker_entity_id: pdu.talker_entity_id,
                            talker_unique_id: pdu.talker_unique_id,
                            stream_id: pdu.stream_id,
                            stream_dest_mac: pdu.stream_dest_mac,
                            stream_vlan_id: pdu.stream_vlan_id,
                            flags: pdu.flags,
                        });
                    }
                    resp.stream_id = pdu.stream_id;
                    resp.stream_dest_mac = pdu.stream_dest_mac;
                    resp.stream_vlan_id = pdu.stream_vlan_id;
                    resp.flags = pdu.flags;
                    resp.connection_count = pdu.connection_count;
                }
                AcmpMessageType::DisconnectTxResponse => {
                    if let Some(sink) = self.listeners.get_mut(unique_id) {
                        sink.bound = None;
                    }
                    resp.connection_count = pdu.connection_count;
                }
                _ => {}
            }
        }
        out.push((FrameClass::Response, resp.encode()));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TIMERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Expiry sweep over both inflight tables. Resends go out again;
    /// exhausted controller commands complete as TimedOut; exhausted
    /// relays answer the controller with LISTENER_TALKER_TIMEOUT.
    pub fn expire(&mut self, now: Instant, out: &mut AcmpEmissions) -> Vec<(OpId, AcmpOutcome)> {
        let mut completions = Vec::new();

        let swept = self.controller_inflight.expire(now);
        for bytes in swept.resend {
            out.push((FrameClass::Command, bytes));
        }
        for entry in swept.failed {
            debug!(
                "ACMP command seq={} to {} timed out after {} attempts",
                entry.sequence_id, entry.target, entry.attempts
            );
            completions.push((
                entry.tag.op,
                AcmpOutcome::TimedOut {
                    attempts: entry.attempts,
                },
            ));
        }

        let swept = self.relay_inflight.expire(now);
        for bytes in swept.resend {
            out.push((FrameClass::Command, bytes));
        }
        for entry in swept.failed {
            warn!(
                "talker {} never answered relayed command seq={}",
                entry.target, entry.sequence_id
            );
            out.push((
                FrameClass::Response,
                entry
                    .tag
                    .response(AcmpStatus::ListenerTalkerTimeout)
                    .encode(),
            ));
        }
        completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TALKER: EntityId = EntityId(0xAAAA_AAAA_AAAA_AAAA);
    const LISTENER: EntityId = EntityId(0xBBBB_BBBB_BBBB_BBBB);
    const CONTROLLER: EntityId = EntityId(0x1111_1111_1111_1111);

    fn talker_engine() -> AcmpEngine {
        AcmpEngine::new(TALKER, 2, 0, &EngineConfig::default())
    }

    fn listener_engine() -> AcmpEngine {
        AcmpEngine::new(LISTENER, 0, 2, &EngineConfig::default())
    }

    fn connect_tx(sequence_id: u16) -> AcmpPdu {
        AcmpPdu::command(
            AcmpMessageType::ConnectTxCommand,
            CONTROLLER,
            TALKER,
            0,
            LISTENER,
            0,
            sequence_id,
        )
    }

    fn decode_one(out: &AcmpEmissions, index: usize) -> AcmpPdu {
        match rf_avdecc_pdu::Frame::decode(&out[index].1).unwrap() {
            rf_avdecc_pdu::Frame::Acmp(pdu) => pdu,
            other => panic!("expected ACMP frame, got {other:?}"),
        }
    }

    #[test]
    fn test_talker_connect_assigns_derived_addresses() {
        let mut engine = talker_engine();
        let mut out = Vec::new();
        engine.handle_frame(connect_tx(100), Instant::now(), &mut out);

        let resp = decode_one(&out, 0);
        assert_eq!(resp.message_type, AcmpMessageType::ConnectTxResponse);
        assert_eq!(resp.status, AcmpStatus::Success);
        assert_eq!(resp.sequence_id, 100);
        assert_eq!(resp.stream_id, StreamId(0x91E0_F000_AA00_0000));
        assert_eq!(
            resp.stream_dest_mac,
            MacAddress([0x91, 0xE0, 0xF0, 0x00, 0xAA, 0x00])
        );
        assert_eq!(resp.connection_count, 1);
        assert_eq!(engine.talker_stream(0).unwrap().connections.len(), 1);
    }

    #[test]
    fn test_talker_ignores_other_talkers_commands() {
        let mut engine = talker_engine();
        let mut out = Vec::new();
        let mut pdu = connect_tx(1);
        pdu.talker_entity_id = EntityId(0xFFFF_FFFF_FFFF_FFFF);
        engine.handle_frame(pdu, Instant::now(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_talker_bad_unique_id_rejected() {
        let mut engine = talker_engine();
        let mut out = Vec::new();
        let mut pdu = connect_tx(1);
        pdu.talker_unique_id = 9;
        engine.handle_frame(pdu, Instant::now(), &mut out);
        assert_eq!(decode_one(&out, 0).status, AcmpStatus::TalkerNoStreamIndex);
    }

    #[test]
    fn test_talker_exclusive_rejects_second_listener() {
        let mut engine = talker_engine();
        engine.set_exclusive(0, true);
        let mut out = Vec::new();
        engine.handle_frame(connect_tx(1), Instant::now(), &mut out);

        let mut second = connect_tx(2);
        second.listener_entity_id = EntityId(0xCCCC);
        engine.handle_frame(second, Instant::now(), &mut out);
        assert_eq!(decode_one(&out, 1).status, AcmpStatus::TalkerExclusive);
    }

    #[test]
    fn test_talker_disconnect_and_no_such_connection() {
        let mut engine = talker_engine();
        let mut out = Vec::new();
        engine.handle_frame(connect_tx(1), Instant::now(), &mut out);

        let mut disconnect = connect_tx(2);
        disconnect.message_type = AcmpMessageType::DisconnectTxCommand;
        engine.handle_frame(disconnect.clone(), Instant::now(), &mut out);
        let resp = decode_one(&out, 1);
        assert_eq!(resp.status, AcmpStatus::Success);
        assert_eq!(resp.connection_count, 0);

        disconnect.sequence_id = 3;
        engine.handle_frame(disconnect, Instant::now(), &mut out);
        assert_eq!(decode_one(&out, 2).status, AcmpStatus::NoSuchConnection);
    }

    #[test]
    fn test_listener_two_phase_connect() {
        let mut engine = listener_engine();
        let mut out = Vec::new();
        let now = Instant::now();

        let rx = AcmpPdu::command(
            AcmpMessageType::ConnectRxCommand,
            CONTROLLER,
            TALKER,
            0,
            LISTENER,
            0,
            42,
        );
        engine.handle_frame(rx, now, &mut out);

        // Phase one: the relayed CONNECT_TX_COMMAND.
        let forwarded = decode_one(&out, 0);
        assert_eq!(forwarded.message_type, AcmpMessageType::ConnectTxCommand);
        assert_eq!(forwarded.controller_entity_id, CONTROLLER);
        assert_ne!(forwarded.sequence_id, 42);

        // Phase two: the talker answers; the listener binds and
        // restores the controller's sequence id.
        let mut talker_resp = forwarded.response(AcmpStatus::Success);
        talker_resp.stream_id = StreamId(0x91E0_F000_AA00_0000);
        talker_resp.stream_dest_mac = MacAddress([0x91, 0xE0, 0xF0, 0x00, 0xAA, 0x00]);
        talker_resp.connection_count = 1;
        engine.handle_frame(talker_resp, now, &mut out);

        let rx_resp = decode_one(&out, 1);
        assert_eq!(rx_resp.message_type, AcmpMessageType::ConnectRxResponse);
        assert_eq!(rx_resp.sequence_id, 42);
        assert_eq!(rx_resp.status, AcmpStatus::Success);
        assert_eq!(rx_resp.stream_id, StreamId(0x91E0_F000_AA00_0000));

        let binding = engine.listener_binding(0).unwrap();
        assert_eq!(binding.talker_entity_id, TALKER);
    }

    #[test]
    fn test_listener_exclusive_binding() {
        let mut engine = listener_engine();
        let mut out = Vec::new();
        let now = Instant::now();

        // Bind input 0 to TALKER via the two-phase flow.
        let rx = AcmpPdu::command(
            AcmpMessageType::ConnectRxCommand,
            CONTROLLER,
            TALKER,
            0,
            LISTENER,
            0,
            1,
        );
        engine.handle_frame(rx, now, &mut out);
        let forwarded = decode_one(&out, 0);
        engine.handle_frame(forwarded.response(AcmpStatus::Success), now, &mut out);

        // A different talker for the same input is refused locally.
        let other = AcmpPdu::command(
            AcmpMessageType::ConnectRxCommand,
            CONTROLLER,
            EntityId(0xCCCC),
            0,
            LISTENER,
            0,
            2,
        );
        engine.handle_frame(other, now, &mut out);
        assert_eq!(decode_one(&out, 2).status, AcmpStatus::ListenerExclusive);
    }

    #[test]
    fn test_listener_relay_timeout() {
        let config = EngineConfig::default();
        let mut engine = listener_engine();
        let mut out = Vec::new();
        let start = Instant::now();

        let rx = AcmpPdu::command(
            AcmpMessageType::ConnectRxCommand,
            CONTROLLER,
            TALKER,
            0,
            LISTENER,
            0,
            7,
        );
        engine.handle_frame(rx, start, &mut out);
        assert_eq!(out.len(), 1);

        // First expiry resends; second gives up and answers the
        // controller.
        let completions = engine.expire(start + config.acmp_timeout(), &mut out);
        assert!(completions.is_empty());
        assert_eq!(out.len(), 2);

        engine.expire(start + config.acmp_timeout() * 2, &mut out);
        let resp = decode_one(&out, 2);
        assert_eq!(resp.message_type, AcmpMessageType::ConnectRxResponse);
        assert_eq!(resp.status, AcmpStatus::ListenerTalkerTimeout);
        assert_eq!(resp.sequence_id, 7);
        assert!(engine.listener_binding(0).is_none());
    }

    #[test]
    fn test_controller_completion_and_timeout() {
        let config = EngineConfig::default();
        let mut engine = AcmpEngine::new(CONTROLLER, 0, 0, &config);
        let mut out = Vec::new();
        let start = Instant::now();

        let seq = engine
            .connect_stream(TALKER, 0, LISTENER, 0, 55, start, &mut out)
            .unwrap();
        let sent = decode_one(&out, 0);
        assert_eq!(sent.message_type, AcmpMessageType::ConnectRxCommand);

        // A matching response completes exactly once.
        let resp = sent.response(AcmpStatus::Success);
        let completions = engine.handle_frame(resp.clone(), start, &mut out);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].0, 55);
        assert!(matches!(
            completions[0].1,
            AcmpOutcome::Response(ref r) if r.sequence_id == seq
        ));

        // The duplicate is silently dropped.
        assert!(engine.handle_frame(resp, start, &mut out).is_empty());

        // A fresh command that never gets answered times out after the
        // retry budget.
        engine
            .connect_stream(TALKER, 1, LISTENER, 1, 56, start, &mut out)
            .unwrap();
        assert!(engine.expire(start + config.acmp_timeout(), &mut out).is_empty());
        let completions = engine.expire(start + config.acmp_timeout() * 2, &mut out);
        assert_eq!(
            completions,
            vec![(56, AcmpOutcome::TimedOut { attempts: 2 })]
        );
    }
}
