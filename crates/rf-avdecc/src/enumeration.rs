//! Controller enumeration pipeline
//!
//! One cooperative session per remote entity: each completion drives
//! the next read, so a session never has more than one command in
//! flight. The fixed order is liveness probe → unsolicited
//! registration (best effort) → ENTITY descriptor → current
//! CONFIGURATION → per-type descriptor sweep → dynamic stream/AVB
//! reads. Sessions for different entities run concurrently.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};

use rf_avdecc_pdu::{AemCommandType, AemStatus, EntityId};

use rf_avdecc_model::{
    ConfigurationDescriptor, Descriptor, DescriptorStore, DescriptorType, EntityDescriptor,
};

use crate::aecp::AemOutcome;
use crate::aem_payload::{
    AvbInfoPayload, DescriptorSelector, ReadDescriptorCommand, StreamInfoPayload,
};

/// Everything learned about a remote entity
#[derive(Debug, Clone, Default)]
pub struct RemoteEntityModel {
    pub entity: Option<EntityDescriptor>,
    pub configuration: Option<ConfigurationDescriptor>,
    pub descriptors: DescriptorStore,
    /// GET_STREAM_INFO results; each carries its own type/index words
    pub stream_info: Vec<StreamInfoPayload>,
    pub avb_info: Vec<AvbInfoPayload>,
}

/// Where a session is in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Probe,
    Register,
    ReadEntity,
    ReadConfiguration,
    ReadDescriptors,
    DynamicInfo,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum DynamicRead {
    StreamInfo { type_code: u16, index: u16 },
    AvbInfo { index: u16 },
}

#[derive(Debug)]
struct Session {
    state: State,
    model: RemoteEntityModel,
    pending: VecDeque<(u16, u16)>,
    dynamic_pending: VecDeque<DynamicRead>,
    current_configuration: u16,
}

/// The next command a session wants sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AemRequest {
    pub target: EntityId,
    pub command_type: AemCommandType,
    pub payload: Vec<u8>,
}

/// Result of feeding a completion into the driver
#[derive(Debug, Clone, PartialEq)]
pub enum EnumerationUpdate {
    /// Send this next
    Request(AemRequest),
    /// Pipeline finished for the entity
    Completed(EntityId),
    /// Fatal failure; the partial model is kept
    Failed(EntityId, String),
    /// Nothing to do (unknown session)
    Idle,
}

/// All enumeration sessions of one controller
#[derive(Debug, Default)]
pub struct EnumerationDriver {
    sessions: HashMap<EntityId, Session>,
}

impl EnumerationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or restart) enumeration of an entity. Returns the first
    /// command to send.
    pub fn start(&mut self, entity: EntityId) -> AemRequest {
        self.sessions.insert(
            entity,
            Session {
                state: State::Probe,
                model: RemoteEntityModel::default(),
                pending: VecDeque::new(),
                dynamic_pending: VecDeque::new(),
                current_configuration: 0,
            },
        );
        AemRequest {
            target: entity,
            command_type: AemCommandType::ENTITY_AVAILABLE,
            payload: Vec::new(),
        }
    }

    /// Drop cached state (entity departed or rebooted).
    pub fn forget(&mut self, entity: EntityId) {
        self.sessions.remove(&entity);
    }

    pub fn is_enumerating(&self, entity: EntityId) -> bool {
        self.sessions
            .get(&entity)
            .is_some_and(|s| s.state != State::Complete && s.state != State::Failed)
    }

    pub fn model(&self, entity: EntityId) -> Option<&RemoteEntityModel> {
        self.sessions.get(&entity).map(|s| &s.model)
    }

    /// Feed one AEM completion for `entity` into its session.
    pub fn on_result(
        &mut self,
        entity: EntityId,
        outcome: &AemOutcome,
    ) -> EnumerationUpdate {
        let Some(session) = self.sessions.get_mut(&entity) else {
            return EnumerationUpdate::Idle;
        };

        let (status, payload) = match outcome {
            AemOutcome::Response {
                status, payload, ..
            } => (*status, payload.as_slice()),
            AemOutcome::TimedOut { attempts } => {
                return match session.state {
                    // Registration is best effort; dynamic reads are
                    // tolerated as missing.
                    State::Register => {
                        session.state = State::ReadEntity;
                        EnumerationUpdate::Request(read_descriptor_request(
                            entity,
                            0,
                            DescriptorType::Entity.as_u16(),
                            0,
                        ))
                    }
                    State::DynamicInfo => Self::advance_dynamic(entity, session),
                    _ => {
                        session.state = State::Failed;
                        EnumerationUpdate::Failed(
                            entity,
                            format!("timed out after {attempts} attempts"),
                        )
                    }
                };
            }
        };

        match session.state {
            State::Probe => {
                if status != AemStatus::Success {
                    session.state = State::Failed;
                    return EnumerationUpdate::Failed(entity, format!("probe failed: {status:?}"));
                }
                session.state = State::Register;
                EnumerationUpdate::Request(AemRequest {
                    target: entity,
                    command_type: AemCommandType::REGISTER_UNSOLICITED_NOTIFICATION,
                    payload: Vec::new(),
                })
            }
            State::Register => {
                if status != AemStatus::Success {
                    debug!("{entity}: unsolicited registration refused ({status:?})");
                }
                session.state = State::ReadEntity;
                EnumerationUpdate::Request(read_descriptor_request(
                    entity,
                    0,
                    DescriptorType::Entity.as_u16(),
                    0,
                ))
            }
            State::ReadEntity => {
                if status != AemStatus::Success {
                    session.state = State::Failed;
                    return EnumerationUpdate::Failed(
                        entity,
                        format!("ENTITY read failed: {status:?}"),
                    );
                }
                match parse_descriptor_payload(payload) {
                    Some(Descriptor::Entity(desc)) => {
                        session.current_configuration = desc.current_configuration;
                        session.model.entity = Some(desc);
                        session.state = State::ReadConfiguration;
                        EnumerationUpdate::Request(read_descriptor_request(
                            entity,
                            session.current_configuration,
                            DescriptorType::Configuration.as_u16(),
                            session.current_configuration,
                        ))
                    }
                    _ => {
                        session.state = State::Failed;
                        EnumerationUpdate::Failed(entity, "malformed ENTITY descriptor".into())
                    }
                }
            }
            State::ReadConfiguration => {
                if status != AemStatus::Success {
                    session.state = State::Failed;
                    return EnumerationUpdate::Failed(
                        entity,
                        format!("CONFIGURATION read failed: {status:?}"),
                    );
                }
                match parse_descriptor_payload(payload) {
                    Some(Descriptor::Configuration(config)) => {
                        for (type_code, count) in &config.descriptor_counts {
                            for index in 0..*count {
                                session.pending.push_back((*type_code, index));
                            }
                            let dynamic = match DescriptorType::from_u16(*type_code) {
                                Some(
                                    t @ (DescriptorType::StreamInput
                                    | DescriptorType::StreamOutput),
                                ) => (0..*count)
                                    .map(|index| DynamicRead::StreamInfo {
                                        type_code: t.as_u16(),
                                        index,
                                    })
                                    .collect(),
                                Some(DescriptorType::AvbInterface) => (0..*count)
                                    .map(|index| DynamicRead::AvbInfo { index })
                                    .collect(),
                                _ => Vec::new(),
                            };
                            session.dynamic_pending.extend(dynamic);
                        }
                        session.model.configuration = Some(config);
                        session.state = State::ReadDescriptors;
                        Self::advance_descriptors(entity, session)
                    }
                    _ => {
                        session.state = State::Failed;
                        EnumerationUpdate::Failed(
                            entity,
                            "malformed CONFIGURATION descriptor".into(),
                        )
                    }
                }
            }
            State::ReadDescriptors => {
                match status {
                    AemStatus::Success => {
                        if let Some((index, descriptor)) = parse_indexed_descriptor(payload) {
                            session.model.descriptors.insert(index, descriptor);
                        } else {
                            debug!("{entity}: skipping undecodable descriptor");
                        }
                    }
                    AemStatus::NoSuchDescriptor => {
                        warn!("{entity}: advertised descriptor missing, skipping");
                    }
                    other => {
                        session.state = State::Failed;
                        return EnumerationUpdate::Failed(
                            entity,
                            format!("descriptor sweep failed: {other:?}"),
                        );
                    }
                }
                Self::advance_descriptors(entity, session)
            }
            State::DynamicInfo => {
                if status == AemStatus::Success {
                    Self::record_dynamic(session, payload);
                } else {
                    debug!("{entity}: dynamic read refused ({status:?})");
                }
                Self::advance_dynamic(entity, session)
            }
            State::Complete | State::Failed => EnumerationUpdate::Idle,
        }
    }

    fn advance_descriptors(entity: EntityId, session: &mut Session) -> EnumerationUpdate {
        if let Some((type_code, index)) = session.pending.pop_front() {
            return EnumerationUpdate::Request(read_descriptor_request(
                entity,
                session.current_configuration,
                type_code,
                index,
            ));
        }
        session.state = State::DynamicInfo;
        Self::advance_dynamic(entity, session)
    }

    fn advance_dynamic(entity: EntityId, session: &mut Session) -> EnumerationUpdate {
        match session.dynamic_pending.pop_front() {
            Some(DynamicRead::StreamInfo { type_code, index }) => {
                EnumerationUpdate::Request(AemRequest {
                    target: entity,
                    command_type: AemCommandType::GET_STREAM_INFO,
                    payload: DescriptorSelector {
                        descriptor_type: type_code,
                        descriptor_index: index,
                    }
                    .build(),
                })
            }
            Some(DynamicRead::AvbInfo { index }) => EnumerationUpdate::Request(AemRequest {
                target: entity,
                command_type: AemCommandType::GET_AVB_INFO,
                payload: DescriptorSelector {
                    descriptor_type: DescriptorType::AvbInterface.as_u16(),
                    descriptor_index: index,
                }
                .build(),
            }),
            None => {
                session.state = State::Complete;
                EnumerationUpdate::Completed(entity)
            }
        }
    }

    fn record_dynamic(session: &mut Session, payload: &[u8]) {
        // The two dynamic reads are distinguishable by their leading
        // descriptor_type word.
        if let Ok(info) = StreamInfoPayload::parse(payload) {
            if info.descriptor_type == DescriptorType::StreamInput.as_u16()
                || info.descriptor_type == DescriptorType::StreamOutput.as_u16()
            {
                session.model.stream_info.push(info);
                return;
            }
        }
        if let Ok(info) = AvbInfoPayload::parse(payload) {
            if info.descriptor_type == DescriptorType::AvbInterface.as_u16() {
                session.model.avb_info.push(info);
            }
        }
    }
}

fn read_descriptor_request(
    entity: EntityId,
    configuration_index: u16,
    descriptor_type: u16,
    descriptor_index: u16,
) -> AemRequest {
    AemRequest {
        target: entity,
        command_type: AemCommandType::READ_DESCRIPTOR,
        payload: ReadDescriptorCommand {
            configuration_index,
            descriptor_type,
            descriptor_index,
        }
        .build(),
    }
}

/// Strip the configuration echo and decode the descriptor body of a
/// READ_DESCRIPTOR response.
fn parse_descriptor_payload(payload: &[u8]) -> Option<Descriptor> {
    parse_indexed_descriptor(payload).map(|(_, d)| d)
}

fn parse_indexed_descriptor(payload: &[u8]) -> Option<(u16, Descriptor)> {
    if payload.len() < 4 {
        return None;
    }
    Descriptor::decode(&payload[4..]).ok()
}
