//! AVDECC protocol engine (IEEE 1722.1-2021)
//!
//! Discovers entities on a bridged LAN, advertises a local entity,
//! establishes and tears down stream connections between talkers and
//! listeners, and enumerates/controls remote entities through AEM
//! descriptor reads and commands.
//!
//! The engine is a single cooperatively scheduled loop over three
//! protocol state machines:
//! - ADP advertising/discovery with validity-time tracking
//! - ACMP controller/talker/listener machines with sequence-id
//!   correlation and retry
//! - AECP/AEM command dispatch with inflight tracking, unsolicited
//!   notifications and acquire/lock ownership
//!
//! I/O and time are injected: implement [`NetworkInterface`] over your
//! raw-socket/PCAP layer and pick a [`Clock`]. Applications hold a
//! [`Handle`] and talk to the engine thread over its command and event
//! queues.
//!
//! ```rust,ignore
//! let model = EntityModelBuilder::new(entity_descriptor)
//!     .configuration("Default")
//!     /* …descriptors… */
//!     .build()?;
//! let (mut engine, handle) = Engine::new(model, EngineConfig::default(), net, MonotonicClock);
//! std::thread::spawn(move || engine.run());
//!
//! let op = handle.connect_stream(talker_id, 0, listener_id, 0)?;
//! while let Some(event) = handle.recv_event_timeout(Duration::from_secs(1)) {
//!     /* completions, discovery events, notifications */
//! }
//! ```

pub mod acmp;
pub mod adp;
pub mod aecp;
pub mod aem_payload;
pub mod clock;
pub mod config;
pub mod engine;
pub mod enumeration;
pub mod error;
pub mod inflight;
pub mod net;
pub mod sendq;

// Re-exports
pub use acmp::{AcmpEngine, AcmpOutcome, ListenerBinding, OpId, TalkerStream};
pub use adp::{Advertiser, Discovery, DiscoveryEvent, RemoteEntity};
pub use aecp::{AecpEngine, AemCompletion, AemIngress, AemOutcome};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::EngineConfig;
pub use engine::{Engine, EngineCommand, EngineEvent, Handle};
pub use enumeration::{AemRequest, EnumerationDriver, EnumerationUpdate, RemoteEntityModel};
pub use error::{EngineError, EngineResult};
pub use net::{NetworkInterface, SendError};
pub use sendq::{FrameClass, SendQueue};
