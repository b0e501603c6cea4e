//! ADP engines
//!
//! Advertising side: IDLE → ADVERTISE (periodic) → DEPARTING, with an
//! immediate re-advertisement on every observable state change and on
//! matching discovery requests. Discovery side: WAITING → DISCOVER →
//! DISCOVERED cycle emitting periodic discovery requests and evicting
//! remote entities whose validity window lapsed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info};

use rf_avdecc_pdu::{AdpPdu, EntityId};

// ═══════════════════════════════════════════════════════════════════════════════
// ADVERTISING STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvertiseState {
    Idle,
    Advertising,
}

/// Local-entity advertising machine. The engine owns frame building;
/// this tracks only state and timing.
#[derive(Debug)]
pub struct Advertiser {
    state: AdvertiseState,
    interval: Duration,
    next_at: Option<Instant>,
}

impl Advertiser {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: AdvertiseState::Idle,
            interval,
            next_at: None,
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.state == AdvertiseState::Advertising
    }

    /// Enter ADVERTISE. Returns true when an immediate
    /// ENTITY_AVAILABLE must go out.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state == AdvertiseState::Advertising {
            return false;
        }
        self.state = AdvertiseState::Advertising;
        self.next_at = Some(now + self.interval);
        true
    }

    /// Leave ADVERTISE. Returns true when a one-shot ENTITY_DEPARTING
    /// must go out.
    pub fn stop(&mut self) -> bool {
        if self.state == AdvertiseState::Idle {
            return false;
        }
        self.state = AdvertiseState::Idle;
        self.next_at = None;
        true
    }

    /// Periodic timer. True when the interval elapsed and a periodic
    /// ENTITY_AVAILABLE is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.state != AdvertiseState::Advertising {
            return false;
        }
        match self.next_at {
            Some(at) if now >= at => {
                self.next_at = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Out-of-cycle advertisement (state change or discovery request):
    /// resets the periodic timer. True when one must go out now.
    pub fn advertise_now(&mut self, now: Instant) -> bool {
        if self.state != AdvertiseState::Advertising {
            return false;
        }
        self.next_at = Some(now + self.interval);
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// What happened to a remote entity on ingress or timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// First ENTITY_AVAILABLE from this entity id
    Discovered(EntityId),
    /// available_index advanced: state changed, re-read dynamic info
    Updated(EntityId),
    /// available_index went backwards: the entity rebooted, drop
    /// cached enumeration and start over
    Rediscovered(EntityId),
    /// ENTITY_DEPARTING received
    Departed(EntityId),
    /// Validity window lapsed without readvertisement
    TimedOut(EntityId),
}

impl DiscoveryEvent {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Discovered(id)
            | Self::Updated(id)
            | Self::Rediscovered(id)
            | Self::Departed(id)
            | Self::TimedOut(id) => *id,
        }
    }
}

/// Last known ADP state of a remote entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub adp: AdpPdu,
    pub last_seen: Instant,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryState {
    Waiting,
    Discover,
    Discovered,
}

/// Controller-side discovery machine and remote entity table
#[derive(Debug)]
pub struct Discovery {
    state: DiscoveryState,
    interval: Duration,
    next_discovery_at: Instant,
    entities: HashMap<EntityId, RemoteEntity>,
}

impl Discovery {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            state: DiscoveryState::Waiting,
            interval,
            next_discovery_at: now,
            entities: HashMap::new(),
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &RemoteEntity> + '_ {
        self.entities.values()
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&RemoteEntity> {
        self.entities.get(&entity_id)
    }

    /// Timer pass. Returns whether an ENTITY_DISCOVERY_REQUEST is due
    /// and the entities evicted on timeout.
    pub fn tick(&mut self, now: Instant) -> (bool, Vec<DiscoveryEvent>) {
        let mut events = Vec::new();

        if self.state == DiscoveryState::Discovered {
            let expired: Vec<EntityId> = self
                .entities
                .iter()
                .filter(|(_, e)| now >= e.expires_at)
                .map(|(id, _)| *id)
                .collect();
            for id in expired {
                self.entities.remove(&id);
                info!("remote entity {id} timed out");
                events.push(DiscoveryEvent::TimedOut(id));
            }
        }

        let discover = match self.state {
            DiscoveryState::Waiting | DiscoveryState::Discovered if now >= self.next_discovery_at => {
                self.state = DiscoveryState::Discover;
                true
            }
            _ => false,
        };
        if self.state == DiscoveryState::Discover {
            // DISCOVER emits and immediately settles into DISCOVERED.
            self.next_discovery_at = now + self.interval;
            self.state = DiscoveryState::Discovered;
        }
        (discover, events)
    }

    /// Ingress ENTITY_AVAILABLE.
    pub fn handle_available(&mut self, adp: AdpPdu, now: Instant) -> Option<DiscoveryEvent> {
        let entity_id = adp.entity_id;
        // valid_time is in 2 s wire units; the record survives twice
        // the advertised window.
        let validity = Duration::from_secs(u64::from(adp.valid_time) * 2);
        let expires_at = now + validity * 2;

        match self.entities.get_mut(&entity_id) {
            None => {
                self.entities.insert(
                    entity_id,
                    RemoteEntity {
                        adp,
                        last_seen: now,
                        expires_at,
                    },
                );
                info!("discovered entity {entity_id}");
                Some(DiscoveryEvent::Discovered(entity_id))
            }
            Some(known) => {
                let previous_index = known.adp.available_index;
                let new_index = adp.available_index;
                known.adp = adp;
                known.last_seen = now;
                known.expires_at = expires_at;
                if new_index < previous_index {
                    info!("entity {entity_id} rebooted (available_index went backwards)");
                    Some(DiscoveryEvent::Rediscovered(entity_id))
                } else if new_index != previous_index {
                    debug!("entity {entity_id} updated (available_index {new_index})");
                    Some(DiscoveryEvent::Updated(entity_id))
                } else {
                    None
                }
            }
        }
    }

    /// Ingress ENTITY_DEPARTING.
    pub fn handle_departing(&mut self, entity_id: EntityId) -> Option<DiscoveryEvent> {
        self.entities.remove(&entity_id).map(|_| {
            info!("entity {entity_id} departed");
            DiscoveryEvent::Departed(entity_id)
        })
    }
}
