//! Bounded egress queue
//!
//! All emissions pass through here so backpressure has one policy:
//! overflow evicts the oldest command frame first, then the oldest
//! periodic advertisement, and never a response to a received command.

use std::collections::VecDeque;

use log::{debug, warn};
use rf_avdecc_pdu::MacAddress;

use crate::error::{EngineError, EngineResult};
use crate::net::{NetworkInterface, SendError};

/// Eviction class of a queued frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Response to a received command; never evicted
    Response,
    /// Self-originated command or notification
    Command,
    /// Periodic ENTITY_AVAILABLE
    Advertise,
}

#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub dest: MacAddress,
    pub bytes: Vec<u8>,
    pub class: FrameClass,
    requeued: bool,
}

/// Bounded FIFO with class-aware eviction
#[derive(Debug)]
pub struct SendQueue {
    frames: VecDeque<QueuedFrame>,
    capacity: usize,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Enqueue a frame, evicting per policy when full.
    pub fn push(&mut self, dest: MacAddress, bytes: Vec<u8>, class: FrameClass) {
        if self.frames.len() >= self.capacity && !self.evict_one() {
            // Only responses left; an unbounded queue is worse than a
            // lost frame.
            warn!("send queue full of responses, dropping {class:?} frame");
            return;
        }
        self.frames.push_back(QueuedFrame {
            dest,
            bytes,
            class,
            requeued: false,
        });
    }

    fn evict_one(&mut self) -> bool {
        for victim_class in [FrameClass::Command, FrameClass::Advertise] {
            if let Some(pos) = self.frames.iter().position(|f| f.class == victim_class) {
                debug!("send queue overflow, evicting oldest {victim_class:?} frame");
                self.frames.remove(pos);
                return true;
            }
        }
        false
    }

    /// Push everything to the interface. WouldBlock leaves the rest
    /// queued; a failed frame is requeued once; Down is fatal.
    pub fn flush<N: NetworkInterface>(&mut self, net: &mut N) -> EngineResult<()> {
        while let Some(frame) = self.frames.pop_front() {
            match net.send(frame.dest, &frame.bytes) {
                Ok(()) => {}
                Err(SendError::WouldBlock) => {
                    self.frames.push_front(frame);
                    break;
                }
                Err(SendError::Failed(reason)) => {
                    if frame.requeued {
                        warn!("dropping frame after repeated send failure: {reason}");
                    } else {
                        debug!("send failed ({reason}), requeueing once");
                        let mut retry = frame;
                        retry.requeued = true;
                        self.frames.push_back(retry);
                    }
                }
                Err(SendError::Down) => return Err(EngineError::TransportDown),
            }
        }
        Ok(())
    }
}
