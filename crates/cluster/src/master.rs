use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::protocol::{PeerId, ServerMessage, TrackingData};

/// What the master does with a frame whose acks did not arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StallPolicy {
    /// Evict the stalled peers and present with whoever acknowledged.
    #[default]
    PresentStale,
    /// Wait indefinitely, sacrificing liveness for strict sync.
    StrictStall,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterConfig {
    pub ack_timeout: Duration,
    pub stall_policy: StallPolicy,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(250),
            stall_policy: StallPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error("frame {0} is still awaiting acknowledgements")]
    BarrierInFlight(u64),
}

/// Outcome of recording a `FrameReady` acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// Recorded; the barrier still waits on other peers.
    Recorded,
    /// This ack completed the barrier; broadcast the enclosed message.
    Completed(ServerMessage),
    /// Duplicate or out-of-order ack for a closed frame; ignored.
    Stale,
    /// The sender is not a registered peer.
    UnknownPeer,
}

/// Result of an expired ack deadline under [`StallPolicy::PresentStale`].
#[derive(Debug, Clone, PartialEq)]
pub struct Eviction {
    pub evicted: Vec<PeerId>,
    pub display: ServerMessage,
}

/// Messages opening one simulation tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginFrame {
    pub frame: u64,
    /// Broadcast in order. Contains the `StartFrame`, plus an immediate
    /// `DisplayFrame` when no peers are registered (the barrier is
    /// trivially complete).
    pub messages: Vec<ServerMessage>,
}

/// Master side of the frame-lock barrier.
///
/// Pure state machine: every transition is an explicit method taking a
/// message or a timestamp, returning what to broadcast. The owning control
/// loop does all sending, receiving, and waiting.
pub struct Master {
    config: MasterConfig,
    peers: BTreeSet<PeerId>,
    frame: u64,
    time: f64,
    inflight: Option<Inflight>,
}

#[derive(Debug)]
struct Inflight {
    frame: u64,
    /// Registered peers that have not acknowledged yet.
    pending: BTreeSet<PeerId>,
    deadline: Instant,
}

impl Master {
    pub fn new(config: MasterConfig) -> Self {
        Self {
            config,
            peers: BTreeSet::new(),
            frame: 0,
            time: 0.0,
            inflight: None,
        }
    }

    /// Registers a peer. Takes effect from the next tick; an in-flight
    /// barrier never grows retroactively.
    pub fn register_peer(&mut self, peer: PeerId) -> bool {
        self.peers.insert(peer)
    }

    pub fn stall_policy(&self) -> StallPolicy {
        self.config.stall_policy
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }

    /// Frame number the next tick will carry.
    pub fn next_frame(&self) -> u64 {
        self.frame
    }

    /// Simulation clock in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Frame currently awaiting acknowledgements, if any.
    pub fn awaiting(&self) -> Option<u64> {
        self.inflight.as_ref().map(|inflight| inflight.frame)
    }

    /// Ack deadline for the in-flight frame. `None` when idle or when the
    /// stall policy is strict (the wait is deliberately unbounded then).
    pub fn deadline(&self) -> Option<Instant> {
        if self.config.stall_policy == StallPolicy::StrictStall {
            return None;
        }
        self.inflight.as_ref().map(|inflight| inflight.deadline)
    }

    /// Opens the barrier for the next simulation tick, advancing the clock
    /// by `delta_time`.
    pub fn begin_frame(
        &mut self,
        now: Instant,
        delta_time: f64,
        tracking: TrackingData,
    ) -> Result<BeginFrame, MasterError> {
        if let Some(inflight) = &self.inflight {
            return Err(MasterError::BarrierInFlight(inflight.frame));
        }

        let frame = self.frame;
        self.frame += 1;
        self.time += delta_time;

        let start = ServerMessage::StartFrame {
            frame,
            time: self.time,
            delta_time,
            tracking_data: tracking,
        };

        if self.peers.is_empty() {
            return Ok(BeginFrame {
                frame,
                messages: vec![start, ServerMessage::DisplayFrame { frame }],
            });
        }

        self.inflight = Some(Inflight {
            frame,
            pending: self.peers.clone(),
            deadline: now + self.config.ack_timeout,
        });
        Ok(BeginFrame {
            frame,
            messages: vec![start],
        })
    }

    /// Records a `FrameReady` acknowledgement.
    pub fn frame_ready(&mut self, peer: &PeerId, frame: u64) -> Ack {
        if !self.peers.contains(peer) {
            return Ack::UnknownPeer;
        }
        let inflight = match self.inflight.as_mut() {
            Some(inflight) => inflight,
            None => return Ack::Stale,
        };
        if inflight.frame != frame || !inflight.pending.remove(peer) {
            return Ack::Stale;
        }
        if inflight.pending.is_empty() {
            self.inflight = None;
            Ack::Completed(ServerMessage::DisplayFrame { frame })
        } else {
            Ack::Recorded
        }
    }

    /// Removes a departed peer from the registry and from the in-flight
    /// pending set. Returns the `DisplayFrame` broadcast when that peer was
    /// the last holdout of the barrier.
    pub fn peer_departed(&mut self, peer: &PeerId) -> Option<ServerMessage> {
        self.peers.remove(peer);
        let inflight = self.inflight.as_mut()?;
        inflight.pending.remove(peer);
        if inflight.pending.is_empty() {
            let frame = inflight.frame;
            self.inflight = None;
            Some(ServerMessage::DisplayFrame { frame })
        } else {
            None
        }
    }

    /// Applies the stall policy once the ack deadline passed. Under
    /// present-stale this evicts every peer still pending and completes the
    /// barrier; under strict-stall it never fires.
    pub fn poll_deadline(&mut self, now: Instant) -> Option<Eviction> {
        if self.config.stall_policy == StallPolicy::StrictStall {
            return None;
        }
        match self.inflight.take() {
            Some(inflight) if now >= inflight.deadline => {
                let evicted: Vec<PeerId> = inflight.pending.into_iter().collect();
                for peer in &evicted {
                    self.peers.remove(peer);
                }
                Some(Eviction {
                    evicted,
                    display: ServerMessage::DisplayFrame {
                        frame: inflight.frame,
                    },
                })
            }
            inflight => {
                self.inflight = inflight;
                None
            }
        }
    }
}
