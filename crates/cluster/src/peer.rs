use crate::protocol::{ClientMessage, PeerId, ServerMessage, TrackingData};

/// Everything a peer needs to render one simulation instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameContext {
    pub frame: u64,
    pub time: f64,
    pub delta_time: f64,
    pub tracking: TrackingData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Idle,
    Rendering { frame: u64 },
    AwaitingDisplay { frame: u64 },
}

/// What the peer's control loop must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerDirective {
    /// Render into the offscreen target, then report via `frame_rendered`.
    Render(FrameContext),
    /// Swap the offscreen target to the visible framebuffer.
    Present { frame: u64 },
    /// Duplicate or mismatched message; drop it, state is unchanged.
    Ignored,
}

/// Peer side of the frame-lock barrier.
///
/// Mirrors the master: a pure state machine fed one message at a time.
/// Presenting is only ever directed by a matching `DisplayFrame`.
pub struct PeerNode {
    id: PeerId,
    phase: PeerPhase,
    time: f64,
}

impl PeerNode {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            phase: PeerPhase::Idle,
            time: 0.0,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn phase(&self) -> PeerPhase {
        self.phase
    }

    /// Simulation clock, adopted from the master on every `StartFrame`.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn on_message(&mut self, message: ServerMessage) -> PeerDirective {
        match message {
            ServerMessage::StartFrame {
                frame,
                time,
                delta_time,
                tracking_data,
            } => {
                // A new tick supersedes whatever the peer was doing; after
                // an eviction the master may already be frames ahead.
                self.time = time;
                self.phase = PeerPhase::Rendering { frame };
                PeerDirective::Render(FrameContext {
                    frame,
                    time,
                    delta_time,
                    tracking: tracking_data,
                })
            }
            ServerMessage::DisplayFrame { frame } => match self.phase {
                PeerPhase::AwaitingDisplay { frame: awaited } if awaited == frame => {
                    self.phase = PeerPhase::Idle;
                    PeerDirective::Present { frame }
                }
                _ => PeerDirective::Ignored,
            },
        }
    }

    /// Marks the offscreen render of `frame` finished, yielding the
    /// `FrameReady` ack to send. `None` when the render no longer matches
    /// the current phase (superseded mid-render).
    pub fn frame_rendered(&mut self, frame: u64) -> Option<ClientMessage> {
        match self.phase {
            PeerPhase::Rendering { frame: current } if current == frame => {
                self.phase = PeerPhase::AwaitingDisplay { frame };
                Some(ClientMessage::FrameReady { frame })
            }
            _ => None,
        }
    }
}
