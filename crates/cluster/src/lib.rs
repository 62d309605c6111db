//! Cluster crate for cavewall.
//!
//! Keeps N render peers and one master in frame lock-step. Every simulation
//! tick runs a full barrier:
//!
//! ```text
//!   master ── StartFrame{frame, time, Δt, tracking} ──▶ every peer
//!     ▲                                                    │ renders offscreen
//!     └──────────────── FrameReady{frame} ◀────────────────┘
//!   master waits for all registered peers, then
//!   master ── DisplayFrame{frame} ──▶ every peer ──▶ swap to the display
//! ```
//!
//! Receiving `DisplayFrame` is the *only* event that lets a peer present,
//! so no peer ever shows a simulation instant another peer has not reached.
//! `Master` and `PeerNode` are pure message-driven state machines; the
//! channel hub in [`link`] and the control loops in [`service`] put them on
//! threads. A peer that misses the ack deadline is evicted for subsequent
//! frames (policy-controlled for the stalled one); a disconnected peer
//! leaves the pending-ack computation immediately.

pub mod link;
pub mod master;
pub mod peer;
pub mod protocol;
pub mod service;

pub use link::{MasterHub, PeerEvent, PeerLink};
pub use master::{Ack, BeginFrame, Eviction, Master, MasterConfig, MasterError, StallPolicy};
pub use peer::{FrameContext, PeerDirective, PeerNode, PeerPhase};
pub use protocol::{
    ClientMessage, PeerId, ProtocolError, ServerMessage, TrackingBody, TrackingData,
};
pub use service::{run_peer, FrameReport, MasterService, RenderBackend};
