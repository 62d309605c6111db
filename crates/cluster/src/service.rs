use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::link::{MasterHub, PeerEvent, PeerLink};
use crate::master::{Ack, Master, MasterConfig, MasterError};
use crate::peer::{FrameContext, PeerDirective, PeerNode};
use crate::protocol::{ClientMessage, PeerId, TrackingData};

/// Rendering seam the peer control loop drives.
///
/// Implementations own their render targets outright: created when the wall
/// is assigned, destroyed on drop. `render` must only touch the offscreen
/// target; the visible swap happens exclusively in `present`.
pub trait RenderBackend {
    /// Renders one simulation instant into the offscreen target.
    fn render(&mut self, context: &FrameContext) -> Result<()>;
    /// Swaps the offscreen target to the visible framebuffer.
    fn present(&mut self, frame: u64) -> Result<()>;
}

/// What happened during one barrier tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Peers evicted because their ack missed the deadline.
    pub evicted: Vec<PeerId>,
    /// Peers whose link went away during the tick.
    pub departed: Vec<PeerId>,
    /// Wall-clock duration from StartFrame broadcast to barrier completion.
    pub round_trip: Duration,
}

/// Master control loop: owns the barrier state machine and the hub.
///
/// This is the only place in the system that blocks waiting on other nodes,
/// and it blocks with a bounded deadline unless strict-stall was explicitly
/// configured.
pub struct MasterService {
    master: Master,
    hub: MasterHub,
}

impl MasterService {
    pub fn new(config: MasterConfig) -> Self {
        Self {
            master: Master::new(config),
            hub: MasterHub::new(),
        }
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Registers a peer and opens its link. Registration takes effect from
    /// the next tick.
    pub fn connect_peer(&mut self, id: PeerId) -> PeerLink {
        self.master.register_peer(id.clone());
        self.hub.connect(id)
    }

    /// Runs one full simulation tick: StartFrame broadcast, ack barrier,
    /// stall policy, DisplayFrame broadcast.
    pub fn run_frame(
        &mut self,
        delta_time: f64,
        tracking: TrackingData,
    ) -> Result<FrameReport, MasterError> {
        let started = Instant::now();
        let begin = self.master.begin_frame(started, delta_time, tracking)?;
        for message in &begin.messages {
            self.hub.broadcast(message);
        }

        let mut evicted = Vec::new();
        let mut departed = Vec::new();
        while self.master.awaiting().is_some() {
            let event = match self.master.deadline() {
                Some(deadline) => self.hub.recv_deadline(deadline).ok(),
                // Strict-stall: wait as long as it takes. Disconnects still
                // arrive here, so a vanished peer cannot deadlock the tick.
                None => match self.hub.recv() {
                    Some(event) => Some(event),
                    None => {
                        tracing::error!("hub inbound channel closed while awaiting acks");
                        break;
                    }
                },
            };

            match event {
                Some(PeerEvent::Message { peer, message }) => {
                    let ClientMessage::FrameReady { frame } = message;
                    match self.master.frame_ready(&peer, frame) {
                        Ack::Completed(display) => self.hub.broadcast(&display),
                        Ack::Recorded => {}
                        Ack::Stale => {
                            tracing::warn!(%peer, frame, "ignoring stale frameReady");
                        }
                        Ack::UnknownPeer => {
                            tracing::warn!(%peer, frame, "frameReady from unregistered peer");
                        }
                    }
                }
                Some(PeerEvent::Disconnected { peer }) => {
                    tracing::warn!(%peer, frame = begin.frame, "peer disconnected mid-frame");
                    self.hub.disconnect(&peer);
                    if let Some(display) = self.master.peer_departed(&peer) {
                        self.hub.broadcast(&display);
                    }
                    departed.push(peer);
                }
                None => {
                    if let Some(eviction) = self.master.poll_deadline(Instant::now()) {
                        for peer in &eviction.evicted {
                            tracing::warn!(%peer, frame = begin.frame, "evicting peer after ack timeout");
                            self.hub.disconnect(peer);
                        }
                        self.hub.broadcast(&eviction.display);
                        evicted.extend(eviction.evicted);
                    }
                }
            }
        }

        Ok(FrameReport {
            frame: begin.frame,
            evicted,
            departed,
            round_trip: started.elapsed(),
        })
    }
}

/// Peer control loop: drives a `PeerNode` against its link until the master
/// goes away. The loop never waits on other peers; only the present step is
/// gated, and only by the master's `DisplayFrame`.
pub fn run_peer(link: PeerLink, mut node: PeerNode, backend: &mut dyn RenderBackend) -> Result<()> {
    loop {
        let message = match link.recv() {
            Some(message) => message,
            None => break,
        };
        match node.on_message(message) {
            PeerDirective::Render(context) => {
                let frame = context.frame;
                backend
                    .render(&context)
                    .with_context(|| format!("rendering frame {frame} offscreen"))?;
                if let Some(ready) = node.frame_rendered(frame) {
                    if !link.send(ready) {
                        break;
                    }
                }
            }
            PeerDirective::Present { frame } => {
                backend
                    .present(frame)
                    .with_context(|| format!("presenting frame {frame}"))?;
            }
            PeerDirective::Ignored => {
                tracing::warn!(peer = %node.id(), "ignoring duplicate or out-of-order cluster message");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::StallPolicy;

    fn fast_config() -> MasterConfig {
        MasterConfig {
            ack_timeout: Duration::from_millis(20),
            stall_policy: StallPolicy::PresentStale,
        }
    }

    #[test]
    fn tick_without_peers_completes_immediately() {
        let mut service = MasterService::new(fast_config());
        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert_eq!(report.frame, 0);
        assert!(report.evicted.is_empty());
        assert!(report.departed.is_empty());
    }

    #[test]
    fn silent_peer_is_evicted_on_deadline() {
        let mut service = MasterService::new(fast_config());
        let _link = service.connect_peer(PeerId::new("silent"));

        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert_eq!(report.evicted, vec![PeerId::new("silent")]);
        assert_eq!(service.master().peers().count(), 0);
    }

    #[test]
    fn dropped_link_counts_as_departure_not_timeout() {
        let mut service = MasterService::new(fast_config());
        let link = service.connect_peer(PeerId::new("gone"));
        drop(link);

        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.departed, vec![PeerId::new("gone")]);
    }

    #[test]
    fn strict_stall_completes_when_the_last_peer_departs() {
        let mut service = MasterService::new(MasterConfig {
            ack_timeout: Duration::from_millis(20),
            stall_policy: StallPolicy::StrictStall,
        });
        let link = service.connect_peer(PeerId::new("gone"));
        drop(link);

        // Would hang forever under strict-stall if departure did not
        // unblock the barrier.
        let report = service
            .run_frame(1.0 / 60.0, TrackingData::default())
            .unwrap();
        assert_eq!(report.departed, vec![PeerId::new("gone")]);
    }
}
