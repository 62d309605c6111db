use std::collections::BTreeMap;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::protocol::{ClientMessage, PeerId, ServerMessage};

/// Inbound traffic on the master side of the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Message { peer: PeerId, message: ClientMessage },
    /// The peer side of the link went away.
    Disconnected { peer: PeerId },
}

/// Peer-side endpoint of a hub link: typed send/receive with the master.
///
/// Delivery on a link is reliable and ordered (the transport contract of
/// the protocol). Dropping the link tells the master the peer is gone, so
/// a vanished peer immediately leaves the pending-ack computation.
pub struct PeerLink {
    id: PeerId,
    outbound: Sender<PeerEvent>,
    inbound: Receiver<ServerMessage>,
}

impl PeerLink {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Sends a message to the master. Returns false when the master side
    /// has shut down.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outbound
            .send(PeerEvent::Message {
                peer: self.id.clone(),
                message,
            })
            .is_ok()
    }

    /// Blocks for the next master message. `None` when the master side has
    /// shut down; the peer loop should exit then.
    pub fn recv(&self) -> Option<ServerMessage> {
        self.inbound.recv().ok()
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        let _ = self.outbound.send(PeerEvent::Disconnected {
            peer: self.id.clone(),
        });
    }
}

/// Master-side message-passing service: one ordered channel per peer plus a
/// single merged inbound stream.
pub struct MasterHub {
    inbound_tx: Sender<PeerEvent>,
    inbound: Receiver<PeerEvent>,
    outbound: BTreeMap<PeerId, Sender<ServerMessage>>,
}

impl MasterHub {
    pub fn new() -> Self {
        let (inbound_tx, inbound) = unbounded();
        Self {
            inbound_tx,
            inbound,
            outbound: BTreeMap::new(),
        }
    }

    /// Opens a link for a peer, replacing any previous link with the same
    /// identity (reconnection).
    pub fn connect(&mut self, id: PeerId) -> PeerLink {
        let (outbound_tx, inbound_rx) = unbounded();
        self.outbound.insert(id.clone(), outbound_tx);
        PeerLink {
            id,
            outbound: self.inbound_tx.clone(),
            inbound: inbound_rx,
        }
    }

    /// Closes the master side of a peer's link.
    pub fn disconnect(&mut self, id: &PeerId) {
        self.outbound.remove(id);
    }

    /// Sends a message to every connected peer over its own channel.
    pub fn broadcast(&self, message: &ServerMessage) {
        for (peer, sender) in &self.outbound {
            if sender.send(message.clone()).is_err() {
                tracing::warn!(%peer, "peer channel closed during broadcast");
            }
        }
    }

    /// Blocks for inbound traffic until `deadline`.
    pub fn recv_deadline(&self, deadline: Instant) -> Result<PeerEvent, RecvTimeoutError> {
        self.inbound.recv_deadline(deadline)
    }

    /// Blocks for inbound traffic without a deadline (strict-stall path).
    /// Only peer events unblock this; the hub itself never disconnects.
    pub fn recv(&self) -> Option<PeerEvent> {
        self.inbound.recv().ok()
    }
}

impl Default for MasterHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_flow_both_ways_in_order() {
        let mut hub = MasterHub::new();
        let link = hub.connect(PeerId::new("front"));

        hub.broadcast(&ServerMessage::DisplayFrame { frame: 0 });
        hub.broadcast(&ServerMessage::DisplayFrame { frame: 1 });
        assert_eq!(link.recv(), Some(ServerMessage::DisplayFrame { frame: 0 }));
        assert_eq!(link.recv(), Some(ServerMessage::DisplayFrame { frame: 1 }));

        assert!(link.send(ClientMessage::FrameReady { frame: 0 }));
        match hub.recv() {
            Some(PeerEvent::Message { peer, message }) => {
                assert_eq!(peer, PeerId::new("front"));
                assert_eq!(message, ClientMessage::FrameReady { frame: 0 });
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dropping_a_link_reports_disconnection() {
        let mut hub = MasterHub::new();
        let link = hub.connect(PeerId::new("front"));
        drop(link);
        assert_eq!(
            hub.recv(),
            Some(PeerEvent::Disconnected {
                peer: PeerId::new("front")
            })
        );
    }

    #[test]
    fn reconnecting_replaces_the_previous_link() {
        let mut hub = MasterHub::new();
        let stale = hub.connect(PeerId::new("front"));
        let fresh = hub.connect(PeerId::new("front"));

        hub.broadcast(&ServerMessage::DisplayFrame { frame: 7 });
        assert_eq!(fresh.recv(), Some(ServerMessage::DisplayFrame { frame: 7 }));
        drop(stale);
    }

    #[test]
    fn disconnect_closes_the_peer_side() {
        let mut hub = MasterHub::new();
        let link = hub.connect(PeerId::new("front"));
        hub.disconnect(&PeerId::new("front"));
        assert_eq!(link.recv(), None);
    }
}
