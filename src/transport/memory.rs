//! # In-process transport.
//!
//! [`MemoryNetwork`] connects one hub and any number of peripherals through
//! unbounded channels, all inside one process. It also simulates process
//! lifecycle: [`MemoryNetwork::crash`] and [`MemoryNetwork::destroy`] cut a
//! peripheral off and deliver the corresponding signal to the hub.
//!
//! ```text
//! let net = MemoryNetwork::new();
//! let hub = net.hub();                           // Transport for the hub node
//! let p1  = net.connect(PeerInfo::window(w1));   // Transport for a peripheral
//! net.destroy(p1.id());                          // hub sees PeerLost { p1, Destroyed }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::{Frame, Inbound, InboundRx, LifecycleSignal, PeerId, PeerInfo, Transport};
use crate::error::TransportError;

struct Link {
    tx: mpsc::UnboundedSender<Inbound>,
    rx: Option<InboundRx>,
}

impl Link {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

struct PeerSlot {
    info: PeerInfo,
    link: Link,
    alive: bool,
}

struct Network {
    next_peer: u64,
    hub: Link,
    hub_alive: bool,
    peers: HashMap<PeerId, PeerSlot>,
}

/// Shared in-process network. Cheap to clone.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Network>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Network {
                next_peer: 1,
                hub: Link::new(),
                hub_alive: true,
                peers: HashMap::new(),
            })),
        }
    }

    /// Transport for the hub process.
    pub fn hub(&self) -> MemoryHub {
        MemoryHub { net: self.clone() }
    }

    /// Connects a new peripheral and returns its transport.
    pub fn connect(&self, info: PeerInfo) -> MemoryPeer {
        let mut net = self.lock();
        let id = PeerId::new(net.next_peer);
        net.next_peer += 1;
        net.peers.insert(
            id,
            PeerSlot {
                info,
                link: Link::new(),
                alive: true,
            },
        );
        MemoryPeer {
            net: self.clone(),
            id,
        }
    }

    /// Simulates an abnormal termination of a peripheral.
    pub fn crash(&self, peer: PeerId) {
        self.lose(peer, LifecycleSignal::Crashed);
    }

    /// Simulates an orderly teardown of a peripheral.
    pub fn destroy(&self, peer: PeerId) {
        self.lose(peer, LifecycleSignal::Destroyed);
    }

    /// Simulates a hub crash: every live peripheral is told the hub is gone.
    pub fn crash_hub(&self) {
        let mut net = self.lock();
        if !net.hub_alive {
            return;
        }
        net.hub_alive = false;
        for slot in net.peers.values().filter(|s| s.alive) {
            let _ = slot.link.tx.send(Inbound::PeerLost {
                peer: PeerId::HUB,
                signal: LifecycleSignal::Crashed,
            });
        }
    }

    /// Live peripherals, in connection order.
    pub fn peers(&self) -> Vec<PeerId> {
        let net = self.lock();
        let mut ids: Vec<_> = net
            .peers
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn lose(&self, peer: PeerId, signal: LifecycleSignal) {
        let mut net = self.lock();
        let Some(slot) = net.peers.get_mut(&peer) else {
            return;
        };
        if !slot.alive {
            return;
        }
        slot.alive = false;
        if net.hub_alive {
            let _ = net.hub.tx.send(Inbound::PeerLost { peer, signal });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Network> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hub side of a [`MemoryNetwork`].
pub struct MemoryHub {
    net: MemoryNetwork,
}

impl Transport for MemoryHub {
    fn send(&self, to: PeerId, frame: Frame) -> Result<(), TransportError> {
        let net = self.net.lock();
        let slot = net
            .peers
            .get(&to)
            .filter(|s| s.alive)
            .ok_or(TransportError::PeerUnavailable { peer: to })?;
        slot.link
            .tx
            .send(Inbound::Frame {
                from: PeerId::HUB,
                frame,
            })
            .map_err(|_| TransportError::PeerUnavailable { peer: to })
    }

    fn take_inbound(&self) -> Result<InboundRx, TransportError> {
        self.net
            .lock()
            .hub
            .rx
            .take()
            .ok_or(TransportError::InboundTaken)
    }

    fn describe(&self, peer: PeerId) -> Option<PeerInfo> {
        self.net.lock().peers.get(&peer).map(|s| s.info)
    }
}

/// Peripheral side of a [`MemoryNetwork`].
pub struct MemoryPeer {
    net: MemoryNetwork,
    id: PeerId,
}

impl MemoryPeer {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for MemoryPeer {
    fn send(&self, to: PeerId, frame: Frame) -> Result<(), TransportError> {
        if !to.is_hub() {
            return Err(TransportError::PeerUnavailable { peer: to });
        }
        let net = self.net.lock();
        let alive = net.peers.get(&self.id).is_some_and(|s| s.alive);
        if !alive || !net.hub_alive {
            return Err(TransportError::PeerUnavailable { peer: to });
        }
        net.hub
            .tx
            .send(Inbound::Frame {
                from: self.id,
                frame,
            })
            .map_err(|_| TransportError::PeerUnavailable { peer: to })
    }

    fn take_inbound(&self) -> Result<InboundRx, TransportError> {
        self.net
            .lock()
            .peers
            .get_mut(&self.id)
            .and_then(|s| s.link.rx.take())
            .ok_or(TransportError::InboundTaken)
    }

    fn describe(&self, peer: PeerId) -> Option<PeerInfo> {
        if peer == self.id {
            self.net.lock().peers.get(&peer).map(|s| s.info)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::WindowId;
    use bytes::Bytes;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let net = MemoryNetwork::new();
        let hub = net.hub();
        let peer = net.connect(PeerInfo::window(WindowId(1)));
        let mut hub_rx = hub.take_inbound().unwrap();
        let mut peer_rx = peer.take_inbound().unwrap();

        peer.send(PeerId::HUB, Frame::Register).unwrap();
        match hub_rx.recv().await.unwrap() {
            Inbound::Frame { from, frame } => {
                assert_eq!(from, peer.id());
                assert_eq!(frame, Frame::Register);
            }
            other => panic!("unexpected {other:?}"),
        }

        let body = Frame::Dispatch(Bytes::from_static(b"x"));
        hub.send(peer.id(), body.clone()).unwrap();
        match peer_rx.recv().await.unwrap() {
            Inbound::Frame { from, frame } => {
                assert!(from.is_hub());
                assert_eq!(frame, body);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(hub.take_inbound(), Err(TransportError::InboundTaken)));
        assert_eq!(hub.describe(peer.id()), Some(PeerInfo::window(WindowId(1))));
    }

    #[tokio::test]
    async fn destroyed_peer_is_reported_and_unreachable() {
        let net = MemoryNetwork::new();
        let hub = net.hub();
        let peer = net.connect(PeerInfo::default());
        let mut hub_rx = hub.take_inbound().unwrap();

        net.destroy(peer.id());
        net.destroy(peer.id());

        match hub_rx.recv().await.unwrap() {
            Inbound::PeerLost { peer: lost, signal } => {
                assert_eq!(lost, peer.id());
                assert_eq!(signal, LifecycleSignal::Destroyed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(hub_rx.try_recv().is_err());

        let err = hub.send(peer.id(), Frame::Register).unwrap_err();
        assert!(err.is_peer_gone());
        assert!(net.peers().is_empty());
    }

    #[tokio::test]
    async fn peers_only_talk_to_the_hub() {
        let net = MemoryNetwork::new();
        let a = net.connect(PeerInfo::default());
        let b = net.connect(PeerInfo::default());
        assert!(a.send(b.id(), Frame::Register).is_err());
    }
}
