//! # Hub side of the relay.
//!
//! One registrant connection per registered peripheral:
//!
//! ```text
//! Register from P ─► Connection { registrant subscriber on hub core, Cargo(registrant_interval) }
//!
//! Dispatch from P ─► decode ─► stamp_origin ─► hub cycle (origin = P)
//!                                                ├─ registrant(P1) ─► cargo ─► P1
//!                                                ├─ registrant(P)     skip (no echo)
//!                                                └─ registrant(P2) ─► cargo ─► P2
//!
//! PeerLost(P) / PeerUnavailable ─► remove P: unregister subscriber, abort cargo
//! ```
//!
//! Removal is synchronous and idempotent. A peer that vanished is never an
//! error for whoever dispatched the action.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future;
use tokio_util::sync::CancellationToken;

use super::resolver;
use crate::action::Action;
use crate::cargo::{Cargo, CargoConfig};
use crate::core::{BusConfig, CycleContext, Dispatcher, Origin, SubscriberId};
use crate::error::SubscriberError;
use crate::events::{Event, EventBus, EventKind};
use crate::subscribers::{Completion, Subscriber};
use crate::transport::{Frame, Inbound, InboundRx, LifecycleSignal, PeerId, TransportRef};

/// Why a connection was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    Lost(LifecycleSignal),
    Unavailable,
}

impl Removal {
    fn as_label(&self) -> &'static str {
        match self {
            Removal::Lost(signal) => signal.as_label(),
            Removal::Unavailable => "unavailable",
        }
    }
}

struct Connection {
    subscriber: SubscriberId,
    registrant: Arc<Registrant>,
}

pub(crate) struct HubRelay {
    cargo: CargoConfig,
    frame_limit: Option<usize>,
    transport: TransportRef,
    dispatcher: Dispatcher,
    events: EventBus,
    connections: Mutex<HashMap<PeerId, Connection>>,
    me: Weak<HubRelay>,
}

impl HubRelay {
    pub(crate) fn new(
        cfg: &BusConfig,
        transport: TransportRef,
        dispatcher: Dispatcher,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            cargo: cfg.registrant_cargo(),
            frame_limit: cfg.frame_limit(),
            transport,
            dispatcher,
            events,
            connections: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    /// Creates the connection for `peer`. Duplicate registrations are ignored.
    pub(crate) fn connect(&self, peer: PeerId) -> bool {
        let mut connections = self.connections();
        if connections.contains_key(&peer) {
            tracing::debug!(peer = %peer, "duplicate register ignored");
            return false;
        }
        let registrant = Arc::new(Registrant {
            peer,
            name: format!("registrant:{peer}"),
            outbound: self.spawn_cargo(peer),
            hub: self.me.clone(),
        });
        let subscriber = self.dispatcher.register(registrant.clone());
        connections.insert(
            peer,
            Connection {
                subscriber,
                registrant,
            },
        );
        drop(connections);

        tracing::info!(peer = %peer, subscriber = %subscriber, "peripheral registered");
        self.events
            .publish(Event::new(EventKind::PeerRegistered).with_peer(peer));
        true
    }

    /// Drops the connection of `peer`. Returns false if it was not connected.
    pub(crate) fn remove(&self, peer: PeerId, why: Removal) -> bool {
        let Some(conn) = self.connections().remove(&peer) else {
            return false;
        };
        self.dispatcher.unregister(conn.subscriber);
        conn.registrant.outbound.abort();

        match why {
            Removal::Unavailable => {
                tracing::warn!(peer = %peer, "peripheral unreachable; connection dropped")
            }
            Removal::Lost(signal) => {
                tracing::info!(peer = %peer, signal = signal.as_label(), "peripheral gone; connection dropped")
            }
        }
        self.events.publish(
            Event::new(EventKind::PeerRemoved)
                .with_peer(peer)
                .with_reason(why.as_label()),
        );
        true
    }

    /// Connected peripherals, ascending.
    pub(crate) fn peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.connections().keys().copied().collect();
        ids.sort();
        ids
    }

    /// True when every registrant cargo is idle.
    pub(crate) fn is_idle(&self) -> bool {
        self.connections()
            .values()
            .all(|c| c.registrant.outbound.idle())
    }

    /// Waits until every registrant cargo present now is idle.
    pub(crate) async fn drained(&self) {
        for registrant in self.registrants() {
            registrant.outbound.drained().await;
        }
    }

    /// Flushes and closes every registrant cargo.
    pub(crate) async fn close(&self) {
        for registrant in self.registrants() {
            registrant.outbound.close().await;
        }
    }

    /// Drops every registrant cargo's buffered actions.
    pub(crate) fn abort(&self) {
        for registrant in self.registrants() {
            registrant.outbound.abort();
        }
    }

    /// Handles hub inbound traffic until cancelled or the transport closes.
    pub(crate) async fn run_inbound(self: Arc<Self>, mut rx: InboundRx, token: CancellationToken) {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = rx.recv() => next,
            };
            match next {
                None => {
                    tracing::debug!("hub transport closed");
                    break;
                }
                Some(Inbound::Frame {
                    from,
                    frame: Frame::Register,
                }) => {
                    self.connect(from);
                }
                Some(Inbound::Frame {
                    from,
                    frame: Frame::Dispatch(bytes),
                }) => self.accept_batch(from, &bytes),
                Some(Inbound::PeerLost { peer, signal }) => {
                    if !self.remove(peer, Removal::Lost(signal)) {
                        tracing::debug!(peer = %peer, "lifecycle signal for unknown peer");
                    }
                }
            }
        }
    }

    fn accept_batch(&self, from: PeerId, bytes: &[u8]) {
        let Some(actions) = super::unpack(&self.events, from, bytes) else {
            return;
        };
        let info = self.transport.describe(from);
        for mut action in actions {
            resolver::stamp_origin(&mut action, info.as_ref());
            if let Err(e) = self.dispatcher.dispatch_from(Origin::Peer(from), action) {
                tracing::warn!(peer = %from, error = %e, "dropping invalid relayed action");
            }
        }
    }

    fn spawn_cargo(&self, peer: PeerId) -> Cargo<Action> {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let hub = self.me.clone();
        let limit = self.frame_limit;
        Cargo::spawn(format!("registrant:{peer}"), self.cargo, move |batch: Vec<Action>| {
            if let Err(e) = super::ship(&*transport, &events, peer, limit, batch) {
                if e.is_peer_gone() {
                    if let Some(hub) = hub.upgrade() {
                        hub.remove(peer, Removal::Unavailable);
                    }
                } else {
                    tracing::warn!(peer = %peer, error = %e, "relay to peripheral failed");
                }
            }
            future::ready(())
        })
    }

    fn registrants(&self) -> Vec<Arc<Registrant>> {
        self.connections()
            .values()
            .map(|c| Arc::clone(&c.registrant))
            .collect()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<PeerId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hub-core subscriber feeding one peripheral's cargo.
struct Registrant {
    peer: PeerId,
    name: String,
    outbound: Cargo<Action>,
    hub: Weak<HubRelay>,
}

impl Subscriber for Registrant {
    fn handle(&self, action: &Action, cx: &CycleContext) -> Result<Completion, SubscriberError> {
        if cx.origin() == Origin::Peer(self.peer) || action.is_internal_only() {
            return Ok(Completion::Done);
        }
        if self.outbound.push(action.clone()).is_err() {
            if let Some(hub) = self.hub.upgrade() {
                hub.remove(self.peer, Removal::Unavailable);
            }
        }
        Ok(Completion::Done)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
