//! # Peripheral side of the relay.
//!
//! ```text
//! start:    send(HUB, Register)                     (once)
//! outbound: local cycle ─► forward ─► Cargo(dispatch_interval) ─► Dispatch frame ─► hub
//! inbound:  hub frame ─► decode ─► dispatch_from(Peer(HUB))    (never forwarded again)
//! ```
//!
//! Losing the hub is logged and published; the peripheral keeps serving
//! local dispatches but no longer relays.

use std::sync::Arc;

use futures::future;
use tokio_util::sync::CancellationToken;

use super::{Route, resolver};
use crate::action::{Action, WindowId};
use crate::cargo::Cargo;
use crate::core::{BusConfig, Dispatcher, Envelope, Origin};
use crate::error::TransportError;
use crate::events::{Event, EventBus, EventKind};
use crate::transport::{Frame, Inbound, InboundRx, PeerId, TransportRef};

/// Wiring of a peripheral process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralRole {
    /// A process owning a window: delivers its own actions locally when they
    /// are untargeted or targeted at this window.
    Window(WindowId),
    /// A context hosted inside another window (extension-page-like): its own
    /// actions are only forwarded, inbound actions are filtered against the host.
    Hosted { host_window: Option<WindowId> },
}

impl PeripheralRole {
    /// The window used for target matching.
    pub fn window(&self) -> Option<WindowId> {
        match self {
            PeripheralRole::Window(w) => Some(*w),
            PeripheralRole::Hosted { host_window } => *host_window,
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, PeripheralRole::Hosted { .. })
    }
}

pub(crate) struct PeripheralRelay {
    role: PeripheralRole,
    transport: TransportRef,
    outbound: Cargo<Action>,
    events: EventBus,
}

impl PeripheralRelay {
    pub(crate) fn new(
        cfg: &BusConfig,
        role: PeripheralRole,
        transport: TransportRef,
        events: EventBus,
    ) -> Self {
        let sink = Arc::clone(&transport);
        let bus = events.clone();
        let limit = cfg.frame_limit();
        let outbound = Cargo::spawn("peripheral-outbound", cfg.dispatch_cargo(), move |batch: Vec<Action>| {
            let len = batch.len();
            if let Err(e) = super::ship(&*sink, &bus, PeerId::HUB, limit, batch) {
                tracing::warn!(batch = len, error = %e, "hub unreachable; batch lost");
                bus.publish(
                    Event::new(EventKind::RelayFailed)
                        .with_peer(PeerId::HUB)
                        .with_count(len)
                        .with_reason(e.to_string()),
                );
            }
            future::ready(())
        });
        Self {
            role,
            transport,
            outbound,
            events,
        }
    }

    pub(crate) fn role(&self) -> PeripheralRole {
        self.role
    }

    /// Announces this peripheral to the hub.
    pub(crate) fn register(&self) -> Result<(), TransportError> {
        self.transport.send(PeerId::HUB, Frame::Register)
    }

    pub(crate) fn outbound(&self) -> &Cargo<Action> {
        &self.outbound
    }

    /// Feeds hub batches into the local core until cancelled or the hub is lost.
    pub(crate) async fn run_inbound(
        self: Arc<Self>,
        mut rx: InboundRx,
        dispatcher: Dispatcher,
        token: CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = rx.recv() => next,
            };
            match next {
                None => {
                    tracing::warn!("hub link closed; relay stopped");
                    break;
                }
                Some(Inbound::Frame {
                    from,
                    frame: Frame::Dispatch(bytes),
                }) => {
                    let Some(actions) = super::unpack(&self.events, from, &bytes) else {
                        continue;
                    };
                    for action in actions {
                        if let Err(e) = dispatcher.dispatch_from(Origin::Peer(from), action) {
                            tracing::warn!(peer = %from, error = %e, "dropping invalid relayed action");
                        }
                    }
                }
                Some(Inbound::Frame {
                    from,
                    frame: Frame::Register,
                }) => {
                    tracing::debug!(peer = %from, "register frame ignored by peripheral");
                }
                Some(Inbound::PeerLost { peer, signal }) => {
                    tracing::error!(
                        peer = %peer,
                        signal = signal.as_label(),
                        "lost connection to hub; outbound relay stopped"
                    );
                    self.events.publish(
                        Event::new(EventKind::PeerRemoved)
                            .with_peer(peer)
                            .with_reason(signal.as_label()),
                    );
                    if peer.is_hub() {
                        self.outbound.abort();
                        break;
                    }
                }
            }
        }
    }
}

impl Route for PeripheralRelay {
    fn admit(&self, envelope: &mut Envelope) -> bool {
        resolver::admit(self.role, envelope)
    }

    fn forward(&self, envelope: &Envelope) {
        if !envelope.origin.is_local() || envelope.action.is_internal_only() {
            return;
        }
        if let Err(e) = self.outbound.push(envelope.action.clone()) {
            tracing::debug!(
                action = envelope.action.action_type(),
                error = %e,
                "outbound relay closed; action stays local"
            );
        }
    }
}
