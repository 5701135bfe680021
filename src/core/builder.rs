use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::BusConfig;
use super::dispatcher::Dispatcher;
use super::node::{Node, NodeRole, Observers, Relay};
use crate::action::WindowId;
use crate::error::TransportError;
use crate::events::EventBus;
use crate::observers::{Observe, ObserverSet};
use crate::relay::hub::HubRelay;
use crate::relay::peripheral::PeripheralRelay;
use crate::relay::{LocalRoute, PeripheralRole};
use crate::transport::TransportRef;

/// Builder for a [`Node`]; the terminal method picks the process role.
///
/// All terminal methods must be called inside a Tokio runtime.
pub struct NodeBuilder {
    cfg: BusConfig,
    observers: Vec<Arc<dyn Observe>>,
}

impl NodeBuilder {
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
        }
    }

    /// Sets diagnostics observers.
    ///
    /// Observers receive node events through dedicated workers with bounded
    /// queues.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// A process-local bus without relay.
    pub fn standalone(self) -> Node {
        let events = EventBus::new(self.cfg.event_capacity_clamped());
        let observers = self.spawn_observers(&events);
        let (dispatcher, core) = Dispatcher::start(&self.cfg, events.clone(), Arc::new(LocalRoute));

        Node::assemble(
            self.cfg,
            NodeRole::Standalone,
            dispatcher,
            events,
            Relay::None,
            CancellationToken::new(),
            vec![("dispatch-core", core)],
            observers,
        )
    }

    /// The central process: accepts registrations and rebroadcasts between
    /// peripherals.
    ///
    /// # Errors
    /// [`TransportError::InboundTaken`] if the transport already serves
    /// another node.
    pub fn hub(self, transport: TransportRef) -> Result<Node, TransportError> {
        let inbound = transport.take_inbound()?;
        let events = EventBus::new(self.cfg.event_capacity_clamped());
        let observers = self.spawn_observers(&events);
        let token = CancellationToken::new();

        let (dispatcher, core) = Dispatcher::start(&self.cfg, events.clone(), Arc::new(LocalRoute));
        let hub = HubRelay::new(&self.cfg, transport, dispatcher.clone(), events.clone());
        let relay = tokio::spawn(Arc::clone(&hub).run_inbound(inbound, token.clone()));
        tracing::info!("hub node started");

        Ok(Node::assemble(
            self.cfg,
            NodeRole::Hub,
            dispatcher,
            events,
            Relay::Hub(hub),
            token,
            vec![("dispatch-core", core), ("hub-inbound", relay)],
            observers,
        ))
    }

    /// A peripheral owning `window`.
    pub fn window(self, window: WindowId, transport: TransportRef) -> Result<Node, TransportError> {
        self.peripheral(PeripheralRole::Window(window), transport)
    }

    /// A peripheral hosted inside `host_window` (extension-page-like).
    pub fn hosted(
        self,
        host_window: Option<WindowId>,
        transport: TransportRef,
    ) -> Result<Node, TransportError> {
        self.peripheral(PeripheralRole::Hosted { host_window }, transport)
    }

    /// A peripheral with an explicit role. Registers with the hub before
    /// accepting dispatches.
    ///
    /// # Errors
    /// [`TransportError::InboundTaken`] if the transport already serves
    /// another node, or the transport's error if the hub cannot be reached.
    pub fn peripheral(
        self,
        role: PeripheralRole,
        transport: TransportRef,
    ) -> Result<Node, TransportError> {
        let inbound = transport.take_inbound()?;
        let events = EventBus::new(self.cfg.event_capacity_clamped());
        let relay = Arc::new(PeripheralRelay::new(&self.cfg, role, transport, events.clone()));
        relay.register()?;

        let observers = self.spawn_observers(&events);
        let token = CancellationToken::new();
        let (dispatcher, core) = Dispatcher::start(&self.cfg, events.clone(), relay.clone());
        let inbound = tokio::spawn(Arc::clone(&relay).run_inbound(
            inbound,
            dispatcher.clone(),
            token.clone(),
        ));
        tracing::info!(role = ?relay.role(), "peripheral node registered");

        Ok(Node::assemble(
            self.cfg,
            NodeRole::Peripheral(role),
            dispatcher,
            events,
            Relay::Peripheral(relay),
            token,
            vec![("dispatch-core", core), ("peripheral-inbound", inbound)],
            observers,
        ))
    }

    fn spawn_observers(&self, events: &EventBus) -> Observers {
        let set = ObserverSet::new(self.observers.clone(), events.clone());
        Observers::spawn(set, events)
    }
}
