//! # Node: one process's bus, wired for its role.
//!
//! A [`Node`] owns everything a process needs to take part in the bus:
//! the [`Dispatcher`], the diagnostics [`EventBus`], the observer fan-out, the
//! relay for its role and the tasks spawned for them.
//!
//! ```text
//! NodeBuilder::standalone()  ─► Node { dispatcher(LocalRoute) }
//! NodeBuilder::hub(t)        ─► Node { dispatcher(LocalRoute), HubRelay(t) + inbound task }
//! NodeBuilder::window(w, t)  ─► Node { dispatcher(PeripheralRelay), inbound task }
//! NodeBuilder::hosted(h, t)  ─► Node { dispatcher(PeripheralRelay), inbound task }
//!
//! EventBus ─► listener task ─► ObserverSet ─► Observe::on_event
//!
//! Shutdown path:
//!   Node::shutdown()
//!     └─► dispatcher.shutdown()            later dispatches are absorbed
//!     └─► EventBus.publish(ShutdownRequested)
//!     └─► token.cancel()                   inbound loops stop
//!     └─► within cfg.grace:
//!           join core + inbound tasks, close cargos (flush what is buffered)
//!           ├─ Ok      → publish(AllStoppedWithin)
//!           └─ Timeout → abort the rest, publish(GraceExceeded)
//!     └─► drain observers
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::config::BusConfig;
use super::dispatcher::Dispatcher;
use super::registry::SubscriberId;
use super::shutdown;
use crate::action::{Action, Payload};
use crate::error::{DispatchError, RuntimeError};
use crate::events::{Event, EventBus, EventKind};
use crate::observers::ObserverSet;
use crate::relay::PeripheralRole;
use crate::relay::hub::HubRelay;
use crate::relay::peripheral::PeripheralRelay;
use crate::subscribers::Subscriber;
use crate::transport::PeerId;

/// What a node was built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Process-local bus, no relay.
    Standalone,
    /// Central process rebroadcasting between peripherals.
    Hub,
    /// Window or hosted context connected to a hub.
    Peripheral(PeripheralRole),
}

pub(crate) enum Relay {
    None,
    Hub(Arc<HubRelay>),
    Peripheral(Arc<PeripheralRelay>),
}

impl Relay {
    fn is_idle(&self) -> bool {
        match self {
            Relay::None => true,
            Relay::Hub(hub) => hub.is_idle(),
            Relay::Peripheral(p) => p.outbound().idle(),
        }
    }

    async fn drained(&self) {
        match self {
            Relay::None => {}
            Relay::Hub(hub) => hub.drained().await,
            Relay::Peripheral(p) => p.outbound().drained().await,
        }
    }

    async fn close(&self) {
        match self {
            Relay::None => {}
            Relay::Hub(hub) => hub.close().await,
            Relay::Peripheral(p) => p.outbound().close().await,
        }
    }

    fn abort(&self) {
        match self {
            Relay::None => {}
            Relay::Hub(hub) => hub.abort(),
            Relay::Peripheral(p) => p.outbound().abort(),
        }
    }
}

/// Event listener feeding the observer set.
pub(crate) struct Observers {
    set: Arc<ObserverSet>,
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Observers {
    /// Subscribes to `events` and forwards everything into `set`.
    pub(crate) fn spawn(set: ObserverSet, events: &EventBus) -> Self {
        let set = Arc::new(set);
        let token = CancellationToken::new();
        let mut rx = events.subscribe();
        let forward = Arc::clone(&set);
        let stop = token.clone();

        let listener = tokio::spawn(async move {
            loop {
                // Queued events win over cancellation so the final ones are delivered.
                let received = tokio::select! {
                    biased;
                    received = rx.recv() => received,
                    _ = stop.cancelled() => break,
                };
                match received {
                    Ok(ev) => forward.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "observer listener lagged; events skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            set,
            token,
            listener,
        }
    }

    async fn shutdown(self) {
        self.token.cancel();
        let _ = self.listener.await;
        match Arc::try_unwrap(self.set) {
            Ok(set) => set.shutdown().await,
            Err(_) => tracing::debug!("observer set still shared; workers left running"),
        }
    }
}

/// A process's bus endpoint.
pub struct Node {
    cfg: BusConfig,
    role: NodeRole,
    dispatcher: Dispatcher,
    events: EventBus,
    relay: Relay,
    token: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    observers: Option<Observers>,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        cfg: BusConfig,
        role: NodeRole,
        dispatcher: Dispatcher,
        events: EventBus,
        relay: Relay,
        token: CancellationToken,
        tasks: Vec<(&'static str, JoinHandle<()>)>,
        observers: Observers,
    ) -> Self {
        Self {
            cfg,
            role,
            dispatcher,
            events,
            relay,
            token,
            tasks,
            observers: Some(observers),
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// The node's dispatcher. Clone it to dispatch from other tasks.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// See [`Dispatcher::dispatch`].
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(action)
    }

    /// See [`Dispatcher::dispatch_payload`].
    pub fn dispatch_payload(&self, payload: Payload) -> Result<(), DispatchError> {
        self.dispatcher.dispatch_payload(payload)
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.dispatcher.register(subscriber)
    }

    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Diagnostics bus of this node.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Peripherals currently connected to this hub (empty for other roles).
    pub fn peers(&self) -> Vec<PeerId> {
        match &self.relay {
            Relay::Hub(hub) => hub.peers(),
            _ => Vec::new(),
        }
    }

    /// True when no action is queued or in flight and every cargo is idle.
    pub fn is_quiescent(&self) -> bool {
        self.dispatcher.is_idle() && self.relay.is_idle()
    }

    /// Waits until [`is_quiescent`](Self::is_quiescent) holds.
    ///
    /// Only covers this process: actions still travelling to or from other
    /// processes are not accounted for.
    pub async fn settle(&self) {
        loop {
            self.dispatcher.settled().await;
            self.relay.drained().await;
            if self.is_quiescent() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down.
    pub async fn run_until_signal(self) -> Result<(), RuntimeError> {
        if let Err(e) = shutdown::wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "signal handlers unavailable; shutting down");
        }
        self.shutdown().await
    }

    /// Stops the node, flushing outbound cargos within `cfg.grace`.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] if some tasks did not stop in time;
    /// they are aborted.
    pub async fn shutdown(mut self) -> Result<(), RuntimeError> {
        self.dispatcher.shutdown();
        self.events.publish(Event::new(EventKind::ShutdownRequested));
        self.token.cancel();

        let result = self.wait_all_with_grace().await;
        if let Some(observers) = self.observers.take() {
            observers.shutdown().await;
        }
        result
    }

    async fn wait_all_with_grace(&mut self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let relay = &self.relay;
        let tasks = &mut self.tasks;

        let stopped = time::timeout(grace, async {
            for (name, handle) in tasks.iter_mut() {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::error!(task = *name, "node task panicked");
                    }
                }
            }
            relay.close().await;
        })
        .await;

        match stopped {
            Ok(()) => {
                tracing::debug!(grace = ?grace, "node stopped within grace");
                self.events.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.relay.abort();
                let stuck: Vec<String> = self
                    .tasks
                    .iter()
                    .filter(|(_, handle)| !handle.is_finished())
                    .map(|(name, handle)| {
                        handle.abort();
                        (*name).to_string()
                    })
                    .collect();
                tracing::error!(grace = ?grace, stuck = ?stuck, "node shutdown exceeded grace");
                self.events.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Grace period used by [`shutdown`](Self::shutdown).
    pub fn grace(&self) -> Duration {
        self.cfg.grace
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
        self.token.cancel();
        if let Some(observers) = &self.observers {
            observers.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::NodeBuilder;
    use crate::observers::Observe;
    use crate::subscribers::{Completion, SubscriberFn};

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Observe for Kinds {
        async fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "kinds"
        }
    }

    #[tokio::test]
    async fn standalone_node_dispatches_and_settles() {
        let node = NodeBuilder::new(BusConfig::default()).standalone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.register(SubscriberFn::arc("rec", move |a: &Action, _cx| {
            sink.lock().unwrap().push(a.action_type().to_string());
            Ok(Completion::Done)
        }));

        node.dispatch(Action::new("one")).unwrap();
        node.dispatch(Action::new("two")).unwrap();
        node.settle().await;

        assert!(node.is_quiescent());
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
        assert_eq!(node.role(), NodeRole::Standalone);
        assert!(node.peers().is_empty());
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_reports_through_observers() {
        let kinds = Arc::new(Kinds::default());
        let node = NodeBuilder::new(BusConfig::default())
            .with_observers(vec![kinds.clone() as Arc<dyn Observe>])
            .standalone();
        let dispatcher = node.dispatcher().clone();

        node.shutdown().await.unwrap();
        assert!(dispatcher.is_shut_down());
        dispatcher.dispatch(Action::new("late")).unwrap();

        let kinds = kinds.0.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![EventKind::ShutdownRequested, EventKind::AllStoppedWithin]
        );
    }

    #[tokio::test]
    async fn stuck_cycle_exceeds_grace() {
        let cfg = BusConfig {
            grace: Duration::from_millis(30),
            cycle_timeout: Duration::ZERO,
            ..BusConfig::default()
        };
        let node = NodeBuilder::new(cfg).standalone();
        node.register(SubscriberFn::arc("hang", |_a: &Action, _cx| {
            Ok(Completion::pending(std::future::pending()))
        }));
        node.dispatch(Action::new("forever")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        match node.shutdown().await {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => {
                assert_eq!(stuck, vec!["dispatch-core".to_string()]);
            }
            other => panic!("expected grace exceeded, got {other:?}"),
        }
    }
}
