//! # Dispatcher: the per-process dispatch core.
//!
//! [`Dispatcher`] is the handle applications dispatch through. Behind it, a
//! single core task runs one cycle at a time:
//!
//! ```text
//! dispatch(a) ──► FIFO queue ──► core task
//!                                 loop {
//!                                   env = queue.recv()          (or cancelled → stop)
//!                                   admitted = route.admit(env)
//!                                   if admitted:
//!                                     snapshot subscribers
//!                                     invoke each in order      (catch errors/panics)
//!                                   route.forward(env)          (relay outbound)
//!                                   if admitted:
//!                                     drain pending completions (bounded by cycle_timeout)
//!                                 }
//! ```
//!
//! ## Rules
//! - `dispatch` only validates and enqueues; it never runs subscribers inline,
//!   so dispatching from inside a subscriber cannot recurse.
//! - Cycles never overlap: the next queued action starts only after every
//!   pending completion of the current one resolved, failed or was abandoned.
//! - After [`Dispatcher::shutdown`], `dispatch` silently absorbs actions; the
//!   core finishes the in-flight cycle and discards the backlog.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::config::BusConfig;
use super::cycle::{CycleTable, Origin};
use super::registry::{Registry, Snapshot, SubscriberId};
use crate::action::{Action, Payload};
use crate::error::{DispatchError, SubscriberError, panic_message};
use crate::events::{Event, EventBus, EventKind};
use crate::relay::{LocalRoute, Route};
use crate::subscribers::{Completion, Subscriber};

/// An action on its way through the core.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub action: Action,
    pub origin: Origin,
}

/// Handle to a process's dispatch core. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    queue: mpsc::UnboundedSender<Envelope>,
    backlog: Arc<watch::Sender<usize>>,
    closed: AtomicBool,
    token: CancellationToken,
    events: EventBus,
}

impl Dispatcher {
    /// Starts a process-local dispatcher (no relay).
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(cfg: &BusConfig) -> Self {
        let events = EventBus::new(cfg.event_capacity_clamped());
        let (dispatcher, _core) = Self::start(cfg, events, Arc::new(LocalRoute));
        dispatcher
    }

    /// Spawns the core task with the given route.
    pub(crate) fn start(
        cfg: &BusConfig,
        events: EventBus,
        route: Arc<dyn Route>,
    ) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Registry::new());
        let (backlog, _) = watch::channel(0usize);
        let backlog = Arc::new(backlog);
        let token = CancellationToken::new();

        let core = DispatchCore {
            registry: Arc::clone(&registry),
            route,
            backlog: Arc::clone(&backlog),
            events: events.clone(),
            token: token.clone(),
            wait_limit: cfg.wait_limit(),
            cycle_limit: cfg.cycle_limit(),
            seq: 0,
        };
        let handle = tokio::spawn(core.run(rx));

        let dispatcher = Self {
            inner: Arc::new(Inner {
                registry,
                queue,
                backlog,
                closed: AtomicBool::new(false),
                token,
                events,
            }),
        };
        (dispatcher, handle)
    }

    /// Appends a subscriber; it takes part from the next cycle on.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.inner.registry.register(subscriber);
        tracing::debug!(subscriber = %id, "subscriber registered");
        id
    }

    /// Removes a subscriber from the next cycle on. Returns false if unknown.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.inner.registry.unregister(id);
        if removed {
            tracing::debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Queues an action originated in this process.
    ///
    /// # Errors
    /// [`DispatchError::InvalidAction`] if `action_type` is blank. After
    /// shutdown every call returns `Ok(())` and does nothing.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        self.dispatch_from(Origin::Local, action)
    }

    /// Queues every action of a payload, in order.
    ///
    /// All actions are validated before any is queued.
    pub fn dispatch_payload(&self, payload: Payload) -> Result<(), DispatchError> {
        if self.is_shut_down() {
            payload.actions().iter().for_each(|a| self.absorb(a));
            return Ok(());
        }
        for action in payload.actions() {
            action.validate()?;
        }
        for action in payload.into_actions() {
            self.enqueue(Envelope {
                action,
                origin: Origin::Local,
            });
        }
        Ok(())
    }

    pub(crate) fn dispatch_from(&self, origin: Origin, action: Action) -> Result<(), DispatchError> {
        if self.is_shut_down() {
            self.absorb(&action);
            return Ok(());
        }
        action.validate()?;
        self.enqueue(Envelope { action, origin });
        Ok(())
    }

    /// Stops the core after the in-flight cycle; later dispatches are absorbed.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(backlog = self.backlog(), "dispatcher shutting down");
        }
        self.inner.token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Actions queued or in flight.
    pub fn backlog(&self) -> usize {
        *self.inner.backlog.borrow()
    }

    /// True when no action is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.backlog() == 0
    }

    /// Waits until the dispatcher is idle.
    pub async fn settled(&self) {
        let mut rx = self.inner.backlog.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Diagnostics bus this dispatcher publishes to.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    fn enqueue(&self, envelope: Envelope) {
        self.inner.backlog.send_modify(|n| *n += 1);
        if let Err(mpsc::error::SendError(envelope)) = self.inner.queue.send(envelope) {
            self.inner
                .backlog
                .send_modify(|n| *n = n.saturating_sub(1));
            self.absorb(&envelope.action);
        }
    }

    fn absorb(&self, action: &Action) {
        tracing::debug!(action = action.action_type(), "dispatch after shutdown absorbed");
        self.inner
            .events
            .publish(Event::new(EventKind::ActionAbsorbed).with_action(action.action_type()));
    }
}

type Outcome = (
    SubscriberId,
    Arc<str>,
    Result<Result<(), SubscriberError>, Box<dyn Any + Send>>,
);

struct DispatchCore {
    registry: Arc<Registry>,
    route: Arc<dyn Route>,
    backlog: Arc<watch::Sender<usize>>,
    events: EventBus,
    token: CancellationToken,
    wait_limit: Option<Duration>,
    cycle_limit: Option<Duration>,
    seq: u64,
}

impl DispatchCore {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.run_cycle(envelope).await;
            self.backlog.send_modify(|n| *n = n.saturating_sub(1));
        }

        rx.close();
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        self.backlog.send_replace(0);
        tracing::debug!(discarded, cycles = self.seq, "dispatch core stopped");
    }

    async fn run_cycle(&mut self, mut envelope: Envelope) {
        self.seq += 1;
        let seq = self.seq;

        if !self.route.admit(&mut envelope) {
            tracing::trace!(
                action = envelope.action.action_type(),
                cycle = seq,
                "local delivery skipped"
            );
            self.route.forward(&envelope);
            return;
        }

        let entries = self.registry.snapshot();
        let table = CycleTable::new(
            seq,
            envelope.origin,
            entries.iter().map(|e| e.id),
            self.wait_limit,
        );
        let pending = self.invoke(seq, &envelope, &entries, &table);
        self.route.forward(&envelope);
        self.drain(seq, &envelope.action, &table, pending).await;
    }

    /// Calls every subscriber in order; collects the asynchronous completions.
    fn invoke(
        &self,
        seq: u64,
        envelope: &Envelope,
        entries: &Snapshot,
        table: &CycleTable,
    ) -> FuturesUnordered<BoxFuture<'static, Outcome>> {
        let pending = FuturesUnordered::new();
        for entry in entries.iter() {
            let cx = table.context(entry.id);
            let name = entry.subscriber.name();
            let call = panic::catch_unwind(AssertUnwindSafe(|| {
                entry.subscriber.handle(&envelope.action, &cx)
            }));
            match call {
                Ok(Ok(Completion::Done)) => table.resolve(entry.id),
                Ok(Ok(Completion::Pending(fut))) => {
                    let id = entry.id;
                    let name: Arc<str> = Arc::from(name);
                    pending.push(
                        async move { (id, name, AssertUnwindSafe(fut).catch_unwind().await) }
                            .boxed(),
                    );
                }
                Ok(Err(err)) => {
                    table.abort(entry.id);
                    self.report_error(seq, &envelope.action, name, &err);
                }
                Err(payload) => {
                    table.abort(entry.id);
                    self.report_panic(seq, &envelope.action, name, panic_message(&*payload));
                }
            }
        }
        pending
    }

    /// Waits for pending completions, bounded by the cycle deadline.
    async fn drain(
        &self,
        seq: u64,
        action: &Action,
        table: &CycleTable,
        mut pending: FuturesUnordered<BoxFuture<'static, Outcome>>,
    ) {
        if pending.is_empty() {
            return;
        }
        let completions = async {
            while let Some((id, name, outcome)) = pending.next().await {
                match outcome {
                    Ok(Ok(())) => table.resolve(id),
                    Ok(Err(err)) => {
                        table.abort(id);
                        self.report_error(seq, action, &name, &err);
                    }
                    Err(payload) => {
                        table.abort(id);
                        self.report_panic(seq, action, &name, panic_message(&*payload));
                    }
                }
            }
        };

        let finished = match self.cycle_limit {
            None => {
                completions.await;
                true
            }
            Some(limit) => time::timeout(limit, completions).await.is_ok(),
        };

        if !finished {
            let abandoned = table.abort_pending();
            tracing::warn!(
                action = action.action_type(),
                cycle = seq,
                abandoned = abandoned.len(),
                "cycle deadline reached; pending completions cancelled"
            );
            self.events.publish(
                Event::new(EventKind::CycleTimedOut)
                    .with_action(action.action_type())
                    .with_cycle(seq)
                    .with_count(abandoned.len()),
            );
        }
    }

    fn report_error(&self, seq: u64, action: &Action, subscriber: &str, err: &SubscriberError) {
        tracing::warn!(
            subscriber,
            action = action.action_type(),
            cycle = seq,
            error = %err,
            "subscriber failed"
        );
        self.events.publish(
            Event::new(EventKind::SubscriberFailed)
                .with_subject(subscriber)
                .with_action(action.action_type())
                .with_cycle(seq)
                .with_reason(err.to_string()),
        );
    }

    fn report_panic(&self, seq: u64, action: &Action, subscriber: &str, message: String) {
        tracing::error!(
            subscriber,
            action = action.action_type(),
            cycle = seq,
            panic = %message,
            "subscriber panicked"
        );
        self.events.publish(
            Event::new(EventKind::SubscriberPanicked)
                .with_subject(subscriber)
                .with_action(action.action_type())
                .with_cycle(seq)
                .with_reason(message),
        );
    }
}
