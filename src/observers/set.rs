//! # Non-blocking fan-out of diagnostic events to observers.
//!
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - `emit()` returns immediately (`try_send`)
//! - per-observer FIFO, no ordering across observers
//! - a full or closed queue drops the event for that observer only and
//!   publishes `ObserverOverflow` (never for an overflow event itself)
//! - a panicking observer keeps receiving later events

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use super::Observe;
use crate::error::panic_message;
use crate::events::{Event, EventBus};

struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Per-observer bounded queues and worker tasks.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    events: EventBus,
}

impl ObserverSet {
    /// Spawns one worker per observer. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, events: EventBus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for observer in observers {
            let name = observer.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(observer.queue_capacity().max(1));
            let bus = events.clone();

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = observer.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(&*panic);
                        tracing::error!(observer = name, panic = %info, "observer panicked");
                        bus.publish(Event::observer_panicked(name, info));
                    }
                }
            }));
            channels.push(ObserverChannel { name, sender: tx });
        }

        Self {
            channels,
            workers,
            events,
        }
    }

    /// Queues a copy of `event` for every observer.
    pub fn emit(&self, event: &Event) {
        let event = Arc::new(event.clone());
        let overflow = event.is_observer_overflow();

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !overflow {
                self.events
                    .publish(Event::observer_overflow(channel.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Observe for Collect {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.seq);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Observe for Explode {
        async fn on_event(&self, _event: &Event) {
            panic!("observer exploded");
        }

        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[tokio::test]
    async fn every_observer_sees_events_in_order() {
        let bus = EventBus::new(16);
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let observers: Vec<Arc<dyn Observe>> = vec![a.clone(), b.clone()];
        let set = ObserverSet::new(observers, bus);

        let first = Event::new(EventKind::BatchFlushed);
        let second = Event::new(EventKind::PeerRegistered);
        set.emit(&first);
        set.emit(&second);
        set.shutdown().await;

        let expected = vec![first.seq, second.seq];
        assert_eq!(*a.seen.lock().unwrap(), expected);
        assert_eq!(*b.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn panicking_observer_is_reported_and_keeps_running() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let good = Arc::new(Collect::default());
        let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(Explode), good.clone()];
        let set = ObserverSet::new(observers, bus);

        set.emit(&Event::new(EventKind::BatchFlushed));
        set.emit(&Event::new(EventKind::BatchFlushed));
        set.shutdown().await;

        assert_eq!(good.seen.lock().unwrap().len(), 2);
        let mut panics = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.is_observer_panic() {
                assert_eq!(ev.subject.as_deref(), Some("explode"));
                assert_eq!(ev.reason.as_deref(), Some("observer exploded"));
                panics += 1;
            }
        }
        assert_eq!(panics, 2);
    }

    struct Slow;

    #[async_trait]
    impl Observe for Slow {
        async fn on_event(&self, _event: &Event) {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        fn name(&self) -> &'static str {
            "slow"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn full_queue_drops_and_reports_overflow() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let set = ObserverSet::new(vec![Arc::new(Slow) as Arc<dyn Observe>], bus);

        for _ in 0..4 {
            set.emit(&Event::new(EventKind::BatchFlushed));
        }

        let overflow = rx.recv().await.unwrap();
        assert!(overflow.is_observer_overflow());
        assert_eq!(overflow.subject.as_deref(), Some("slow"));
        set.shutdown().await;
    }
}
