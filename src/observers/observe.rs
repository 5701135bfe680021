//! # Observe: user-facing diagnostics handlers
//!
//! [`Observe`] is the extension point for everything that wants to watch a
//! node without taking part in dispatch cycles: metrics, alerting, structured
//! logs, test probes.
//!
//! ```text
//! Dispatch core ─┐
//! Hub relay     ─┼─► EventBus ─► Node listener ─► ObserverSet ─► Observe::on_event
//! Peripheral    ─┘
//! ```
//!
//! Observers never see actions' payloads, only [`Event`]s. Unlike a
//! [`Subscriber`](crate::Subscriber), an observer is async and runs on its own
//! worker; a slow observer loses events instead of stalling the bus.
//!
//! # Example
//! ```no_run
//! use async_trait::async_trait;
//! use relaybus::{Event, EventKind, Observe};
//!
//! struct PeerCounter;
//!
//! #[async_trait]
//! impl Observe for PeerCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if let EventKind::PeerRegistered = event.kind {
//!             println!("peer joined: {:?}", event.peer);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "peer-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives diagnostic events published by a node.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles one event. Panics are caught and reported as `ObserverPanicked`.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports.
    fn name(&self) -> &'static str {
        "observer"
    }

    /// Capacity of this observer's queue (min 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
