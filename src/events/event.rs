//! # Diagnostic events emitted by dispatchers, relays and nodes.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Observer events**: observer fan-out problems (overflow, panic)
//! - **Dispatch events**: cycle-level failures and absorbed actions
//! - **Relay events**: batches, encoding failures, peer connections
//! - **Shutdown events**: node teardown progress
//!
//! The [`Event`] struct carries additional metadata such as the action type,
//! cycle number, subscriber or peer, and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use relaybus::{Event, EventKind, PeerId};
//!
//! let ev = Event::new(EventKind::PeerRemoved)
//!     .with_peer(PeerId::new(2))
//!     .with_reason("crashed");
//!
//! assert_eq!(ev.kind, EventKind::PeerRemoved);
//! assert_eq!(ev.peer, Some(PeerId::new(2)));
//! assert_eq!(ev.reason.as_deref(), Some("crashed"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::transport::PeerId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Observer events ===
    /// Observer panicked during event processing.
    ///
    /// Sets:
    /// - `subject`: observer name
    /// - `reason`: panic info/message
    ObserverPanicked,

    /// Observer dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subject`: observer name
    /// - `reason`: reason string (e.g., "full", "closed")
    ObserverOverflow,

    // === Dispatch events ===
    /// A subscriber returned an error (synchronously or from its completion).
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `action`: action type
    /// - `cycle`: cycle sequence number
    /// - `reason`: error message
    SubscriberFailed,

    /// A subscriber panicked (in `handle` or in its completion future).
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `action`: action type
    /// - `cycle`: cycle sequence number
    /// - `reason`: panic message
    SubscriberPanicked,

    /// A cycle hit its deadline with completions still pending.
    ///
    /// Sets:
    /// - `action`: action type
    /// - `cycle`: cycle sequence number
    /// - `count`: number of abandoned completions
    CycleTimedOut,

    /// A dispatch arrived after shutdown and was absorbed.
    ///
    /// Sets:
    /// - `action`: action type
    ActionAbsorbed,

    // === Relay events ===
    /// A batch was handed to the transport.
    ///
    /// Sets:
    /// - `peer`: destination
    /// - `count`: number of actions in the batch
    BatchFlushed,

    /// A batch could not be encoded or an inbound batch could not be decoded.
    ///
    /// Sets:
    /// - `peer`: destination (outbound) or source (inbound)
    /// - `count`: batch size when known
    /// - `reason`: codec error message
    EncodingFailed,

    /// Hub accepted a peripheral registration.
    ///
    /// Sets:
    /// - `peer`: registered peer
    PeerRegistered,

    /// A peer connection was removed (crash, destroy, unreachable).
    ///
    /// Sets:
    /// - `peer`: removed peer
    /// - `reason`: removal reason label
    PeerRemoved,

    /// A peripheral could not reach the hub.
    ///
    /// Sets:
    /// - `peer`: the hub
    /// - `count`: size of the lost batch
    /// - `reason`: transport error message
    RelayFailed,

    // === Shutdown events ===
    /// Node shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// All node tasks stopped within configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks did not stop in time.
    ///
    /// Sets:
    /// - `reason`: names of the stuck tasks
    GraceExceeded,
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Action type involved, if applicable.
    pub action: Option<Arc<str>>,
    /// Dispatch cycle sequence number (per process).
    pub cycle: Option<u64>,
    /// Name of the subscriber or observer involved.
    pub subject: Option<Arc<str>>,
    /// Peer involved.
    pub peer: Option<PeerId>,
    /// Batch size or number of affected items.
    pub count: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            action: None,
            cycle: None,
            subject: None,
            peer: None,
            count: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_action(mut self, action_type: impl Into<Arc<str>>) -> Self {
        self.action = Some(action_type.into());
        self
    }

    #[inline]
    pub fn with_cycle(mut self, seq: u64) -> Self {
        self.cycle = Some(seq);
        self
    }

    /// Attaches a subscriber or observer name.
    #[inline]
    pub fn with_subject(mut self, name: impl Into<Arc<str>>) -> Self {
        self.subject = Some(name.into());
        self
    }

    #[inline]
    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Attaches a count (saturated to `u32::MAX`).
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_subject(observer)
            .with_reason(format!("observer={observer} reason={reason}"))
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_subject(observer)
            .with_reason(info)
    }

    #[inline]
    pub fn is_observer_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ObserverOverflow)
    }

    #[inline]
    pub fn is_observer_panic(&self) -> bool {
        matches!(self.kind, EventKind::ObserverPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::BatchFlushed);
        let b = Event::new(EventKind::BatchFlushed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn count_saturates() {
        let ev = Event::new(EventKind::CycleTimedOut).with_count(usize::MAX);
        assert_eq!(ev.count, Some(u32::MAX));
    }

    #[test]
    fn overflow_helper_fills_subject_and_reason() {
        let ev = Event::observer_overflow("audit", "full");
        assert!(ev.is_observer_overflow());
        assert_eq!(ev.subject.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("observer=audit reason=full"));
    }
}
