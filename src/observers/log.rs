//! # LogWriter: renders diagnostic events through `tracing`.
//!
//! Enabled via the `logging` feature. Useful for demos and debugging; install
//! any `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  relaybus::events: [peer-registered] peer=peer#1
//! DEBUG relaybus::events: [batch-flushed] peer=hub count=3
//! WARN  relaybus::events: [subscriber-failed] cycle=4 action="save" subscriber="disk" reason="disk full"
//! WARN  relaybus::events: [peer-removed] peer=peer#2 reason="crashed"
//! INFO  relaybus::events: [shutdown-requested]
//! ```

use async_trait::async_trait;

use super::Observe;
use crate::events::{Event, EventKind};

/// Observer that logs every event.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let peer = e.peer.map(|p| p.to_string());
        match e.kind {
            EventKind::SubscriberFailed | EventKind::SubscriberPanicked => {
                tracing::warn!(
                    target: "relaybus::events",
                    "[{}] cycle={:?} action={:?} subscriber={:?} reason={:?}",
                    label(e.kind), e.cycle, e.action, e.subject, e.reason
                );
            }
            EventKind::CycleTimedOut => {
                tracing::warn!(
                    target: "relaybus::events",
                    "[cycle-timed-out] cycle={:?} action={:?} abandoned={:?}",
                    e.cycle, e.action, e.count
                );
            }
            EventKind::ActionAbsorbed => {
                tracing::debug!(target: "relaybus::events", "[action-absorbed] action={:?}", e.action);
            }
            EventKind::BatchFlushed => {
                tracing::debug!(
                    target: "relaybus::events",
                    "[batch-flushed] peer={} count={:?}",
                    peer.as_deref().unwrap_or("-"), e.count
                );
            }
            EventKind::EncodingFailed | EventKind::RelayFailed | EventKind::PeerRemoved => {
                tracing::warn!(
                    target: "relaybus::events",
                    "[{}] peer={} count={:?} reason={:?}",
                    label(e.kind), peer.as_deref().unwrap_or("-"), e.count, e.reason
                );
            }
            EventKind::PeerRegistered => {
                tracing::info!(
                    target: "relaybus::events",
                    "[peer-registered] peer={}",
                    peer.as_deref().unwrap_or("-")
                );
            }
            EventKind::ObserverOverflow | EventKind::ObserverPanicked => {
                tracing::warn!(
                    target: "relaybus::events",
                    "[{}] observer={:?} reason={:?}",
                    label(e.kind), e.subject, e.reason
                );
            }
            EventKind::ShutdownRequested | EventKind::AllStoppedWithin => {
                tracing::info!(target: "relaybus::events", "[{}]", label(e.kind));
            }
            EventKind::GraceExceeded => {
                tracing::error!(
                    target: "relaybus::events",
                    "[grace-exceeded] stuck={:?}",
                    e.reason
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

fn label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::ObserverPanicked => "observer-panicked",
        EventKind::ObserverOverflow => "observer-overflow",
        EventKind::SubscriberFailed => "subscriber-failed",
        EventKind::SubscriberPanicked => "subscriber-panicked",
        EventKind::CycleTimedOut => "cycle-timed-out",
        EventKind::ActionAbsorbed => "action-absorbed",
        EventKind::BatchFlushed => "batch-flushed",
        EventKind::EncodingFailed => "encoding-failed",
        EventKind::PeerRegistered => "peer-registered",
        EventKind::PeerRemoved => "peer-removed",
        EventKind::RelayFailed => "relay-failed",
        EventKind::ShutdownRequested => "shutdown-requested",
        EventKind::AllStoppedWithin => "all-stopped-within-grace",
        EventKind::GraceExceeded => "grace-exceeded",
    }
}
