//! # Cross-process relay.
//!
//! The relay decides, per cycle, whether local subscribers see an action and
//! what leaves the process afterwards:
//!
//! ```text
//!            peripheral (window W)                         hub
//!  dispatch ─► admit? ─► local cycle ─► forward ─► cargo ─► Dispatch frame ─┐
//!                                                                           ▼
//!                                             stamp_origin ─► hub cycle ─► registrants
//!                                                                 (all but origin)
//!                                                                           │
//!  local cycle ◄─ admit? (already handled / target) ◄─ decode ◄─ cargo ◄────┘
//! ```
//!
//! - [`PeripheralRelay`](peripheral::PeripheralRelay): registers once, forwards
//!   locally originated actions to the hub, feeds hub batches to the local core.
//! - [`HubRelay`](hub::HubRelay): one registrant connection per peripheral,
//!   rebroadcast without echo, removal on crash/destroy.
//! - [`resolver`]: origin stamping (hub) and admission (peripheral).

pub(crate) mod hub;
pub(crate) mod peripheral;
pub(crate) mod resolver;

pub use peripheral::PeripheralRole;

use bytes::Bytes;

use crate::action::{Action, Payload};
use crate::codec;
use crate::core::Envelope;
use crate::error::{EncodingError, TransportError};
use crate::events::{Event, EventBus, EventKind};
use crate::transport::{Frame, PeerId, Transport};

/// Per-cycle routing decisions of a dispatch core.
pub(crate) trait Route: Send + Sync + 'static {
    /// Returns true when local subscribers should see the envelope.
    /// May rewrite the envelope's address metadata.
    fn admit(&self, envelope: &mut Envelope) -> bool;

    /// Called once per cycle after subscribers were invoked (or skipped).
    fn forward(&self, envelope: &Envelope);
}

/// Route of standalone and hub processes: deliver everything, relay nothing.
///
/// The hub relays through its registrant subscribers instead.
pub(crate) struct LocalRoute;

impl Route for LocalRoute {
    fn admit(&self, _envelope: &mut Envelope) -> bool {
        true
    }

    fn forward(&self, _envelope: &Envelope) {}
}

/// Encodes a flushed batch and hands it to the transport.
///
/// Encoding failures, including a batch too large for one frame, are fatal to
/// the batch: logged and published, not returned.
pub(crate) fn ship(
    transport: &dyn Transport,
    events: &EventBus,
    to: PeerId,
    limit: Option<usize>,
    batch: Vec<Action>,
) -> Result<(), TransportError> {
    let len = batch.len();
    let limit = match (limit, transport.max_frame_length()) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let encoded = codec::encode(&Payload::Many(batch)).and_then(|bytes| {
        // One tag byte precedes the body on the wire.
        let size = bytes.len() + 1;
        match limit {
            Some(limit) if size > limit => Err(EncodingError::Oversized { size, limit }),
            _ => Ok(bytes),
        }
    });
    let bytes = match encoded {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(peer = %to, batch = len, error = %e, "dropping batch that cannot be encoded");
            events.publish(
                Event::new(EventKind::EncodingFailed)
                    .with_peer(to)
                    .with_count(len)
                    .with_reason(e.to_string()),
            );
            return Ok(());
        }
    };
    transport.send(to, Frame::Dispatch(Bytes::from(bytes)))?;
    tracing::trace!(peer = %to, batch = len, "batch flushed");
    events.publish(Event::new(EventKind::BatchFlushed).with_peer(to).with_count(len));
    Ok(())
}

/// Decodes an inbound batch; malformed bytes are logged, published and dropped.
pub(crate) fn unpack(events: &EventBus, from: PeerId, bytes: &[u8]) -> Option<Vec<Action>> {
    match codec::deserialize(bytes) {
        Ok(actions) => Some(actions),
        Err(e) => {
            tracing::error!(peer = %from, error = %e, "dropping batch that cannot be decoded");
            events.publish(
                Event::new(EventKind::EncodingFailed)
                    .with_peer(from)
                    .with_reason(e.to_string()),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::WindowId;
    use crate::transport::{Inbound, PeerInfo};
    use crate::transport::memory::MemoryNetwork;

    #[tokio::test]
    async fn batch_over_the_frame_limit_is_reported_not_sent() {
        let net = MemoryNetwork::new();
        let hub = net.hub();
        let mut hub_rx = hub.take_inbound().unwrap();
        let peer = net.connect(PeerInfo::window(WindowId(1)));
        let events = EventBus::new(8);
        let mut rx = events.subscribe();

        let batch = vec![Action::new("blob").with_field("b", vec![7u8; 256])];
        ship(&peer, &events, PeerId::HUB, Some(128), batch).unwrap();

        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.kind, EventKind::EncodingFailed);
        assert_eq!(failed.count, Some(1));
        assert!(failed.reason.as_deref().unwrap().contains("128-byte frame limit"));
        assert!(hub_rx.try_recv().is_err());

        ship(&peer, &events, PeerId::HUB, Some(128), vec![Action::new("small")]).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::BatchFlushed);
        assert!(matches!(hub_rx.recv().await, Some(Inbound::Frame { .. })));
    }
}
