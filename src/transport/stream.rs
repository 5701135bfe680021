//! # Byte-stream transport.
//!
//! Carries [`Frame`]s over any `AsyncRead + AsyncWrite` (Unix sockets, pipes,
//! TCP, `tokio::io::duplex`) using length-delimited framing:
//!
//! ```text
//! ┌──────────────┬─────────┬──────────────────────┐
//! │ len: u32 BE  │ tag: u8 │ body (encoded batch) │
//! └──────────────┴─────────┴──────────────────────┘
//! ```
//!
//! Each link runs a reader task and a writer task. The reader turns a clean
//! EOF into [`LifecycleSignal::Destroyed`] and an I/O error into
//! [`LifecycleSignal::Crashed`]. Dropping a transport closes its write
//! direction, which the other end observes as EOF.
//!
//! Both ends of a link must agree on the maximum frame length
//! ([`DEFAULT_MAX_FRAME_LENGTH`] unless set). `send` rejects larger frames with
//! [`TransportError::FrameTooLarge`] and the link stays up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::{
    DEFAULT_MAX_FRAME_LENGTH, Frame, Inbound, InboundRx, LifecycleSignal, PeerId, PeerInfo,
    Transport,
};
use crate::error::TransportError;

struct Link {
    info: PeerInfo,
    outbound: mpsc::UnboundedSender<Bytes>,
}

struct HubLinks {
    next_peer: AtomicU64,
    links: Mutex<HashMap<PeerId, Link>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<Option<InboundRx>>,
}

impl HubLinks {
    fn links(&self) -> MutexGuard<'_, HashMap<PeerId, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hub side: accepts one stream per peripheral.
///
/// Must be used inside a Tokio runtime (`accept` spawns link tasks).
#[derive(Clone)]
pub struct StreamHub {
    inner: Arc<HubLinks>,
    max_frame_length: usize,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHub {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(HubLinks {
                next_peer: AtomicU64::new(1),
                links: Mutex::new(HashMap::new()),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
            }),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Sets the frame limit for links accepted from now on.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Adopts a connected stream as a new peripheral.
    pub fn accept<S>(&self, stream: S, info: PeerInfo) -> PeerId
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = PeerId::new(self.inner.next_peer.fetch_add(1, Ordering::Relaxed));
        let weak = Arc::downgrade(&self.inner);
        // Held across the spawn so a link that dies at once is removed after insertion.
        let mut links = self.inner.links();
        let outbound = spawn_link(
            stream,
            peer,
            self.max_frame_length,
            self.inner.inbound_tx.clone(),
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.links().remove(&peer);
                }
            },
        );
        links.insert(peer, Link { info, outbound });
        peer
    }

    /// Currently connected peripherals.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.inner.links().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Transport for StreamHub {
    fn send(&self, to: PeerId, frame: Frame) -> Result<(), TransportError> {
        let bytes = fit(frame, self.max_frame_length)?;
        let links = self.inner.links();
        let link = links
            .get(&to)
            .ok_or(TransportError::PeerUnavailable { peer: to })?;
        link.outbound
            .send(bytes)
            .map_err(|_| TransportError::PeerUnavailable { peer: to })
    }

    fn take_inbound(&self) -> Result<InboundRx, TransportError> {
        self.inner
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::InboundTaken)
    }

    fn describe(&self, peer: PeerId) -> Option<PeerInfo> {
        self.inner.links().get(&peer).map(|l| l.info)
    }

    fn max_frame_length(&self) -> Option<usize> {
        Some(self.max_frame_length)
    }
}

/// Peripheral side: a single stream to the hub.
pub struct StreamPeer {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<Option<InboundRx>>,
    max_frame_length: usize,
}

impl StreamPeer {
    /// Starts the link tasks over a stream connected to the hub.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::connect_with_max_frame_length(stream, DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Like [`connect`](Self::connect), with the frame limit the hub uses.
    pub fn connect_with_max_frame_length<S>(stream: S, max_frame_length: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let outbound = spawn_link(stream, PeerId::HUB, max_frame_length, inbound_tx, || {});
        Self {
            outbound,
            inbound: Mutex::new(Some(inbound_rx)),
            max_frame_length,
        }
    }
}

impl Transport for StreamPeer {
    fn send(&self, to: PeerId, frame: Frame) -> Result<(), TransportError> {
        if !to.is_hub() {
            return Err(TransportError::PeerUnavailable { peer: to });
        }
        let bytes = fit(frame, self.max_frame_length)?;
        self.outbound
            .send(bytes)
            .map_err(|_| TransportError::PeerUnavailable { peer: to })
    }

    fn take_inbound(&self) -> Result<InboundRx, TransportError> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::InboundTaken)
    }

    fn max_frame_length(&self) -> Option<usize> {
        Some(self.max_frame_length)
    }
}

fn fit(frame: Frame, limit: usize) -> Result<Bytes, TransportError> {
    let bytes = frame.to_bytes();
    if bytes.len() > limit {
        return Err(TransportError::FrameTooLarge {
            size: bytes.len(),
            limit,
        });
    }
    Ok(bytes)
}

/// Spawns the reader/writer pair of one link and returns the writer's queue.
///
/// `on_close` runs once the reader stops, before the `PeerLost` signal is sent.
fn spawn_link<S, C>(
    stream: S,
    peer: PeerId,
    max_frame_length: usize,
    inbound: mpsc::UnboundedSender<Inbound>,
    on_close: C,
) -> mpsc::UnboundedSender<Bytes>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let codec = || {
        LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_length)
            .new_codec()
    };
    let mut reader = FramedRead::new(read_half, codec());
    let mut writer = FramedWrite::new(write_half, codec());
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.send(bytes).await {
                tracing::warn!(peer = %peer, error = %e, "stream write failed; closing link");
                break;
            }
        }
        // Shuts the write direction down so the other end reads EOF.
        if let Err(e) = SinkExt::<Bytes>::close(&mut writer).await {
            tracing::debug!(peer = %peer, error = %e, "stream close failed");
        }
    });

    tokio::spawn(async move {
        let signal = loop {
            match reader.next().await {
                Some(Ok(buf)) => match Frame::from_bytes(buf.freeze()) {
                    Ok(frame) => {
                        if inbound.send(Inbound::Frame { from: peer, frame }).is_err() {
                            break LifecycleSignal::Destroyed;
                        }
                    }
                    Err(e) => tracing::warn!(peer = %peer, error = %e, "dropping malformed frame"),
                },
                Some(Err(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "stream read failed");
                    break LifecycleSignal::Crashed;
                }
                None => break LifecycleSignal::Destroyed,
            }
        };
        on_close();
        let _ = inbound.send(Inbound::PeerLost { peer, signal });
    });

    tx
}
