//! # Transports between processes.
//!
//! A [`Transport`] moves [`Frame`]s between the hub and its peripherals and
//! reports peer lifecycle signals. The relay never touches sockets directly.
//!
//! ```text
//!  peripheral                           hub
//!  ──────────                           ───
//!  send(HUB, Register)  ──────────────► Inbound::Frame { from: P, Register }
//!  send(HUB, Dispatch)  ──────────────► Inbound::Frame { from: P, Dispatch(bytes) }
//!  Inbound::Frame{HUB,…} ◄───────────── send(P, Dispatch(bytes))
//!                        process dies ► Inbound::PeerLost { peer: P, Crashed | Destroyed }
//! ```
//!
//! Implementations:
//! - [`memory`]: in-process network for tests and single-binary setups, with
//!   crash/destroy simulation.
//! - [`stream`]: length-delimited frames over any `AsyncRead + AsyncWrite`
//!   (Unix sockets, pipes, TCP).

pub mod memory;
pub mod stream;

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::action::{TabId, WindowId};
use crate::error::TransportError;

/// Largest frame the stream transport accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Identity of a process on a transport. The hub is always [`PeerId::HUB`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub const HUB: PeerId = PeerId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_hub(self) -> bool {
        self == Self::HUB
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hub() {
            f.write_str("hub")
        } else {
            write!(f, "peer#{}", self.0)
        }
    }
}

/// What the hub knows about a connected peripheral.
///
/// `host_window` is set for hosted contexts (extension-page-like surfaces
/// embedded in another window); their actions are attributed to that window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub window: Option<WindowId>,
    pub tab: Option<TabId>,
    pub host_window: Option<WindowId>,
}

impl PeerInfo {
    /// A peripheral owning `window`.
    pub fn window(window: WindowId) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    /// A hosted peripheral embedded in `host_window`.
    pub fn hosted(host_window: WindowId) -> Self {
        Self {
            host_window: Some(host_window),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tab(mut self, tab: TabId) -> Self {
        self.tab = Some(tab);
        self
    }

    #[inline]
    pub fn is_hosted(&self) -> bool {
        self.host_window.is_some()
    }
}

/// Unit of transfer between processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Peripheral → hub, once per peripheral lifetime.
    Register,
    /// Encoded batch of actions, either direction.
    Dispatch(Bytes),
}

const TAG_REGISTER: u8 = 0x01;
const TAG_DISPATCH: u8 = 0x02;

impl Frame {
    /// Serializes the frame as `tag byte + body`.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Frame::Register => Bytes::from_static(&[TAG_REGISTER]),
            Frame::Dispatch(body) => {
                let mut buf = BytesMut::with_capacity(1 + body.len());
                buf.put_u8(TAG_DISPATCH);
                buf.put_slice(body);
                buf.freeze()
            }
        }
    }

    /// Parses bytes produced by [`Frame::to_bytes`].
    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, TransportError> {
        if bytes.is_empty() {
            return Err(TransportError::MalformedFrame {
                reason: "empty frame".into(),
            });
        }
        let tag = bytes.split_to(1)[0];
        match tag {
            TAG_REGISTER if bytes.is_empty() => Ok(Frame::Register),
            TAG_REGISTER => Err(TransportError::MalformedFrame {
                reason: "register frame carries a body".into(),
            }),
            TAG_DISPATCH => Ok(Frame::Dispatch(bytes)),
            other => Err(TransportError::MalformedFrame {
                reason: format!("unknown frame tag {other:#04x}"),
            }),
        }
    }
}

/// Process lifecycle signal observed by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Crashed,
    Destroyed,
}

impl LifecycleSignal {
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleSignal::Crashed => "crashed",
            LifecycleSignal::Destroyed => "destroyed",
        }
    }
}

/// Item delivered on a transport's inbound stream.
#[derive(Debug)]
pub enum Inbound {
    Frame { from: PeerId, frame: Frame },
    PeerLost { peer: PeerId, signal: LifecycleSignal },
}

pub type InboundRx = mpsc::UnboundedReceiver<Inbound>;

/// Channel between this process and its peers.
///
/// `send` must not block; implementations queue frames internally.
pub trait Transport: Send + Sync + 'static {
    /// Queues a frame for `to`.
    ///
    /// Fails with [`TransportError::PeerUnavailable`] when the peer is gone.
    fn send(&self, to: PeerId, frame: Frame) -> Result<(), TransportError>;

    /// Hands out the inbound stream. Succeeds once.
    fn take_inbound(&self) -> Result<InboundRx, TransportError>;

    /// Identity of a connected peer, as known to this side.
    fn describe(&self, _peer: PeerId) -> Option<PeerInfo> {
        None
    }

    /// Largest frame (tag byte included) `send` accepts; `None` = unbounded.
    fn max_frame_length(&self) -> Option<usize> {
        None
    }
}

/// Shared handle to a transport.
pub type TransportRef = Arc<dyn Transport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_byte_encoding() {
        for frame in [Frame::Register, Frame::Dispatch(Bytes::from_static(b"[1,2]"))] {
            assert_eq!(Frame::from_bytes(frame.to_bytes()).unwrap(), frame);
        }
    }

    #[test]
    fn bad_frames_are_rejected() {
        assert!(Frame::from_bytes(Bytes::new()).is_err());
        assert!(Frame::from_bytes(Bytes::from_static(&[0x01, 0x00])).is_err());
        let err = Frame::from_bytes(Bytes::from_static(&[0x7f])).unwrap_err();
        assert_eq!(err.as_label(), "transport_malformed_frame");
    }

    #[test]
    fn hub_displays_by_name() {
        assert_eq!(PeerId::HUB.to_string(), "hub");
        assert_eq!(PeerId::new(3).to_string(), "peer#3");
    }
}
