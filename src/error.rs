//! Error types used by the relaybus runtime, relay and subscribers.
//!
//! - [`DispatchError`] — an action was refused before entering a cycle.
//! - [`EncodingError`] — a payload could not cross a process boundary.
//! - [`TransportError`] — a frame could not be delivered or read.
//! - [`WaitError`] — a subscriber's `wait_for` could not be satisfied.
//! - [`SubscriberError`] — a subscriber failed while handling an action.
//! - [`CargoError`] — a batch cargo no longer accepts items.
//! - [`RuntimeError`] — node shutdown did not finish within its grace period.
//!
//! Every type provides `as_label` (stable snake_case label for logs/metrics).

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

use crate::core::SubscriberId;
use crate::transport::PeerId;

/// # Errors reported synchronously by `dispatch`.
///
/// A refused action never reaches any subscriber.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The action failed validation (blank `action_type`).
    #[error("invalid action: {reason}")]
    InvalidAction {
        /// What was wrong with the action.
        reason: &'static str,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relaybus::{Action, Dispatcher, BusConfig};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let dispatcher = Dispatcher::new(&BusConfig::default());
    /// let err = dispatcher.dispatch(Action::new("  ")).unwrap_err();
    /// assert_eq!(err.as_label(), "invalid_action");
    /// # }
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::InvalidAction { .. } => "invalid_action",
        }
    }
}

/// # Errors produced by the wire codec.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A field holds an in-process reference.
    #[error("field `{path}` holds an in-process reference ({label}) and cannot be serialized")]
    Unserializable {
        /// Location of the offending value, e.g. `fields.callbacks[1]`.
        path: String,
        /// Label of the [`LocalRef`](crate::LocalRef).
        label: String,
    },

    /// A field holds NaN or an infinity.
    #[error("field `{path}` holds a non-finite float")]
    NonFiniteFloat {
        /// Location of the offending value.
        path: String,
    },

    /// Lists and maps are nested deeper than the codec carries.
    #[error("field `{path}` is nested deeper than {limit} levels")]
    TooDeep {
        /// Location of the first value past the limit.
        path: String,
        /// Maximum nesting level.
        limit: usize,
    },

    /// The encoded batch does not fit in one transport frame.
    #[error("encoded batch of {size} bytes exceeds the {limit}-byte frame limit")]
    Oversized {
        /// Frame size the batch would need.
        size: usize,
        /// Largest frame allowed.
        limit: usize,
    },

    /// Bytes did not decode into a payload.
    #[error("malformed payload: {reason}")]
    Malformed {
        /// Decoder diagnostics.
        reason: String,
    },
}

impl EncodingError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EncodingError::Unserializable { .. } => "encoding_unserializable",
            EncodingError::NonFiniteFloat { .. } => "encoding_non_finite_float",
            EncodingError::TooDeep { .. } => "encoding_too_deep",
            EncodingError::Oversized { .. } => "encoding_oversized",
            EncodingError::Malformed { .. } => "encoding_malformed",
        }
    }
}

/// # Errors produced by transports.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer is gone (destroyed, crashed or never connected).
    #[error("peer {peer} is unavailable")]
    PeerUnavailable {
        /// Peer the frame was addressed to.
        peer: PeerId,
    },

    /// The inbound stream was already handed out.
    #[error("inbound stream already taken")]
    InboundTaken,

    /// A frame could not be parsed.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// Parser diagnostics.
        reason: String,
    },

    /// The frame is larger than the link accepts.
    #[error("frame of {size} bytes exceeds the {limit}-byte limit")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Largest frame the link accepts.
        limit: usize,
    },

    /// Underlying I/O failure.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relaybus::{PeerId, TransportError};
    ///
    /// let err = TransportError::PeerUnavailable { peer: PeerId::new(3) };
    /// assert_eq!(err.as_label(), "transport_peer_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::PeerUnavailable { .. } => "transport_peer_unavailable",
            TransportError::InboundTaken => "transport_inbound_taken",
            TransportError::MalformedFrame { .. } => "transport_malformed_frame",
            TransportError::FrameTooLarge { .. } => "transport_frame_too_large",
            TransportError::Io(_) => "transport_io",
        }
    }

    /// True when the error means "drop this peer".
    pub fn is_peer_gone(&self) -> bool {
        matches!(self, TransportError::PeerUnavailable { .. })
    }
}

/// # Errors returned by [`CycleContext::wait_for`](crate::CycleContext::wait_for).
///
/// A wait failure only affects the waiting subscriber's continuation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// Named subscribers did not complete within the configured wait timeout.
    #[error("waiting for {handles:?} timed out after {timeout:?}")]
    Timeout {
        /// Handles that were awaited.
        handles: Vec<SubscriberId>,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// An awaited subscriber failed, panicked or was abandoned by the cycle.
    #[error("subscriber {handle} did not complete this cycle")]
    Aborted {
        /// The subscriber that did not complete.
        handle: SubscriberId,
    },

    /// The handle does not belong to this cycle.
    #[error("subscriber {handle} is not part of this cycle")]
    UnknownHandle {
        /// The unknown handle.
        handle: SubscriberId,
    },

    /// A subscriber tried to wait on its own completion.
    #[error("subscriber {handle} cannot wait on itself")]
    SelfWait {
        /// The waiting subscriber.
        handle: SubscriberId,
    },
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::Timeout { .. } => "wait_timeout",
            WaitError::Aborted { .. } => "wait_aborted",
            WaitError::UnknownHandle { .. } => "wait_unknown_handle",
            WaitError::SelfWait { .. } => "wait_self",
        }
    }
}

/// # Errors produced by subscribers.
///
/// Isolated per subscriber: logged and published, never propagated to the
/// dispatcher of the action or to other subscribers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// Subscriber-specific failure.
    #[error("subscriber failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// A dependency wait failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

impl SubscriberError {
    /// Wraps any displayable error as [`SubscriberError::Failed`].
    pub fn failed(error: impl std::fmt::Display) -> Self {
        SubscriberError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relaybus::SubscriberError;
    ///
    /// assert_eq!(SubscriberError::failed("boom").as_label(), "subscriber_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscriberError::Failed { .. } => "subscriber_failed",
            SubscriberError::Wait(_) => "subscriber_wait_failed",
        }
    }
}

/// # Errors produced by batch cargos.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CargoError {
    /// The cargo was closed or aborted.
    #[error("cargo is closed")]
    Closed,
}

impl CargoError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CargoError::Closed => "cargo_closed",
        }
    }
}

/// # Errors produced by node lifecycle management.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks remained stuck and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the tasks that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relaybus::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_error_converts_into_subscriber_error() {
        let wait = WaitError::SelfWait {
            handle: SubscriberId::from_raw(4),
        };
        let err: SubscriberError = wait.clone().into();
        assert_eq!(err, SubscriberError::Wait(wait));
        assert_eq!(err.as_label(), "subscriber_wait_failed");
        assert_eq!(err.to_string(), "subscriber sub#4 cannot wait on itself");
    }

    #[test]
    fn encoding_error_names_the_path() {
        let err = EncodingError::Unserializable {
            path: "fields.cb".into(),
            label: "callback".into(),
        };
        assert!(err.to_string().contains("fields.cb"));
        assert_eq!(err.as_label(), "encoding_unserializable");
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*s), "static");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn io_errors_are_wrapped() {
        let err: TransportError = std::io::Error::other("pipe").into();
        assert_eq!(err.as_label(), "transport_io");
        assert!(!err.is_peer_gone());
        assert!(TransportError::PeerUnavailable { peer: PeerId::HUB }.is_peer_gone());
    }
}
