//! Diagnostic events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`EventBus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: dispatch core, `HubRelay`, `PeripheralRelay`, `Node`,
//!   `ObserverSet` workers (overflow/panic).
//! - **Consumers**: `Node`'s observer listener (fans out to `ObserverSet`) and
//!   any receiver obtained through `Node::events().subscribe()`.

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{Event, EventKind};
