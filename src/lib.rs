//! # relaybus
//!
//! **relaybus** is an action dispatch bus that spans processes.
//!
//! Every process runs one dispatch core: actions are queued FIFO and handed
//! to registered subscribers one cycle at a time; a subscriber may wait on
//! other subscribers of the same cycle. Peripheral processes (windows and
//! hosted contexts) relay their actions in time-windowed batches to a hub,
//! which rebroadcasts them to every other peripheral.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────────────────┐                      ┌──────────────────────────┐
//!  │ peripheral (window#1)    │                      │ peripheral (window#2)    │
//!  │ dispatch(a)              │                      │                          │
//!  │   └► Dispatcher ─ cycle ─┼► subscribers         │ subscribers ◄─ cycle ◄─┐ │
//!  │        │ admit/forward   │                      │       admit (target,   │ │
//!  │        ▼                 │                      │       already handled) │ │
//!  │   Cargo(dispatch_interval)                      │                        │ │
//!  └────────┼─────────────────┘                      └────────────────────────┼─┘
//!           │ Frame::Dispatch(codec bytes)                                    │
//!           ▼                                                                 │
//!  ┌─────────────────────────────────────────────────────────────────────┐    │
//!  │ hub                                                                 │    │
//!  │   decode ─► stamp origin ─► Dispatcher ─ cycle ─► hub subscribers   │    │
//!  │                                            ├─► registrant(window#1)  skip (origin)
//!  │                                            └─► registrant(window#2) ─► Cargo ─┘
//!  └─────────────────────────────────────────────────────────────────────┘
//!
//!  Every part publishes diagnostics ─► EventBus ─► ObserverSet ─► Observe::on_event
//! ```
//!
//! ### One cycle
//! ```text
//! queue.recv() ─► route.admit? ─► snapshot subscribers
//!                                   ├─ handle(&action, &cx) → Done | Pending(fut)
//!                                   └─ errors/panics isolated, reported as events
//!              ─► route.forward (relay outbound)
//!              ─► await pending completions (bounded by cycle_timeout)
//!              ─► next action
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Dispatch**      | FIFO cycles, ordered subscribers, `wait_for` between them.   | [`Dispatcher`], [`CycleContext`]            |
//! | **Subscribers**   | Sync entry, optional async completion.                       | [`Subscriber`], [`SubscriberFn`], [`Completion`] |
//! | **Relay**         | Hub / window / hosted wiring over a transport.               | [`NodeBuilder`], [`Node`], [`PeripheralRole`] |
//! | **Transports**    | In-memory network and length-delimited byte streams.         | [`Transport`], [`transport::memory`], [`transport::stream`] |
//! | **Batching**      | Time-windowed coalescing queue.                              | [`Cargo`], [`CargoConfig`]                  |
//! | **Wire codec**    | Action batches to bytes and back.                            | [`codec`]                                   |
//! | **State**         | Reducer-driven state holder.                                 | [`Store`]                                   |
//! | **Diagnostics**   | Broadcast events and async observers.                        | [`Event`], [`EventKind`], [`Observe`]       |
//! | **Errors**        | Typed errors with stable labels.                             | [`DispatchError`], [`RuntimeError`], …      |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], an observer rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use relaybus::{Action, BusConfig, Completion, NodeBuilder, SubscriberFn, WindowId};
//! use relaybus::transport::memory::MemoryNetwork;
//! use relaybus::PeerInfo;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = BusConfig::default();
//!     let net = MemoryNetwork::new();
//!
//!     let hub = NodeBuilder::new(cfg.clone()).hub(Arc::new(net.hub()))?;
//!     let w1 = NodeBuilder::new(cfg.clone())
//!         .window(WindowId(1), Arc::new(net.connect(PeerInfo::window(WindowId(1)))))?;
//!     let w2 = NodeBuilder::new(cfg)
//!         .window(WindowId(2), Arc::new(net.connect(PeerInfo::window(WindowId(2)))))?;
//!
//!     let seen = Arc::new(Mutex::new(Vec::new()));
//!     let sink = Arc::clone(&seen);
//!     w2.register(SubscriberFn::arc("w2", move |a: &Action, _cx| {
//!         sink.lock().unwrap().push(a.action_type().to_string());
//!         Ok(Completion::Done)
//!     }));
//!
//!     while hub.peers().len() < 2 {
//!         tokio::task::yield_now().await;
//!     }
//!     w1.dispatch(Action::new("tab-opened"))?;
//!     while seen.lock().unwrap().is_empty() {
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//!     assert_eq!(*seen.lock().unwrap(), vec!["tab-opened"]);
//!
//!     w1.shutdown().await?;
//!     w2.shutdown().await?;
//!     hub.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod action;
mod cargo;
mod core;
mod error;
mod events;
mod observers;
mod relay;
mod store;
mod subscribers;

pub mod codec;
pub mod transport;

// ---- Public re-exports ----

pub use action::{Action, AddressMetadata, LocalRef, Payload, TabId, Value, WindowId};
pub use cargo::{Cargo, CargoConfig};
pub use core::{
    BusConfig, CycleContext, Dispatcher, Node, NodeBuilder, NodeRole, Origin, SubscriberId,
};
pub use error::{
    CargoError, DispatchError, EncodingError, RuntimeError, SubscriberError, TransportError,
    WaitError,
};
pub use events::{Event, EventBus, EventKind};
pub use observers::{Observe, ObserverSet};
pub use relay::PeripheralRole;
pub use store::Store;
pub use subscribers::{BoxCompletion, Completion, Subscriber, SubscriberFn};
pub use transport::{Frame, Inbound, LifecycleSignal, PeerId, PeerInfo, Transport, TransportRef};

// Optional: `tracing` renderer for diagnostic events (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;
