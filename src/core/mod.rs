//! Runtime core: dispatch cycles and node lifecycle.
//!
//! The public surface is [`Dispatcher`] (dispatch, register, wait), the
//! per-cycle [`CycleContext`] and the [`Node`] built by [`NodeBuilder`].
//!
//! Internal modules:
//! - [`dispatcher`]: the FIFO queue and the core task running one cycle at a time;
//! - [`cycle`]: per-cycle completion handles and `wait_for`;
//! - [`registry`]: copy-on-write subscriber list;
//! - [`node`] / [`builder`]: role wiring, observers and graceful shutdown;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod config;
mod cycle;
mod dispatcher;
mod node;
mod registry;
mod shutdown;

pub use builder::NodeBuilder;
pub use config::BusConfig;
pub use cycle::{CycleContext, Origin};
pub use dispatcher::Dispatcher;
pub use node::{Node, NodeRole};
pub use registry::SubscriberId;

pub(crate) use dispatcher::Envelope;
