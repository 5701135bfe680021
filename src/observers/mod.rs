//! Observers of a node's diagnostic events.
//!
//! - [`Observe`]: the async handler trait
//! - [`ObserverSet`]: per-observer queue + worker fan-out
//! - [`LogWriter`]: `tracing` renderer (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod observe;
mod set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observe::Observe;
pub use set::ObserverSet;
