//! # Core subscriber trait
//!
//! `Subscriber` is the extension point for reacting to actions. The dispatch
//! core calls [`Subscriber::handle`] once per cycle, in registration order,
//! on the core task.
//!
//! ## Contract
//! - `handle` must not block: it runs on the single core task, so a slow
//!   `handle` delays every later subscriber and every queued action.
//! - Asynchronous work is returned as [`Completion::Pending`]; the core polls
//!   it concurrently with the other pending completions of the same cycle and
//!   does not wait for it before invoking the next subscriber.
//! - Errors and panics are isolated: they abort this subscriber's completion
//!   handle for the cycle and are reported, nothing more.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::action::Action;
use crate::core::CycleContext;
use crate::error::SubscriberError;

/// Boxed completion future returned by asynchronous subscribers.
pub type BoxCompletion = Pin<Box<dyn Future<Output = Result<(), SubscriberError>> + Send + 'static>>;

/// Outcome of [`Subscriber::handle`].
pub enum Completion {
    /// Finished synchronously.
    Done,
    /// Finishes when the future resolves.
    Pending(BoxCompletion),
}

impl Completion {
    /// Wraps a future as a pending completion.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<(), SubscriberError>> + Send + 'static,
    {
        Completion::Pending(Box::pin(fut))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Done => f.write_str("Done"),
            Completion::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Contract for action subscribers.
pub trait Subscriber: Send + Sync + 'static {
    /// Reacts to one action within a dispatch cycle.
    ///
    /// # Parameters
    /// - `action`: the action being delivered
    /// - `cx`: the cycle context (handles to wait on, origin, sequence number)
    fn handle(&self, action: &Action, cx: &CycleContext) -> Result<Completion, SubscriberError>;

    /// Human-readable name (for logs/diagnostics).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
