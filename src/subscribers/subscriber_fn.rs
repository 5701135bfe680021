//! # Function-backed subscriber (`SubscriberFn`)
//!
//! [`SubscriberFn`] wraps a closure `F: Fn(&Action, &CycleContext) -> Result<Completion, _>`.
//! State shared with the rest of the application goes in an explicit `Arc<...>`
//! captured by the closure.
//!
//! ## Example
//! ```rust
//! use relaybus::{Completion, Subscriber, SubscriberFn};
//!
//! let s = SubscriberFn::arc("audit", |action, _cx| {
//!     println!("saw {}", action.action_type());
//!     Ok(Completion::Done)
//! });
//!
//! assert_eq!(s.name(), "audit");
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use super::subscriber::{Completion, Subscriber};
use crate::action::Action;
use crate::core::CycleContext;
use crate::error::SubscriberError;

/// Function-backed subscriber implementation.
pub struct SubscriberFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> SubscriberFn<F>
where
    F: Fn(&Action, &CycleContext) -> Result<Completion, SubscriberError> + Send + Sync + 'static,
{
    /// Creates a new function-backed subscriber.
    ///
    /// Prefer [`SubscriberFn::arc`] when registering right away.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the subscriber as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Subscriber for SubscriberFn<F>
where
    F: Fn(&Action, &CycleContext) -> Result<Completion, SubscriberError> + Send + Sync + 'static,
{
    fn handle(&self, action: &Action, cx: &CycleContext) -> Result<Completion, SubscriberError> {
        (self.f)(action, cx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
