//! # Action subscribers.
//!
//! - [`Subscriber`] — trait implemented by anything that reacts to actions.
//! - [`Completion`] — synchronous or future-backed completion of one delivery.
//! - [`SubscriberFn`] — closure-backed subscriber.

mod subscriber;
mod subscriber_fn;

pub use subscriber::{BoxCompletion, Completion, Subscriber};
pub use subscriber_fn::SubscriberFn;
