//! # Bus configuration.
//!
//! Provides [`BusConfig`], the settings shared by a node's dispatcher, relay
//! cargos, diagnostics bus and shutdown sequence.
//!
//! ## Sentinel values
//! - `max_batch = 0` → batches are bounded by time only
//! - `wait_timeout = 0s` → `wait_for` waits until the cycle ends
//! - `cycle_timeout = 0s` → a cycle waits for every pending subscriber
//! - `grace = 0s` → shutdown aborts tasks immediately
//! - `max_frame_length = 0` → no size check before relaying a batch

use std::time::Duration;

use crate::cargo::CargoConfig;
use crate::transport::DEFAULT_MAX_FRAME_LENGTH;

/// Configuration for a bus node.
///
/// ## Field semantics
/// - `dispatch_interval`: batching window of a peripheral's outbound cargo
/// - `registrant_interval`: batching window of each hub registrant cargo
/// - `max_batch`: early-flush size threshold for every cargo (`0` = unlimited)
/// - `wait_timeout`: bound on a single `CycleContext::wait_for` (`0s` = none)
/// - `cycle_timeout`: bound on the completion phase of one cycle (`0s` = none)
/// - `event_capacity`: diagnostics ring buffer size (min 1; clamped)
/// - `grace`: maximum wait for node tasks to stop on shutdown
/// - `max_frame_length`: largest encoded batch a relay sends (`0` = unchecked)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over repeating sentinel
/// checks across the codebase.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Flush interval of the peripheral → hub cargo.
    pub dispatch_interval: Duration,

    /// Flush interval of every hub → peripheral cargo.
    pub registrant_interval: Duration,

    /// Size threshold for early flush (`0` = unlimited).
    pub max_batch: usize,

    /// How long a subscriber may wait on other subscribers of the same cycle.
    ///
    /// Exceeding it yields `WaitError::Timeout` for that subscriber only.
    pub wait_timeout: Duration,

    /// How long a cycle waits for pending subscriber completions.
    ///
    /// Completions still pending at the deadline are cancelled and their
    /// handles aborted; the next cycle then starts.
    pub cycle_timeout: Duration,

    /// Capacity of the diagnostics broadcast channel.
    ///
    /// Receivers that lag behind more than `event_capacity` events skip the
    /// oldest ones.
    pub event_capacity: usize,

    /// Maximum time to wait for node tasks on shutdown before aborting them.
    pub grace: Duration,

    /// Largest frame a relay hands to its transport, tag byte included.
    ///
    /// Larger batches are dropped and reported as `EncodingFailed` at the
    /// sender. The transport's own limit applies as well when it is smaller.
    pub max_frame_length: usize,
}

impl BusConfig {
    /// Cargo policy for the peripheral's outbound relay.
    #[inline]
    pub fn dispatch_cargo(&self) -> CargoConfig {
        CargoConfig::new(self.dispatch_interval).with_max_batch(self.max_batch)
    }

    /// Cargo policy for a hub registrant connection.
    #[inline]
    pub fn registrant_cargo(&self) -> CargoConfig {
        CargoConfig::new(self.registrant_interval).with_max_batch(self.max_batch)
    }

    /// Returns the `wait_for` bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn wait_limit(&self) -> Option<Duration> {
        (!self.wait_timeout.is_zero()).then_some(self.wait_timeout)
    }

    /// Returns the cycle completion bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn cycle_limit(&self) -> Option<Duration> {
        (!self.cycle_timeout.is_zero()).then_some(self.cycle_timeout)
    }

    /// Returns the relay frame bound as an `Option` (`None` = unchecked).
    #[inline]
    pub fn frame_limit(&self) -> Option<usize> {
        (self.max_frame_length != 0).then_some(self.max_frame_length)
    }

    /// Returns the diagnostics capacity clamped to a minimum of 1.
    #[inline]
    pub fn event_capacity_clamped(&self) -> usize {
        self.event_capacity.max(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `dispatch_interval = 200ms`
    /// - `registrant_interval = 20ms`
    /// - `max_batch = 0` (time-bounded batches only)
    /// - `wait_timeout = 5s`
    /// - `cycle_timeout = 30s`
    /// - `event_capacity = 1024`
    /// - `grace = 5s`
    /// - `max_frame_length = 8 MiB`
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_millis(200),
            registrant_interval: Duration::from_millis(20),
            max_batch: 0,
            wait_timeout: Duration::from_secs(5),
            cycle_timeout: Duration::from_secs(30),
            event_capacity: 1024,
            grace: Duration::from_secs(5),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}
