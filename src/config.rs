//! # Global bus configuration.
//!
//! Provides [`BusConfig`] — the settings a hosting environment passes to
//! [`EventBus::start`](crate::EventBus::start).
//!
//! ## Sentinel values
//! - `timeout = 0s` → no delivery deadline (handlers may run indefinitely,
//!   no blacklisting occurs)
//! - `pool_size = 0` → unbounded worker pool (no cap on concurrent
//!   handler invocations)

use std::time::Duration;

/// Configuration for one bus instance.
///
/// Defines:
/// - **Delivery deadline**: how long a handler may run before it is
///   considered hung and blacklisted
/// - **Timeout exemptions**: handlers (by subscription name) that are never
///   blacklisted even when they exceed the deadline
/// - **Ignore topics**: patterns whose events are dropped before delivery
/// - **Enrichment**: whether a `timestamp` / `subject` property is added to
///   events that lack one
/// - **Worker pool**: cap on concurrently running handler invocations
///
/// ## Field semantics
/// - `timeout`: per-invocation deadline (`0s` = disabled)
/// - `timeout_exempt`: exact subscription name, or a `prefix*` wildcard
/// - `ignore_topics`: topic patterns, validated at [`EventBus::start`](crate::EventBus::start)
/// - `pool_size`: worker cap (`0` = unbounded)
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Maximum time one handler invocation may run before the bus stops
    /// waiting for it and blacklists the handler.
    ///
    /// `Duration::ZERO` disables the deadline entirely: intended for trusted
    /// subscriber populations and test environments.
    pub timeout: Duration,

    /// Subscription names that are never blacklisted on timeout.
    ///
    /// Each entry is either an exact name or a prefix wildcard ending in `*`
    /// (e.g. `"audit*"` exempts every subscription whose name starts with
    /// `audit`). The deadline still applies — the publisher is released when
    /// it expires — but the handler stays registered.
    pub timeout_exempt: Vec<String>,

    /// Topic patterns whose events are dropped before any handler sees them.
    ///
    /// Same syntax as subscription patterns (exact topic, `prefix/*`, or
    /// bare `*`). Malformed entries are rejected by
    /// [`EventBus::start`](crate::EventBus::start).
    pub ignore_topics: Vec<String>,

    /// Add a `timestamp` property (epoch milliseconds at acceptance) to
    /// events that do not already carry one.
    pub add_timestamp: bool,

    /// Add a `subject` property (from the configured
    /// [`SubjectProvider`](crate::SubjectProvider)) to events that do not
    /// already carry one.
    pub add_subject: bool,

    /// Maximum number of handler invocations running at the same time.
    ///
    /// - `0` = unbounded (every invocation gets a worker immediately)
    /// - `n > 0` = at most `n` workers; additional invocations wait
    ///
    /// Abandoned (timed-out) workers do not count against the cap: the pool
    /// grows by one replacement for each of them.
    pub pool_size: usize,
}

impl BusConfig {
    /// Returns the delivery deadline as an `Option`.
    ///
    /// - `None` → no deadline, no blacklisting
    /// - `Some(d)` → handlers exceeding `d` are timed out
    #[inline]
    pub fn delivery_deadline(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the worker cap as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` concurrent handler invocations
    #[inline]
    pub fn worker_limit(&self) -> Option<usize> {
        if self.pool_size == 0 {
            None
        } else {
            Some(self.pool_size)
        }
    }

    /// Returns true if the given subscription name matches an entry of the
    /// timeout-exemption list (exact match, or `prefix*` wildcard).
    pub fn is_timeout_exempt(&self, name: &str) -> bool {
        self.timeout_exempt.iter().any(|rule| match rule.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => rule == name,
        })
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `timeout = 5s` (hung handlers are blacklisted after five seconds)
    /// - `timeout_exempt = []`
    /// - `ignore_topics = []`
    /// - `add_timestamp = false`
    /// - `add_subject = false`
    /// - `pool_size = 10`
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            timeout_exempt: Vec::new(),
            ignore_topics: Vec::new(),
            add_timestamp: false,
            add_subject: false,
            pool_size: 10,
        }
    }
}
