//! Error types used by the bus and by event handlers.
//!
//! This module defines two error types:
//!
//! - [`BusError`] — configuration errors rejected synchronously at the call
//!   that introduced them (malformed topic, malformed pattern, empty
//!   pattern set). These are the **only** errors a publisher or registrant
//!   ever observes.
//! - [`HandlerError`] — the error a handler returns from its
//!   [`on_event`](crate::Handle::on_event) call. Handler errors are isolated:
//!   they are logged by the delivery layer and never reach the publisher.

use thiserror::Error;

/// # Configuration errors.
///
/// Raised synchronously when a caller supplies a malformed topic or topic
/// pattern, or a subscription without patterns. Nothing that happens *inside*
/// a handler is ever surfaced through this type.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// An event was constructed with an empty topic string.
    #[error("event topic is empty")]
    EmptyTopic,

    /// A concrete topic string is malformed (empty segment, embedded `*`, ...).
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// The offending topic string.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A topic pattern is malformed (partial-segment wildcard, empty segment, ...).
    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern string.
        pattern: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A subscription was registered without any topic pattern.
    #[error("subscription declares no topic patterns")]
    NoPatterns,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use topicbus::BusError;
    ///
    /// assert_eq!(BusError::EmptyTopic.as_label(), "empty_topic");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::EmptyTopic => "empty_topic",
            BusError::InvalidTopic { .. } => "invalid_topic",
            BusError::InvalidPattern { .. } => "invalid_pattern",
            BusError::NoPatterns => "no_patterns",
        }
    }
}

/// # Error returned by a handler invocation.
///
/// An opaque message wrapper: the bus only logs it, so no structure is
/// required. A panicking handler is reported through the same channel.
///
/// # Example
/// ```
/// use topicbus::HandlerError;
///
/// let err = HandlerError::new("downstream unavailable");
/// assert_eq!(err.to_string(), "downstream unavailable");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self(err.to_string())
    }
}
