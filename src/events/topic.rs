//! # Topic patterns and matching.
//!
//! Topics are hierarchical, `/`-segmented strings (`"news/sports/results"`).
//! A [`TopicPattern`] is either an exact topic, a hierarchical prefix ending
//! in `/*`, or the bare `*` that matches everything.
//!
//! ## Rules
//! - Exact pattern matches only the identical topic.
//! - `P/*` matches `P` itself and every topic below it (`P/x`, `P/x/y`, ...).
//! - `*` matches every topic.
//! - Partial-segment wildcards (`a*b`, `news/*/results`) are rejected at
//!   parse time.
//! - Matching is pure and lock-free; patterns are validated once, at
//!   registration.

use std::fmt;
use std::sync::Arc;

use crate::error::BusError;

/// Validates a concrete (non-pattern) topic string.
///
/// A topic must be non-empty, contain no empty segments (no leading,
/// trailing, or doubled `/`), and no `*` characters.
pub(crate) fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() {
        return Err(BusError::EmptyTopic);
    }
    for segment in topic.split('/') {
        if segment.is_empty() {
            return Err(BusError::InvalidTopic {
                topic: topic.to_string(),
                reason: "empty topic segment",
            });
        }
        if segment.contains('*') {
            return Err(BusError::InvalidTopic {
                topic: topic.to_string(),
                reason: "'*' is not allowed in a concrete topic",
            });
        }
    }
    Ok(())
}

/// A validated topic pattern.
///
/// Construct with [`TopicPattern::parse`]; matching via
/// [`TopicPattern::matches`] is side-effect free and safe to call
/// concurrently.
///
/// # Example
/// ```
/// use topicbus::TopicPattern;
///
/// let p = TopicPattern::parse("news/*").unwrap();
/// assert!(p.matches("news"));
/// assert!(p.matches("news/sports/results"));
/// assert!(!p.matches("newsletter"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    /// Matches exactly one topic.
    Exact(Arc<str>),
    /// `P/*`: matches `P` and everything hierarchically below it.
    Prefix(Arc<str>),
    /// Bare `*`: matches every topic.
    All,
}

impl TopicPattern {
    /// Parses and validates a pattern string.
    ///
    /// Accepted forms: a concrete topic, `prefix/*`, or `*`. Anything else
    /// (empty string, empty segments, `*` anywhere but the trailing
    /// position) is a configuration error.
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        if pattern.is_empty() {
            return Err(BusError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty pattern",
            });
        }
        if pattern == "*" {
            return Ok(TopicPattern::All);
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            validate_topic(prefix).map_err(|_| BusError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "invalid prefix before '/*'",
            })?;
            return Ok(TopicPattern::Prefix(prefix.into()));
        }
        if pattern.contains('*') {
            return Err(BusError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "'*' is only allowed as a whole trailing segment",
            });
        }
        validate_topic(pattern).map_err(|_| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "malformed topic",
        })?;
        Ok(TopicPattern::Exact(pattern.into()))
    }

    /// Returns true if this pattern matches the given concrete topic.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::All => true,
            TopicPattern::Exact(exact) => exact.as_ref() == topic,
            TopicPattern::Prefix(prefix) => {
                topic == prefix.as_ref()
                    || topic
                        .strip_prefix(prefix.as_ref())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// First topic segment covered by this pattern, used for index bucketing.
    ///
    /// `None` for [`TopicPattern::All`], which matches every first segment.
    pub(crate) fn first_segment(&self) -> Option<&str> {
        match self {
            TopicPattern::All => None,
            TopicPattern::Exact(t) => t.split('/').next(),
            TopicPattern::Prefix(p) => p.split('/').next(),
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::All => f.write_str("*"),
            TopicPattern::Exact(t) => f.write_str(t),
            TopicPattern::Prefix(p) => write!(f, "{p}/*"),
        }
    }
}
