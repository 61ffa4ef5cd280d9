//! # Immutable events distributed by the bus.
//!
//! An [`Event`] is a validated topic plus a read-only property map, fixed at
//! construction. Cloning is cheap (both fields are `Arc`-backed), and the
//! `with_*` builders return **new** values — an event handed to `send`/`post`
//! is never mutated, enrichment included.
//!
//! ## Example
//! ```rust
//! use topicbus::Event;
//!
//! let ev = Event::new("news/sports")
//!     .unwrap()
//!     .with_property("level", "high");
//!
//! assert_eq!(ev.topic(), "news/sports");
//! assert_eq!(ev.property("level").and_then(|v| v.as_str()), Some("high"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::BusError;

use super::topic::validate_topic;

/// Property name for the enrichment timestamp (epoch milliseconds).
pub const TIMESTAMP_PROPERTY: &str = "timestamp";

/// Property name for the enrichment subject (ambient caller identity).
pub const SUBJECT_PROPERTY: &str = "subject";

/// Read-only property mapping carried by an event.
pub type Properties = BTreeMap<String, Value>;

/// Immutable (topic, properties) value.
///
/// ### Properties
/// - **Validated**: the topic is checked at construction; a malformed topic
///   is a configuration error, never silently accepted.
/// - **Immutable**: all `with_*` methods build a new event (copy-on-write on
///   the property map).
/// - **Cheap Clone**: `Arc`-backed topic and properties.
#[derive(Clone, Debug)]
pub struct Event {
    topic: Arc<str>,
    properties: Arc<Properties>,
}

impl Event {
    /// Creates an event with the given topic and no properties.
    ///
    /// Fails with [`BusError::EmptyTopic`] / [`BusError::InvalidTopic`] for
    /// empty or malformed topics (empty segments, `*` characters).
    pub fn new(topic: impl AsRef<str>) -> Result<Self, BusError> {
        let topic = topic.as_ref();
        validate_topic(topic)?;
        Ok(Self {
            topic: topic.into(),
            properties: Arc::new(Properties::new()),
        })
    }

    /// Replaces the whole property map.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    /// Returns a new event with the property set (overwriting any previous
    /// value under that name).
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.properties).insert(name.into(), value.into());
        self
    }

    /// Returns a new event with the property set only if absent.
    ///
    /// Enrichment uses this: an existing `timestamp`/`subject` supplied by
    /// the publisher is never overwritten.
    #[must_use]
    pub fn with_property_if_absent(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let name = name.into();
        if !self.properties.contains_key(&name) {
            Arc::make_mut(&mut self.properties).insert(name, value.into());
        }
        self
    }

    /// The event's topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// First segment of the topic (always present: topics are non-empty).
    pub(crate) fn first_segment(&self) -> &str {
        self.topic.split('/').next().unwrap_or(&self.topic)
    }

    /// The full property map.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Looks up one property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Current wall-clock time as an epoch-milliseconds property value.
    pub(crate) fn timestamp_now() -> Value {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Value::from(ms.min(u64::MAX as u128) as u64)
    }
}
