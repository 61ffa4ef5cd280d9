//! # Secondary property filter.
//!
//! A [`PropertyFilter`] is a predicate over an event's property map,
//! evaluated after the topic pattern has matched. A registration without a
//! filter accepts every matching event.
//!
//! Filters are evaluated outside the registry lock, so a slow predicate
//! cannot block concurrent register/unregister calls — but they should still
//! be cheap and side-effect free.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::events::Properties;

/// Shared predicate over an event's properties.
///
/// # Example
/// ```
/// use topicbus::{Event, PropertyFilter};
///
/// let filter = PropertyFilter::property_equals("level", "high");
/// let ev = Event::new("x").unwrap().with_property("level", "high");
/// assert!(filter.accepts(ev.properties()));
/// ```
#[derive(Clone)]
pub struct PropertyFilter {
    predicate: Arc<dyn Fn(&Properties) -> bool + Send + Sync>,
}

impl PropertyFilter {
    /// Wraps an arbitrary predicate.
    pub fn new(predicate: impl Fn(&Properties) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// The common case: accept events whose property `name` equals `value`.
    ///
    /// A missing property never matches.
    pub fn property_equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        Self::new(move |props| props.get(&name) == Some(&value))
    }

    /// Evaluates the predicate.
    pub fn accepts(&self, properties: &Properties) -> bool {
        (self.predicate)(properties)
    }
}

impl fmt::Debug for PropertyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PropertyFilter")
    }
}
