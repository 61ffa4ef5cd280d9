//! # Handler registry: concurrent subscriber index with blacklist.
//!
//! [`HandlerRegistry`] keeps every live [`Registration`] and answers the one
//! question delivery needs: which non-blacklisted registrations match this
//! event's topic and properties?
//!
//! ## Architecture
//! ```text
//! register/reregister/unregister ──► RwLock<Index>
//!                                       ├─ regs:       HandlerId → Arc<Registration>
//!                                       ├─ by_segment: "news" → {ids with a news/... pattern}
//!                                       └─ all_bucket: {ids with a bare * pattern}
//!
//! candidates_for(event):
//!   read lock → collect Arc clones from by_segment[first_segment] ∪ all_bucket
//!   drop lock → pattern match + blacklist check + property filter
//! ```
//!
//! ## Rules
//! - A lookup observes either the pre- or post-mutation state of any entry,
//!   never a partially-updated one (entries are immutable `Arc`s swapped
//!   under the lock).
//! - Filter predicates and pattern matching run **outside** the lock.
//! - The blacklist flag is atomic: blacklisting takes only a read lock and
//!   is a no-op if the identity was unregistered first.
//! - The blacklist is scoped to the registry instance — independent buses
//!   (e.g. in tests) never interfere.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::BusError;
use crate::events::{Event, TopicPattern};

use super::filter::PropertyFilter;
use super::handler::HandlerRef;

/// Stable identity of one registration.
///
/// Assigned by the registry at [`register`](HandlerRegistry::register) time
/// from a monotonic counter. The identity — not the handler object — is what
/// blacklisting tracks: a fresh registration of the same handler gets a new
/// id and starts with a clean slate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One subscriber's registration request: a handler, its topic patterns,
/// and an optional property filter.
///
/// ## Example
/// ```rust
/// use topicbus::{HandlerFn, PropertyFilter, Subscription, TopicPattern};
///
/// let sub = Subscription::new(
///     "sports-feed",
///     HandlerFn::arc(|_ev| async { Ok(()) }),
/// )
/// .with_pattern(TopicPattern::parse("news/*").unwrap())
/// .with_filter(PropertyFilter::property_equals("level", "high"));
/// # let _ = sub;
/// ```
pub struct Subscription {
    name: Cow<'static, str>,
    patterns: Vec<TopicPattern>,
    filter: Option<PropertyFilter>,
    handler: HandlerRef,
}

impl Subscription {
    /// Creates a subscription with no patterns yet.
    ///
    /// The name is a human-readable label used for logging and for matching
    /// against the timeout-exemption list; it carries no uniqueness
    /// requirement.
    pub fn new(name: impl Into<Cow<'static, str>>, handler: HandlerRef) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
            filter: None,
            handler,
        }
    }

    /// Adds one topic pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TopicPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Adds several topic patterns.
    #[must_use]
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = TopicPattern>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Sets the secondary property filter (absence means "matches all").
    #[must_use]
    pub fn with_filter(mut self, filter: PropertyFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A live registration as stored in the registry and handed to delivery.
///
/// Immutable except for the blacklist flag, which flips once and stays set
/// until the identity is re-registered or removed.
pub struct Registration {
    id: HandlerId,
    name: Arc<str>,
    patterns: Vec<TopicPattern>,
    filter: Option<PropertyFilter>,
    handler: HandlerRef,
    blacklisted: AtomicBool,
    /// Epoch milliseconds of the blacklist decision; 0 = never blacklisted.
    blacklisted_at_ms: AtomicU64,
}

impl Registration {
    fn from_parts(id: HandlerId, sub: Subscription) -> Self {
        Self {
            id,
            name: Arc::from(sub.name.as_ref()),
            patterns: sub.patterns,
            filter: sub.filter,
            handler: sub.handler,
            blacklisted: AtomicBool::new(false),
            blacklisted_at_ms: AtomicU64::new(0),
        }
    }

    /// The registry-assigned identity.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The subscription's label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered topic patterns.
    pub fn patterns(&self) -> &[TopicPattern] {
        &self.patterns
    }

    /// True once the registration has been blacklisted.
    pub fn is_blacklisted(&self) -> bool {
        self.blacklisted.load(Ordering::Acquire)
    }

    /// When the registration was blacklisted, if ever.
    pub fn blacklisted_at(&self) -> Option<SystemTime> {
        match self.blacklisted_at_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    pub(crate) fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    fn matches_topic(&self, topic: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(topic))
    }

    fn accepts(&self, event: &Event) -> bool {
        match &self.filter {
            Some(filter) => filter.accepts(event.properties()),
            None => true,
        }
    }

    fn mark_blacklisted(&self) {
        if !self.blacklisted.swap(true, Ordering::AcqRel) {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
                .min(u64::MAX as u128) as u64;
            self.blacklisted_at_ms.store(now.max(1), Ordering::Release);
        }
    }
}

/// Snapshot of one registration for the administrative read path.
#[derive(Clone, Debug)]
pub struct HandlerInfo {
    /// Registry-assigned identity.
    pub id: HandlerId,
    /// Subscription label.
    pub name: String,
    /// Registered patterns, rendered back to their string form.
    pub patterns: Vec<String>,
    /// Whether the registration is currently blacklisted.
    pub blacklisted: bool,
    /// When it was blacklisted, if ever.
    pub blacklisted_at: Option<SystemTime>,
}

/// Index of registrations, bucketed by first topic segment.
#[derive(Default)]
struct Index {
    regs: HashMap<HandlerId, Arc<Registration>>,
    by_segment: HashMap<String, HashSet<HandlerId>>,
    all_bucket: HashSet<HandlerId>,
}

impl Index {
    fn insert(&mut self, reg: Arc<Registration>) {
        let id = reg.id();
        for pattern in reg.patterns() {
            match pattern.first_segment() {
                Some(segment) => {
                    self.by_segment
                        .entry(segment.to_string())
                        .or_default()
                        .insert(id);
                }
                None => {
                    self.all_bucket.insert(id);
                }
            }
        }
        self.regs.insert(id, reg);
    }

    fn remove(&mut self, id: HandlerId) -> Option<Arc<Registration>> {
        let reg = self.regs.remove(&id)?;
        for pattern in reg.patterns() {
            match pattern.first_segment() {
                Some(segment) => {
                    if let Some(bucket) = self.by_segment.get_mut(segment) {
                        bucket.remove(&id);
                        if bucket.is_empty() {
                            self.by_segment.remove(segment);
                        }
                    }
                }
                None => {
                    self.all_bucket.remove(&id);
                }
            }
        }
        Some(reg)
    }

    /// Arc-clones every registration that could match a topic starting with
    /// `first_segment`. Deduplicates ids present in both buckets.
    fn snapshot_for(&self, first_segment: &str) -> Vec<Arc<Registration>> {
        let segment_ids = self.by_segment.get(first_segment);
        let capacity = self.all_bucket.len() + segment_ids.map_or(0, HashSet::len);
        let mut seen = HashSet::with_capacity(capacity);
        let mut out = Vec::with_capacity(capacity);

        let ids = self
            .all_bucket
            .iter()
            .chain(segment_ids.into_iter().flatten());
        for id in ids {
            if seen.insert(*id) {
                if let Some(reg) = self.regs.get(id) {
                    out.push(Arc::clone(reg));
                }
            }
        }
        out
    }
}

/// Concurrent registry of handler registrations.
///
/// ### Responsibilities
/// - Assigns identities and owns registration lifetimes
/// - Resolves delivery candidates per event (topic + filter + blacklist)
/// - Tracks the blacklist (scoped to this instance)
///
/// All operations are synchronous and take the lock only briefly, so the
/// registry is usable from both async delivery paths and non-async discovery
/// callbacks.
pub struct HandlerRegistry {
    index: RwLock<Index>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a registration under a fresh identity.
    ///
    /// Fails with [`BusError::NoPatterns`] if the subscription declares no
    /// topic patterns. The returned id is never blacklisted at birth, even
    /// if the same handler object was blacklisted under a previous identity.
    pub fn register(&self, subscription: Subscription) -> Result<HandlerId, BusError> {
        if subscription.patterns.is_empty() {
            return Err(BusError::NoPatterns);
        }
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let reg = Arc::new(Registration::from_parts(id, subscription));
        self.write().insert(reg);
        Ok(id)
    }

    /// Replaces the topic/filter data of an existing identity and clears any
    /// blacklist entry for it.
    ///
    /// Returns `Ok(false)` if the identity is not currently registered.
    pub fn reregister(
        &self,
        id: HandlerId,
        subscription: Subscription,
    ) -> Result<bool, BusError> {
        if subscription.patterns.is_empty() {
            return Err(BusError::NoPatterns);
        }
        let mut index = self.write();
        if index.remove(id).is_none() {
            return Ok(false);
        }
        index.insert(Arc::new(Registration::from_parts(id, subscription)));
        Ok(true)
    }

    /// Removes a registration and its blacklist entry.
    ///
    /// Subsequent lookups never return the identity. Returns `false` if it
    /// was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.write().remove(id).is_some()
    }

    /// Marks a registration blacklisted.
    ///
    /// A blacklisted registration is never selected as a delivery candidate
    /// again until the identity is re-registered. No-op (returns `false`)
    /// if the identity no longer exists — a concurrent `unregister` wins.
    pub fn blacklist(&self, id: HandlerId) -> bool {
        let index = self.read();
        match index.regs.get(&id) {
            Some(reg) => {
                reg.mark_blacklisted();
                true
            }
            None => false,
        }
    }

    /// Returns every non-blacklisted registration whose patterns match the
    /// event's topic and whose filter (if any) accepts its properties.
    ///
    /// Order is unspecified. The result is a snapshot: concurrent
    /// register/unregister calls are neither blocked nor reflected.
    pub fn candidates_for(&self, event: &Event) -> Vec<Arc<Registration>> {
        let snapshot = self.read().snapshot_for(event.first_segment());
        snapshot
            .into_iter()
            .filter(|reg| !reg.is_blacklisted())
            .filter(|reg| reg.matches_topic(event.topic()))
            .filter(|reg| reg.accepts(event))
            .collect()
    }

    /// Snapshot of all registrations for administrative tooling, sorted by id.
    pub fn list(&self) -> Vec<HandlerInfo> {
        let index = self.read();
        let mut infos: Vec<HandlerInfo> = index
            .regs
            .values()
            .map(|reg| HandlerInfo {
                id: reg.id(),
                name: reg.name().to_string(),
                patterns: reg.patterns().iter().map(ToString::to_string).collect(),
                blacklisted: reg.is_blacklisted(),
                blacklisted_at: reg.blacklisted_at(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let mut index = self.write();
        *index = Index::default();
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.read().regs.len()
    }

    /// True if no registrations exist.
    pub fn is_empty(&self) -> bool {
        self.read().regs.is_empty()
    }

    // Lock poisoning only happens if a panic lands inside one of the short
    // critical sections above; the index is still structurally sound, so
    // recover instead of propagating the poison.
    fn read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
