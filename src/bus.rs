//! # Bus facade: lifecycle, publication entry points, and the post queue.
//!
//! [`EventBus`] ties the registry and the delivery machinery together and
//! exposes the two publication contracts:
//!
//! ```text
//! send(event)  ── async, blocking contract ──► Coordinator::send
//!                  (caller awaits every candidate's outcome)
//!
//! post(event)  ── fire-and-forget ──► admit ──► unbounded FIFO queue
//!                                                  │
//!                                   dispatcher task (one per start)
//!                                                  │
//!                                     Coordinator::deliver(event)
//!                                     (candidates resolved HERE, in
//!                                      submission order)
//! ```
//!
//! ## Lifecycle
//! - `start(config)` validates the ignore-topic patterns, builds the worker
//!   pool / supervisor / coordinator, and spawns the post dispatcher.
//! - `stop()` cancels the dispatcher and drops the active state; subsequent
//!   `send`/`post` calls behave as if no handlers matched (silent no-op,
//!   never an error). Registrations survive a stop/start cycle — their
//!   lifetime belongs to the hosting discovery layer.
//!
//! ## Rules
//! - `post` never blocks the submitter; per-submitter FIFO holds because
//!   the queue preserves sender order and a single dispatcher drains it.
//! - A timed-out handler does not stall the post queue (the supervisor
//!   detaches its worker).
//! - Nothing originating inside a handler ever reaches a publisher.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::dispatch::{Coordinator, DeliverySupervisor, SubjectProvider, WorkerPool};
use crate::error::BusError;
use crate::events::{Event, TopicPattern};
use crate::handlers::{HandlerId, HandlerInfo, HandlerRegistry, Subscription};

/// Delivery state that exists only while the bus is started.
struct Active {
    coordinator: Arc<Coordinator>,
    post_tx: mpsc::UnboundedSender<Event>,
    token: CancellationToken,
    ignore_topics: Vec<TopicPattern>,
}

/// In-process publish/subscribe bus.
///
/// One instance owns one registry and one blacklist; independent instances
/// never interfere. See the crate docs for the full delivery contracts.
///
/// ## Example
/// ```rust
/// use topicbus::{BusConfig, Event, EventBus, HandlerFn, Subscription, TopicPattern};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let bus = EventBus::new();
///     bus.register(
///         Subscription::new("printer", HandlerFn::arc(|ev: Event| async move {
///             println!("got {}", ev.topic());
///             Ok(())
///         }))
///         .with_pattern(TopicPattern::parse("news/*")?),
///     )?;
///
///     bus.start(BusConfig::default())?;
///     bus.send(Event::new("news/sports")?).await;
///     bus.stop();
///     Ok(())
/// }
/// ```
pub struct EventBus {
    registry: Arc<HandlerRegistry>,
    subject: RwLock<Option<Arc<dyn SubjectProvider>>>,
    active: RwLock<Option<Active>>,
}

impl EventBus {
    /// Creates a stopped bus with an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HandlerRegistry::new()),
            subject: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    /// Installs the ambient identity source used for `subject` enrichment.
    ///
    /// Takes effect at the next [`start`](EventBus::start).
    pub fn set_subject_provider(&self, provider: Arc<dyn SubjectProvider>) {
        *lock_write(&self.subject) = Some(provider);
    }

    /// Starts delivery with the given configuration.
    ///
    /// Validates the ignore-topic patterns (malformed entries are rejected
    /// as configuration errors), builds the delivery machinery, and spawns
    /// the post dispatcher. Calling `start` on a running bus replaces the
    /// active configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, config: BusConfig) -> Result<(), BusError> {
        let ignore_topics = config
            .ignore_topics
            .iter()
            .map(|p| TopicPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = Arc::new(WorkerPool::new(config.worker_limit()));
        let supervisor = DeliverySupervisor::new(pool, config.delivery_deadline());
        let subject = lock_read(&self.subject).clone();
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&self.registry),
            supervisor,
            config,
            ignore_topics.clone(),
            subject,
        ));

        let (post_tx, post_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        Self::spawn_dispatcher(Arc::clone(&coordinator), post_rx, token.clone());

        let previous = lock_write(&self.active).replace(Active {
            coordinator,
            post_tx,
            token,
            ignore_topics,
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        Ok(())
    }

    /// Stops delivery.
    ///
    /// Queued but undelivered posted events are discarded; an in-flight
    /// `send` completes best-effort. Subsequent publications are silent
    /// no-ops until the next `start`. Registrations are kept.
    pub fn stop(&self) {
        if let Some(active) = lock_write(&self.active).take() {
            active.token.cancel();
        }
    }

    /// True while the bus is started.
    pub fn is_running(&self) -> bool {
        lock_read(&self.active).is_some()
    }

    /// Synchronous publication.
    ///
    /// Returns once every matching, non-blacklisted handler (resolved once,
    /// at call time) has completed, failed, or been timed out — no handler
    /// invocation for this event is still pending afterwards. On a stopped
    /// bus this is a silent no-op.
    pub async fn send(&self, event: Event) {
        let coordinator = lock_read(&self.active)
            .as_ref()
            .map(|active| Arc::clone(&active.coordinator));
        match coordinator {
            Some(coordinator) => coordinator.send(event).await,
            None => debug!(topic = event.topic(), "send on stopped bus; event dropped"),
        }
    }

    /// Asynchronous publication.
    ///
    /// Returns immediately after the event is accepted; candidates are
    /// resolved when the dispatcher processes the event, so last-moment
    /// registry changes are visible. Events posted by one submitter reach
    /// candidate resolution in submission order. On a stopped bus this is a
    /// silent no-op.
    pub fn post(&self, event: Event) {
        let guard = lock_read(&self.active);
        let Some(active) = guard.as_ref() else {
            debug!(topic = event.topic(), "post on stopped bus; event dropped");
            return;
        };
        // Ignore-topic check and enrichment happen at acceptance; candidate
        // resolution is deferred to the dispatcher.
        let Some(event) = active.coordinator.admit(event) else {
            return;
        };
        if active.post_tx.send(event).is_err() {
            warn!("post dispatcher is gone; event dropped");
        }
    }

    /// Adds a registration under a fresh identity. See
    /// [`HandlerRegistry::register`].
    pub fn register(&self, subscription: Subscription) -> Result<HandlerId, BusError> {
        self.registry.register(subscription)
    }

    /// Replaces an existing identity's data and clears its blacklist entry.
    /// See [`HandlerRegistry::reregister`].
    pub fn reregister(
        &self,
        id: HandlerId,
        subscription: Subscription,
    ) -> Result<bool, BusError> {
        self.registry.reregister(id, subscription)
    }

    /// Removes a registration. See [`HandlerRegistry::unregister`].
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.registry.unregister(id)
    }

    /// The registry backing this bus, for discovery layers that manage
    /// registrations directly.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Administrative read path: identities, patterns, blacklist status.
    pub fn list_handlers(&self) -> Vec<HandlerInfo> {
        self.registry.list()
    }

    /// Administrative read path: the active ignore-topic patterns (empty
    /// while stopped).
    pub fn list_ignore_topics(&self) -> Vec<String> {
        lock_read(&self.active)
            .as_ref()
            .map(|active| {
                active
                    .ignore_topics
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drains the post queue in FIFO order until the token is cancelled.
    fn spawn_dispatcher(
        coordinator: Arc<Coordinator>,
        mut post_rx: mpsc::UnboundedReceiver<Event>,
        token: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Cancellation wins over queued events: `stop` discards
                    // the backlog instead of racing it.
                    biased;
                    _ = token.cancelled() => break,
                    received = post_rx.recv() => match received {
                        Some(event) => coordinator.deliver(event).await,
                        None => break,
                    },
                }
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// Poison recovery for the two facade locks; critical sections are trivial.
fn lock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time;

    use crate::events::TIMESTAMP_PROPERTY;
    use crate::handlers::{HandlerFn, HandlerRef, PropertyFilter};

    fn counting_handler(hits: &Arc<AtomicUsize>) -> HandlerRef {
        let hits = Arc::clone(hits);
        HandlerFn::arc(move |_ev: Event| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn recording_handler(log: &Arc<Mutex<Vec<String>>>) -> HandlerRef {
        let log = Arc::clone(log);
        HandlerFn::arc(move |ev: Event| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(ev.topic().to_string());
                Ok(())
            }
        })
    }

    fn pattern(p: &str) -> TopicPattern {
        TopicPattern::parse(p).unwrap()
    }

    fn no_timeout_config() -> BusConfig {
        let mut cfg = BusConfig::default();
        cfg.timeout = Duration::ZERO;
        cfg
    }

    async fn drain_post_queue() {
        // The dispatcher runs on the same current-thread runtime; yielding
        // through a timer lets it drain everything already queued.
        time::sleep(Duration::from_millis(20)).await;
    }

    /// Polls `cond` until it holds; works under both real and paused clocks.
    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn test_send_reaches_matching_handlers_only() {
        let bus = EventBus::new();
        let news_hits = Arc::new(AtomicUsize::new(0));
        let weather_hits = Arc::new(AtomicUsize::new(0));

        bus.register(
            Subscription::new("news", counting_handler(&news_hits))
                .with_pattern(pattern("news/*")),
        )
        .unwrap();
        bus.register(
            Subscription::new("weather", counting_handler(&weather_hits))
                .with_pattern(pattern("weather/today")),
        )
        .unwrap();
        bus.start(no_timeout_config()).unwrap();

        bus.send(Event::new("news/sports").unwrap()).await;
        assert_eq!(news_hits.load(Ordering::SeqCst), 1);
        assert_eq!(weather_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_property_filter_gates_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(
            Subscription::new("filtered", counting_handler(&hits))
                .with_pattern(pattern("*"))
                .with_filter(PropertyFilter::property_equals("level", "high")),
        )
        .unwrap();
        bus.start(no_timeout_config()).unwrap();

        bus.send(Event::new("x").unwrap().with_property("level", "low"))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.send(Event::new("x").unwrap().with_property("level", "high"))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_handler_times_out_and_is_blacklisted() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slow = {
            let hits = Arc::clone(&hits);
            HandlerFn::arc(move |_ev: Event| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                }
            })
        };
        let id = bus
            .register(Subscription::new("slow", slow).with_pattern(pattern("news/*")))
            .unwrap();

        let mut cfg = BusConfig::default();
        cfg.timeout = Duration::from_millis(50);
        bus.start(cfg).unwrap();

        // First send: invoked once, times out, blacklisted.
        bus.send(Event::new("news/sports").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let info = &bus.list_handlers()[0];
        assert_eq!(info.id, id);
        assert!(info.blacklisted);

        // Second send: the blacklisted handler is never invoked again.
        bus.send(Event::new("news/weather").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Fresh re-registration clears the entry.
        assert!(bus
            .reregister(
                id,
                Subscription::new("slow", counting_handler(&hits))
                    .with_pattern(pattern("news/*"))
            )
            .unwrap());
        bus.send(Event::new("news/weather").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_exempt_handler_is_not_blacklisted() {
        let bus = EventBus::new();
        bus.register(
            Subscription::new(
                "trusted",
                HandlerFn::arc(|_ev: Event| async move {
                    time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }),
            )
            .with_pattern(pattern("*")),
        )
        .unwrap();

        let mut cfg = BusConfig::default();
        cfg.timeout = Duration::from_millis(50);
        cfg.timeout_exempt = vec!["trusted".to_string()];
        bus.start(cfg).unwrap();

        bus.send(Event::new("x").unwrap()).await;
        assert!(!bus.list_handlers()[0].blacklisted);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_affect_others_or_blacklist() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.register(
            Subscription::new(
                "failing",
                HandlerFn::arc(|_ev: Event| async { Err("boom".into()) }),
            )
            .with_pattern(pattern("*")),
        )
        .unwrap();
        bus.register(Subscription::new("ok", counting_handler(&hits)).with_pattern(pattern("*")))
            .unwrap();
        bus.start(BusConfig::default()).unwrap();

        bus.send(Event::new("x").unwrap()).await;
        bus.send(Event::new("x").unwrap()).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(bus.list_handlers().iter().all(|info| !info.blacklisted));
    }

    #[tokio::test]
    async fn test_ignore_topics_drop_events_before_any_handler() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(
            Subscription::new("all", counting_handler(&hits)).with_pattern(pattern("*")),
        )
        .unwrap();

        let mut cfg = no_timeout_config();
        cfg.ignore_topics = vec!["debug/*".to_string()];
        bus.start(cfg).unwrap();

        bus.post(Event::new("debug/trace").unwrap());
        bus.send(Event::new("debug/trace").unwrap()).await;
        drain_post_queue().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.send(Event::new("info/x").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(bus.list_ignore_topics(), vec!["debug/*".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_ignore_topic_rejected_at_start() {
        let bus = EventBus::new();
        let mut cfg = BusConfig::default();
        cfg.ignore_topics = vec!["a*b".to_string()];
        assert!(matches!(
            bus.start(cfg),
            Err(BusError::InvalidPattern { .. })
        ));
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn test_post_is_fifo_per_submitter() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register(
            Subscription::new("recorder", recording_handler(&log)).with_pattern(pattern("*")),
        )
        .unwrap();
        bus.start(no_timeout_config()).unwrap();

        for i in 0..10 {
            bus.post(Event::new(format!("seq/{i}")).unwrap());
        }
        wait_for(|| log.lock().unwrap().len() == 10).await;

        let delivered = log.lock().unwrap().clone();
        let expected: Vec<String> = (0..10).map(|i| format!("seq/{i}")).collect();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn test_post_sees_late_registrations() {
        // Candidates for a posted event are resolved at processing time.
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.start(no_timeout_config()).unwrap();

        bus.post(Event::new("late/news").unwrap());
        bus.register(
            Subscription::new("late", counting_handler(&hits)).with_pattern(pattern("late/*")),
        )
        .unwrap();
        wait_for(|| hits.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_enrichment_adds_timestamp_without_mutating_original() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None::<Event>));
        let capture = {
            let seen = Arc::clone(&seen);
            HandlerFn::arc(move |ev: Event| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = Some(ev);
                    Ok(())
                }
            })
        };
        bus.register(Subscription::new("capture", capture).with_pattern(pattern("*")))
            .unwrap();

        let mut cfg = no_timeout_config();
        cfg.add_timestamp = true;
        bus.start(cfg).unwrap();

        let original = Event::new("t").unwrap();
        bus.send(original.clone()).await;

        let delivered = seen.lock().unwrap().clone().expect("handler invoked");
        assert!(delivered.property(TIMESTAMP_PROPERTY).is_some());
        // The caller's event object is unmodified.
        assert!(original.property(TIMESTAMP_PROPERTY).is_none());
    }

    #[tokio::test]
    async fn test_existing_timestamp_is_never_overwritten() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None::<Event>));
        let capture = {
            let seen = Arc::clone(&seen);
            HandlerFn::arc(move |ev: Event| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = Some(ev);
                    Ok(())
                }
            })
        };
        bus.register(Subscription::new("capture", capture).with_pattern(pattern("*")))
            .unwrap();

        let mut cfg = no_timeout_config();
        cfg.add_timestamp = true;
        bus.start(cfg).unwrap();

        bus.send(Event::new("t").unwrap().with_property(TIMESTAMP_PROPERTY, 42))
            .await;
        let delivered = seen.lock().unwrap().clone().expect("handler invoked");
        assert_eq!(
            delivered.property(TIMESTAMP_PROPERTY),
            Some(&serde_json::Value::from(42))
        );
    }

    #[tokio::test]
    async fn test_subject_enrichment_uses_provider() {
        struct FixedSubject;
        impl SubjectProvider for FixedSubject {
            fn subject(&self) -> Option<String> {
                Some("operator".to_string())
            }
        }

        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None::<Event>));
        let capture = {
            let seen = Arc::clone(&seen);
            HandlerFn::arc(move |ev: Event| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = Some(ev);
                    Ok(())
                }
            })
        };
        bus.register(Subscription::new("capture", capture).with_pattern(pattern("*")))
            .unwrap();
        bus.set_subject_provider(Arc::new(FixedSubject));

        let mut cfg = no_timeout_config();
        cfg.add_subject = true;
        bus.start(cfg).unwrap();

        bus.send(Event::new("t").unwrap()).await;
        let delivered = seen.lock().unwrap().clone().expect("handler invoked");
        assert_eq!(
            delivered
                .property(crate::events::SUBJECT_PROPERTY)
                .and_then(|v| v.as_str()),
            Some("operator")
        );
    }

    #[tokio::test]
    async fn test_stopped_bus_is_a_silent_noop() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(
            Subscription::new("all", counting_handler(&hits)).with_pattern(pattern("*")),
        )
        .unwrap();

        // Never started.
        bus.send(Event::new("x").unwrap()).await;
        bus.post(Event::new("x").unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(bus.list_ignore_topics().is_empty());

        // Started, then stopped: registrations survive, delivery halts.
        bus.start(no_timeout_config()).unwrap();
        bus.send(Event::new("x").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.stop();
        assert!(!bus.is_running());
        bus.send(Event::new("x").unwrap()).await;
        bus.post(Event::new("x").unwrap());
        drain_post_queue().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.list_handlers().len(), 1);

        // Restart resumes delivery with the surviving registration.
        bus.start(no_timeout_config()).unwrap();
        bus.send(Event::new("x").unwrap()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_waits_for_every_candidate() {
        let bus = EventBus::new();
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let done = Arc::clone(&done);
            bus.register(
                Subscription::new(
                    format!("h{i}"),
                    HandlerFn::arc(move |_ev: Event| {
                        let done = Arc::clone(&done);
                        async move {
                            time::sleep(Duration::from_millis(20)).await;
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                )
                .with_pattern(pattern("*")),
            )
            .unwrap();
        }
        bus.start(no_timeout_config()).unwrap();

        bus.send(Event::new("x").unwrap()).await;
        // The blocking contract: all three outcomes are in before send returns.
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_post_delivery_does_not_stall_the_queue() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.register(
            Subscription::new(
                "hung",
                HandlerFn::arc(|_ev: Event| async move {
                    time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }),
            )
            .with_pattern(pattern("first/*")),
        )
        .unwrap();
        bus.register(
            Subscription::new("prompt", counting_handler(&hits))
                .with_pattern(pattern("second/*")),
        )
        .unwrap();

        let mut cfg = BusConfig::default();
        cfg.timeout = Duration::from_millis(50);
        cfg.pool_size = 1;
        bus.start(cfg).unwrap();

        bus.post(Event::new("first/hang").unwrap());
        bus.post(Event::new("second/ok").unwrap());
        wait_for(|| hits.load(Ordering::SeqCst) == 1).await;
        let infos = bus.list_handlers();
        assert!(infos.iter().any(|i| i.name == "hung" && i.blacklisted));
        assert!(infos.iter().any(|i| i.name == "prompt" && !i.blacklisted));
    }

    #[tokio::test]
    async fn test_send_uses_the_candidate_set_resolved_at_call_time() {
        let bus = Arc::new(EventBus::new());
        let peer_hits = Arc::new(AtomicUsize::new(0));
        let late_hits = Arc::new(AtomicUsize::new(0));

        let peer_id = bus
            .register(
                Subscription::new("peer", counting_handler(&peer_hits)).with_pattern(pattern("*")),
            )
            .unwrap();

        // Mutates the registry from inside its own invocation: adds a new
        // subscription and removes the peer.
        let mutator = {
            let bus = Arc::clone(&bus);
            let late_hits = Arc::clone(&late_hits);
            HandlerFn::arc(move |_ev: Event| {
                let bus = Arc::clone(&bus);
                let late_hits = Arc::clone(&late_hits);
                async move {
                    bus.register(
                        Subscription::new("late", counting_handler(&late_hits))
                            .with_pattern(pattern("*")),
                    )
                    .map_err(|e| e.to_string())?;
                    bus.unregister(peer_id);
                    Ok(())
                }
            })
        };
        bus.register(Subscription::new("mutator", mutator).with_pattern(pattern("*")))
            .unwrap();
        bus.start(no_timeout_config()).unwrap();

        // Candidates were resolved at call time: the peer unregistered
        // mid-delivery still receives this event, the mid-delivery
        // registration does not.
        bus.send(Event::new("x").unwrap()).await;
        assert_eq!(peer_hits.load(Ordering::SeqCst), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        // The next send resolves against the mutated registry.
        bus.send(Event::new("y").unwrap()).await;
        assert_eq!(peer_hits.load(Ordering::SeqCst), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_send_complete() {
        let bus = Arc::new(EventBus::new());
        let started = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let slow = {
            let started = Arc::clone(&started);
            let hits = Arc::clone(&hits);
            HandlerFn::arc(move |_ev: Event| {
                let started = Arc::clone(&started);
                let hits = Arc::clone(&hits);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(100)).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        bus.register(Subscription::new("slow", slow).with_pattern(pattern("*")))
            .unwrap();
        bus.start(no_timeout_config()).unwrap();

        let send = tokio::spawn({
            let bus = Arc::clone(&bus);
            async move { bus.send(Event::new("x").unwrap()).await }
        });
        wait_for(|| started.load(Ordering::SeqCst) == 1).await;

        // Stopping mid-delivery: the in-flight send still completes.
        bus.stop();
        send.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Publications after the stop are silent no-ops.
        bus.send(Event::new("x").unwrap()).await;
        bus.post(Event::new("x").unwrap());
        drain_post_queue().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_discards_queued_posted_events() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(
            Subscription::new("all", counting_handler(&hits)).with_pattern(pattern("*")),
        )
        .unwrap();
        bus.start(no_timeout_config()).unwrap();

        // No await point between the posts and the stop: the dispatcher has
        // not run yet, so the whole backlog is still queued.
        for i in 0..5 {
            bus.post(Event::new(format!("seq/{i}")).unwrap());
        }
        bus.stop();

        drain_post_queue().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscription_name_allows_owned_strings() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let name = format!("dynamic-{}", 1);
        bus.register(Subscription::new(name, counting_handler(&hits)).with_pattern(pattern("*")))
            .unwrap();
        assert_eq!(bus.list_handlers()[0].name, "dynamic-1");
    }
}
