//! In-process broker delivering through the task engine.
//!
//! Every accepted publish becomes one engine task. The task snapshots the
//! handler list for the envelope's (topic, type) under the registry lock,
//! releases the lock, then calls the handlers one after the other. Handlers
//! may publish or subscribe themselves without deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, error, info, trace, warn};
use walrus_task::error::panic_message;
use walrus_task::{Task, TaskEngine, TaskPriority};

use crate::broker::{Broker, ErasedHandler};
use crate::message::{Envelope, TypeTag};

/// Handler lists are copy-on-write so delivery can hold a snapshot.
type Handlers = Arc<Vec<ErasedHandler>>;
type Registry = HashMap<String, HashMap<TypeTag, Handlers>>;

/// Point-in-time broker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Publishes accepted for delivery.
    pub published: u64,
    /// Handler calls that returned normally.
    pub processed: u64,
    /// Handler calls that panicked.
    pub failed: u64,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    published: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, envelope: &Envelope) -> Option<Handlers> {
        self.registry()
            .get(envelope.topic())
            .and_then(|types| types.get(&envelope.tag()))
            .map(Arc::clone)
    }

    fn deliver(&self, envelope: &Envelope) {
        let Some(handlers) = self.snapshot(envelope) else {
            trace!(
                topic = envelope.topic(),
                payload = envelope.tag().name(),
                "no subscribers"
            );
            return;
        };

        for handler in handlers.iter() {
            match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                Ok(()) => {
                    self.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        topic = envelope.topic(),
                        payload = envelope.tag().name(),
                        panic = %panic_message(payload.as_ref()),
                        "message handler panicked"
                    );
                }
            }
        }
    }
}

/// The default [`Broker`]: topic → type → handlers, delivered on the
/// [`TaskEngine`].
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    engine: OnceLock<TaskEngine>,
    running: AtomicBool,
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("running", &self.is_running())
            .field("topics", &self.topic_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create an uninitialised, stopped broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            engine: OnceLock::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Attach the task engine. Only the first call has an effect.
    ///
    /// Returns `false` if an engine was already attached.
    pub fn init(&self, engine: TaskEngine) -> bool {
        let attached = self.engine.set(engine).is_ok();
        if !attached {
            warn!("broker already initialised; ignoring engine");
        }
        attached
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.shared.published.load(Ordering::Relaxed),
            processed: self.shared.processed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Number of topics with at least one subscription.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.shared.registry().len()
    }

    /// Number of registered handlers across all topics and types.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .registry()
            .values()
            .flat_map(|types| types.values())
            .map(|handlers| handlers.len())
            .sum()
    }

    /// Names of the topics with at least one subscription.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.shared.registry().keys().cloned().collect()
    }
}

impl Broker for InMemoryBroker {
    fn subscribe_erased(&self, topic: &str, tag: TypeTag, handler: ErasedHandler) {
        let mut registry = self.shared.registry();
        let handlers = registry
            .entry(topic.to_string())
            .or_default()
            .entry(tag)
            .or_default();
        Arc::make_mut(handlers).push(handler);
        debug!(
            topic,
            payload = tag.name(),
            handlers = handlers.len(),
            "subscribed"
        );
    }

    fn publish_envelope(&self, envelope: Envelope) -> bool {
        let Some(engine) = self.engine.get() else {
            debug!(topic = envelope.topic(), "publish before init; dropped");
            return false;
        };
        if !self.is_running() {
            debug!(topic = envelope.topic(), "publish while stopped; dropped");
            return false;
        }

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let label = format!("deliver:{}", envelope.topic());
        engine.submit(
            Task::blocking(label, move || shared.deliver(&envelope)),
            TaskPriority::Normal,
        );
        true
    }

    fn unsubscribe(&self, topic: &str, tag: Option<TypeTag>) {
        let mut registry = self.shared.registry();
        match tag {
            None => {
                if registry.remove(topic).is_some() {
                    debug!(topic, "unsubscribed topic");
                }
            }
            Some(tag) => {
                let Some(types) = registry.get_mut(topic) else {
                    return;
                };
                if types.remove(&tag).is_some() {
                    debug!(topic, payload = tag.name(), "unsubscribed type");
                }
                if types.is_empty() {
                    registry.remove(topic);
                }
            }
        }
    }

    fn start(&self) -> bool {
        if self.engine.get().is_none() {
            warn!("broker started before init; publishes stay disabled");
            return false;
        }
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("broker started");
        }
        true
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let stats = self.stats();
        info!(
            published = stats.published,
            processed = stats.processed,
            failed = stats.failed,
            "broker stopped"
        );
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for InMemoryBroker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::{BrokerExt, Message};

    fn running_broker() -> Arc<InMemoryBroker> {
        let broker = Arc::new(InMemoryBroker::new());
        broker.init(TaskEngine::current().unwrap());
        assert!(broker.start());
        broker
    }

    /// Polls until `done` holds or a second has passed.
    async fn eventually(done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        done()
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Pong(u32);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handlers_run_in_subscription_order() {
        let broker = running_broker();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=3 {
            let log = Arc::clone(&log);
            broker.subscribe("ping", move |msg: &Message<Ping>| {
                log.lock().unwrap().push((n, msg.data().0));
            });
        }

        assert!(broker.publish("ping", Ping(7)));
        assert!(eventually(|| broker.stats().processed == 3).await);
        assert_eq!(*log.lock().unwrap(), vec![(1, 7), (2, 7), (3, 7)]);
        assert_eq!(broker.stats().published, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delivery_never_crosses_types() {
        let broker = running_broker();
        let pings = Arc::new(Mutex::new(Vec::new()));
        let pongs = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&pings);
        broker.subscribe("ball", move |msg: &Message<Ping>| {
            sink.lock().unwrap().push(msg.data().clone());
        });
        let sink = Arc::clone(&pongs);
        broker.subscribe("ball", move |msg: &Message<Pong>| {
            sink.lock().unwrap().push(msg.data().clone());
        });

        broker.publish("ball", Ping(1));
        broker.publish("ball", Pong(2));
        broker.publish("ball", "not a ball");
        broker.publish("other", Ping(3));

        assert!(eventually(|| broker.stats().processed == 2).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.stats().processed, 2);
        assert_eq!(*pings.lock().unwrap(), vec![Ping(1)]);
        assert_eq!(*pongs.lock().unwrap(), vec![Pong(2)]);
        assert_eq!(broker.stats().published, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsubscribe_all_stops_delivery() {
        let broker = running_broker();
        broker.subscribe("t", |_: &Message<Ping>| {});
        broker.subscribe("t", |_: &Message<Pong>| {});
        assert_eq!(broker.subscriber_count(), 2);

        broker.unsubscribe_all("t");
        assert_eq!(broker.topic_count(), 0);
        assert_eq!(broker.subscriber_count(), 0);

        assert!(broker.publish("t", Ping(1)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.stats().processed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_type_keeps_other_types_and_prunes() {
        let broker = running_broker();
        broker.subscribe("t", |_: &Message<Ping>| {});
        broker.subscribe("t", |_: &Message<Pong>| {});

        broker.unsubscribe_type::<Ping>("t");
        assert_eq!(broker.subscriber_count(), 1);
        assert_eq!(broker.topics(), vec!["t".to_string()]);

        broker.unsubscribe_type::<Pong>("t");
        assert_eq!(broker.topic_count(), 0);

        // Unknown topics and types are ignored.
        broker.unsubscribe_type::<Pong>("t");
        broker.unsubscribe_all("missing");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_handler_does_not_stop_later_handlers() {
        let broker = running_broker();
        let reached = Arc::new(AtomicU64::new(0));

        broker.subscribe("p", |_: &Message<Ping>| panic!("handler failed"));
        let counter = Arc::clone(&reached);
        broker.subscribe("p", move |_: &Message<Ping>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        broker.publish("p", Ping(0));
        assert!(eventually(|| reached.load(Ordering::SeqCst) == 1).await);
        let stats = broker.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handlers_may_publish_and_subscribe() {
        let broker = running_broker();
        let pongs = Arc::new(AtomicU64::new(0));

        let inner = Arc::clone(&broker);
        let counter = Arc::clone(&pongs);
        broker.subscribe("ping", move |msg: &Message<Ping>| {
            let counter = Arc::clone(&counter);
            inner.subscribe("late", move |_: &Message<Pong>| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            inner.publish("pong", Pong(msg.data().0));
        });
        let echo = Arc::clone(&broker);
        broker.subscribe("pong", move |msg: &Message<Pong>| {
            echo.publish("late", msg.data().clone());
        });

        broker.publish("ping", Ping(5));
        assert!(eventually(|| pongs.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_rejected_until_initialised_and_started() {
        let broker = InMemoryBroker::new();
        broker.subscribe("t", |_: &Message<Ping>| {});

        assert!(!broker.start());
        assert!(!broker.publish("t", Ping(1)));

        broker.init(TaskEngine::current().unwrap());
        assert!(!broker.publish("t", Ping(1)));

        assert!(broker.start());
        assert!(broker.start());
        assert!(broker.publish("t", Ping(1)));

        broker.stop();
        broker.stop();
        assert!(!broker.is_running());
        assert!(!broker.publish("t", Ping(1)));
        assert_eq!(broker.stats().published, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_works_through_dyn_broker() {
        let broker = running_broker();
        let seen = Arc::new(AtomicU64::new(0));
        let dyn_broker: Arc<dyn Broker> = broker.clone();

        let counter = Arc::clone(&seen);
        dyn_broker.subscribe("d", move |msg: &Message<u64>| {
            counter.fetch_add(*msg.data(), Ordering::SeqCst);
        });
        dyn_broker.publish("d", 40_u64);
        dyn_broker.publish("d", 2_u64);
        assert!(eventually(|| seen.load(Ordering::SeqCst) == 42).await);
    }
}
