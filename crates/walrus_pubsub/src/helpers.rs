//! Typed publisher and subscriber handles bound to one payload type.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::broker::{Broker, BrokerExt};
use crate::message::Message;

/// Publishes `T` payloads, defaulting to one topic.
pub struct Publisher<T> {
    broker: Arc<dyn Broker>,
    default_topic: String,
    _payload: PhantomData<fn(T)>,
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("default_topic", &self.default_topic)
            .field("payload", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Publisher<T> {
    /// Create a publisher for `default_topic`.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, default_topic: impl Into<String>) -> Self {
        Self {
            broker,
            default_topic: default_topic.into(),
            _payload: PhantomData,
        }
    }

    /// Publish on the default topic.
    pub fn publish(&self, value: T) -> bool {
        self.broker.publish(&self.default_topic, value)
    }

    /// Publish on `topic` instead of the default.
    pub fn publish_to(&self, topic: &str, value: T) -> bool {
        self.broker.publish(topic, value)
    }

    /// The topic [`publish`](Publisher::publish) uses.
    #[must_use]
    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Replace the default topic.
    pub fn set_default_topic(&mut self, topic: impl Into<String>) {
        self.default_topic = topic.into();
    }
}

/// Subscribes to `T` payloads and unsubscribes its type from every topic it
/// joined when dropped.
///
/// Dropping removes all `T` handlers on those topics, including ones
/// registered through other handles.
pub struct Subscriber<T: 'static> {
    broker: Arc<dyn Broker>,
    topics: Vec<String>,
    _payload: PhantomData<fn(T)>,
}

impl<T: 'static> std::fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topics", &self.topics)
            .field("payload", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Subscriber<T> {
    /// Create a subscriber with no topics.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            topics: Vec::new(),
            _payload: PhantomData,
        }
    }

    /// Subscribe `handler` to `topic`.
    pub fn subscribe<F>(&mut self, topic: &str, handler: F)
    where
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        self.broker.subscribe(topic, handler);
        if !self.topics.iter().any(|t| t == topic) {
            self.topics.push(topic.to_string());
        }
    }

    /// Remove the `T` handlers on `topic`.
    pub fn unsubscribe(&mut self, topic: &str) {
        self.broker.unsubscribe_type::<T>(topic);
        self.topics.retain(|t| t != topic);
    }

    /// Topics this subscriber joined, in order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

impl<T: 'static> Drop for Subscriber<T> {
    fn drop(&mut self) {
        for topic in &self.topics {
            self.broker.unsubscribe_type::<T>(topic);
        }
    }
}
