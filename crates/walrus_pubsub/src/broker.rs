//! The broker seam and its typed extension.
//!
//! [`Broker`] is object-safe and speaks only in erased terms
//! ([`Envelope`], [`ErasedHandler`], [`TypeTag`]). [`BrokerExt`] is
//! implemented for every broker, `dyn Broker` included, and adds the typed
//! `subscribe::<T>` / `publish::<T>` API on top.

use std::sync::Arc;

use crate::message::{Envelope, Message, TypeTag};

/// A handler with its payload type erased.
pub type ErasedHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// A topic-based message broker.
pub trait Broker: Send + Sync {
    /// Register `handler` for payloads tagged `tag` on `topic`.
    fn subscribe_erased(&self, topic: &str, tag: TypeTag, handler: ErasedHandler);

    /// Hand an envelope over for delivery.
    ///
    /// Returns `true` if the broker accepted it. Delivery is asynchronous.
    fn publish_envelope(&self, envelope: Envelope) -> bool;

    /// Remove subscriptions on `topic`: one payload type, or every type when
    /// `tag` is `None`.
    fn unsubscribe(&self, topic: &str, tag: Option<TypeTag>);

    /// Start accepting publishes. Returns `false` if the broker cannot run.
    fn start(&self) -> bool;

    /// Stop accepting publishes.
    fn stop(&self);

    /// Returns `true` between `start` and `stop`.
    fn is_running(&self) -> bool;
}

/// Typed convenience methods for every [`Broker`].
pub trait BrokerExt: Broker {
    /// Subscribe to `T` payloads on `topic`.
    ///
    /// Handlers on one topic and type run in subscription order.
    fn subscribe<T, F>(&self, topic: &str, handler: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        let erased: ErasedHandler = Arc::new(move |envelope: &Envelope| {
            if let Some(message) = envelope.message::<T>() {
                handler(&message);
            }
        });
        self.subscribe_erased(topic, TypeTag::of::<T>(), erased);
    }

    /// Publish `value` on `topic`. Only `T` subscribers of `topic` see it.
    fn publish<T>(&self, topic: &str, value: T) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.publish_envelope(Envelope::new(topic, value))
    }

    /// Remove every subscription on `topic`.
    fn unsubscribe_all(&self, topic: &str) {
        self.unsubscribe(topic, None);
    }

    /// Remove the `T` subscriptions on `topic`.
    fn unsubscribe_type<T: 'static>(&self, topic: &str) {
        self.unsubscribe(topic, Some(TypeTag::of::<T>()));
    }
}

impl<B: Broker + ?Sized> BrokerExt for B {}
