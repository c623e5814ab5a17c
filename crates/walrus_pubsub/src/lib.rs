//! # walrus_pubsub
//!
//! Typed topic-based publish/subscribe for the walrus runtime.
//!
//! - [`Broker`] — object-safe seam (erased subscribe, publish, unsubscribe).
//! - [`BrokerExt`] — typed `subscribe::<T>` / `publish::<T>` for any broker.
//! - [`InMemoryBroker`] — default broker delivering on the task engine.
//! - [`Message`] / [`Envelope`] / [`TypeTag`] — typed and erased payloads.
//! - [`Publisher`] / [`Subscriber`] — handles bound to one payload type.
//!
//! A handler is registered for one payload type on one topic. Publishing a
//! `T` on a topic reaches only that topic's `T` handlers.
//!
//! ## Usage
//!
//! ```rust
//! use walrus_pubsub::{Broker, BrokerExt, InMemoryBroker, Message};
//! use walrus_task::TaskEngine;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let broker = InMemoryBroker::new();
//!     broker.init(TaskEngine::current().unwrap());
//!     broker.start();
//!
//!     broker.subscribe("greetings", |msg: &Message<String>| {
//!         println!("{} says {}", msg.topic(), msg.data());
//!     });
//!     assert!(broker.publish("greetings", String::from("hello")));
//!     broker.stop();
//! }
//! ```

pub mod broker;
pub mod helpers;
pub mod memory;
pub mod message;

pub use broker::{Broker, BrokerExt, ErasedHandler};
pub use helpers::{Publisher, Subscriber};
pub use memory::{BrokerStats, InMemoryBroker};
pub use message::{Envelope, Message, TypeTag};
